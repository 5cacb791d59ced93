//! Explicit HTTP transport injection. Clients never own a global HTTP
//! client; they execute requests through an [`HttpTransport`], which
//! recording and replay wrap without touching process state.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{GoldenError, Result};

/// One outbound HTTP request, transport-agnostic.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Redirect hops to follow; 0 disables redirects.
    pub max_redirects: usize,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn json_body(mut self, body: &impl serde::Serialize) -> Result<Self> {
        self.body = Some(serde_json::to_string(body)?);
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// The URL with query parameters applied, as the transport sends it.
    /// Parameters are appended in sorted order so recordings are stable.
    pub fn full_url(&self) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|e| GoldenError::InvalidUrl(format!("{}: {e}", self.url)))?;
        if !self.params.is_empty() {
            let mut sorted: Vec<_> = self.params.iter().collect();
            sorted.sort();
            let mut pairs = url.query_pairs_mut();
            for (name, value) in sorted {
                pairs.append_pair(name, value);
            }
        }
        Ok(url.to_string())
    }
}

/// Fully materialized HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// The seam every HTTP-using client goes through. Real network by default;
/// recording and replaying transports wrap or replace it.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Real-network transport. A fresh client is built per request so
/// per-request redirect/timeout policy never leaks between calls.
#[derive(Debug, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = request.full_url()?;

        let mut builder = reqwest::Client::builder().redirect(if request.max_redirects > 0 {
            reqwest::redirect::Policy::limited(request.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        });
        if let Some(secs) = request.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        let method: reqwest::Method = request
            .method
            .parse()
            .map_err(|_| GoldenError::InvalidUrl(format!("bad method {}", request.method)))?;
        let mut req = client.request(method, &url);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        let response = req.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        // Read to completion; streaming bodies are materialized here.
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::{GoldenError, Result};
use crate::masker::MASKED_PLACEHOLDER;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{GoldenData, HttpCall};

/// Transport serving recorded responses by content-based request matching.
///
/// A request matches a recorded call when the method matches exactly and
/// url, params and body match after masked-placeholder substitution: each
/// `***MASKED***` run in the recording matches any run of non-`&`
/// characters, so replay succeeds against requests carrying real secrets
/// while the recording stores only the placeholder.
pub struct ReplayTransport {
    recordings: Vec<HttpCall>,
    used: Mutex<HashSet<usize>>,
}

impl ReplayTransport {
    pub fn new(recordings: Vec<HttpCall>) -> Self {
        Self {
            recordings,
            used: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_golden(golden: &GoldenData) -> Self {
        Self::new(golden.recordings.clone())
    }

    /// True when every recorded call has served at least one request.
    /// Tests use this to assert call coverage.
    pub fn verify_all_calls_used(&self) -> bool {
        self.used.lock().unwrap().len() == self.recordings.len()
    }
}

#[async_trait]
impl HttpTransport for ReplayTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = request.full_url()?;

        for (index, call) in self.recordings.iter().enumerate() {
            if call.request.method != request.method {
                continue;
            }
            if !masked_match(&call.request.url, &url) {
                continue;
            }
            if !params_match(&call.request.params, &request.params) {
                continue;
            }
            if !body_match(call.request.body.as_deref(), request.body.as_deref()) {
                continue;
            }

            debug!(method = %request.method, url = %url, index, "replaying recorded call");
            self.used.lock().unwrap().insert(index);
            return Ok(HttpResponse {
                status: call.response.status_code,
                headers: call.response.headers.clone(),
                body: call.response.content.clone(),
            });
        }

        Err(GoldenError::ReplayMiss {
            method: request.method.clone(),
            url,
        })
    }
}

/// Match `actual` against `recorded`, treating each masked run as `[^&]*`
/// anchored at its position. Without a placeholder this is an exact
/// comparison.
fn masked_match(recorded: &str, actual: &str) -> bool {
    if !recorded.contains(MASKED_PLACEHOLDER) {
        return recorded == actual;
    }
    let escaped_placeholder = regex::escape(MASKED_PLACEHOLDER);
    let pattern = format!(
        "^{}$",
        regex::escape(recorded).replace(&escaped_placeholder, "[^&]*")
    );
    Regex::new(&pattern)
        .map(|re| re.is_match(actual))
        .unwrap_or(false)
}

fn params_match(
    recorded: &std::collections::HashMap<String, String>,
    actual: &std::collections::HashMap<String, String>,
) -> bool {
    if recorded.len() != actual.len() {
        return false;
    }
    recorded.iter().all(|(key, recorded_value)| {
        actual
            .get(key)
            .map(|actual_value| masked_match(recorded_value, actual_value))
            .unwrap_or(false)
    })
}

fn body_match(recorded: Option<&str>, actual: Option<&str>) -> bool {
    match (recorded, actual) {
        (None, None) => true,
        (Some(recorded), Some(actual)) => masked_match(recorded, actual),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::{RecordedRequest, RecordedResponse};

    fn recorded_call(method: &str, url: &str, params: &[(&str, &str)], body: Option<&str>) -> HttpCall {
        HttpCall {
            request: RecordedRequest {
                method: method.to_string(),
                url: url.to_string(),
                headers: HashMap::new(),
                params: params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: body.map(str::to_string),
            },
            response: RecordedResponse {
                status_code: 200,
                headers: HashMap::from([(
                    "content-type".to_string(),
                    "application/json".to_string(),
                )]),
                content: format!("{{\"served\":\"{url}\"}}"),
            },
            timestamp: String::new(),
        }
    }

    #[tokio::test]
    async fn exact_request_replays() {
        let transport = ReplayTransport::new(vec![recorded_call(
            "GET",
            "https://api.example/search?q=rust",
            &[("q", "rust")],
            None,
        )]);

        let response = transport
            .execute(&HttpRequest::get("https://api.example/search").param("q", "rust"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(transport.verify_all_calls_used());
    }

    #[tokio::test]
    async fn replay_is_deterministic() {
        let transport = ReplayTransport::new(vec![recorded_call(
            "GET",
            "https://api.example/search?q=rust",
            &[("q", "rust")],
            None,
        )]);
        let request = HttpRequest::get("https://api.example/search").param("q", "rust");

        let first = transport.execute(&request).await.unwrap();
        let second = transport.execute(&request).await.unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.body, second.body);
        assert_eq!(first.headers, second.headers);
    }

    #[tokio::test]
    async fn masked_url_matches_real_secret() {
        let transport = ReplayTransport::new(vec![recorded_call(
            "GET",
            "https://api.example/data?appid=***MASKED***&q=minsk",
            &[("appid", "***MASKED***"), ("q", "minsk")],
            None,
        )]);

        let response = transport
            .execute(
                &HttpRequest::get("https://api.example/data")
                    .param("appid", "real-live-key")
                    .param("q", "minsk"),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn masked_body_matches_any_value() {
        let transport = ReplayTransport::new(vec![recorded_call(
            "POST",
            "https://api.example/login",
            &[],
            Some("user=bob&password=***MASKED***"),
        )]);

        let mut request = HttpRequest::post("https://api.example/login");
        request.body = Some("user=bob&password=tr0ub4dor".to_string());
        assert!(transport.execute(&request).await.is_ok());

        // A differing non-masked segment must not match.
        let mut other = HttpRequest::post("https://api.example/login");
        other.body = Some("user=eve&password=tr0ub4dor".to_string());
        assert!(other.body.is_some());
        assert!(matches!(
            transport.execute(&other).await,
            Err(GoldenError::ReplayMiss { .. })
        ));
    }

    #[tokio::test]
    async fn method_mismatch_is_a_miss() {
        let transport = ReplayTransport::new(vec![recorded_call(
            "GET",
            "https://api.example/a",
            &[],
            None,
        )]);
        assert!(matches!(
            transport
                .execute(&HttpRequest::post("https://api.example/a"))
                .await,
            Err(GoldenError::ReplayMiss { .. })
        ));
        assert!(!transport.verify_all_calls_used());
    }

    #[tokio::test]
    async fn first_matching_call_wins() {
        let mut newer = recorded_call("GET", "https://api.example/a", &[], None);
        newer.response.content = "second".to_string();
        let mut older = recorded_call("GET", "https://api.example/a", &[], None);
        older.response.content = "first".to_string();

        let transport = ReplayTransport::new(vec![older, newer]);
        let response = transport
            .execute(&HttpRequest::get("https://api.example/a"))
            .await
            .unwrap();
        assert_eq!(response.body, "first");
    }

    #[tokio::test]
    async fn extra_request_params_are_a_miss() {
        let transport = ReplayTransport::new(vec![recorded_call(
            "GET",
            "https://api.example/a?q=1",
            &[("q", "1")],
            None,
        )]);
        assert!(matches!(
            transport
                .execute(
                    &HttpRequest::get("https://api.example/a")
                        .param("q", "1")
                        .param("extra", "2")
                )
                .await,
            Err(GoldenError::ReplayMiss { .. })
        ));
    }
}

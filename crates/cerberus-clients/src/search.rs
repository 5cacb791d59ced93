//! Web-search client with response caching and rate limiting.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use cerberus_cache::Cache;
use cerberus_golden::{HttpRequest, HttpTransport};
use cerberus_ratelimit::RateLimiterRegistry;

use crate::error::{ClientError, Result};

const API_ENDPOINT: &str = "https://search.api.cerberus.dev/v2/web/search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyMode {
    None,
    Moderate,
    Strict,
}

/// Full structured search request; doubles as the cache key via canonical
/// JSON serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query_text: String,
    pub family_mode: FamilyMode,
    pub page: u32,
    pub fix_typos: bool,
    pub sort_by_relevance: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups_on_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_in_group: Option<u32>,
    pub max_passages: u32,
    pub region: String,
    pub folder_id: String,
}

/// One found document. Passages carry `**word**` highlight markers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchDocument {
    pub url: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub passages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_copy_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modtime: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchApiError {
    pub code: i64,
    pub message: String,
}

/// Grouped search response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchResponse {
    #[serde(default)]
    pub found: i64,
    #[serde(default)]
    pub found_human: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SearchApiError>,
    #[serde(default)]
    pub groups: Vec<Vec<SearchDocument>>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub family_mode: FamilyMode,
    pub page: u32,
    pub groups_on_page: Option<u32>,
    pub docs_in_group: Option<u32>,
    pub max_passages: u32,
    pub region: String,
    pub cache_ttl: Option<i64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            family_mode: FamilyMode::Moderate,
            page: 0,
            groups_on_page: None,
            docs_in_group: None,
            max_passages: 2,
            region: "225".to_string(),
            cache_ttl: None,
        }
    }
}

/// Async search client. Responses are cached under the structured request
/// key; admission goes through the named rate-limiter queue.
pub struct SearchClient {
    api_key: String,
    folder_id: String,
    request_timeout_secs: u64,
    cache: Arc<dyn Cache<SearchRequest, SearchResponse>>,
    cache_ttl: i64,
    queue: String,
    limiter: Arc<RateLimiterRegistry>,
    transport: Arc<dyn HttpTransport>,
}

impl SearchClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api_key: impl Into<String>,
        folder_id: impl Into<String>,
        request_timeout_secs: u64,
        cache: Arc<dyn Cache<SearchRequest, SearchResponse>>,
        cache_ttl: i64,
        queue: impl Into<String>,
        limiter: Arc<RateLimiterRegistry>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            folder_id: folder_id.into(),
            request_timeout_secs,
            cache,
            cache_ttl,
            queue: queue.into(),
            limiter,
            transport,
        }
    }

    /// Perform a search with caching and rate limiting.
    pub async fn search(&self, query_text: &str, options: &SearchOptions) -> Result<SearchResponse> {
        let request = SearchRequest {
            query_text: query_text.to_string(),
            family_mode: options.family_mode,
            page: options.page,
            fix_typos: true,
            sort_by_relevance: true,
            groups_on_page: options.groups_on_page,
            docs_in_group: options.docs_in_group,
            max_passages: options.max_passages,
            region: options.region.clone(),
            folder_id: self.folder_id.clone(),
        };

        let ttl = options.cache_ttl.unwrap_or(self.cache_ttl);
        if let Some(cached) = self.cache.get(&request, Some(ttl)).await {
            debug!(query = query_text, "search cache hit");
            return Ok(cached);
        }
        debug!(query = query_text, "search cache miss");

        self.limiter.apply_limit(&self.queue).await;

        let response = self
            .transport
            .execute(
                &HttpRequest::post(API_ENDPOINT)
                    .header("Authorization", format!("Api-Key {}", self.api_key))
                    .timeout(self.request_timeout_secs)
                    .json_body(&request)?,
            )
            .await?;

        if !response.is_success() {
            return Err(ClientError::Api {
                status: response.status,
                message: response.body,
            });
        }

        let parsed: SearchResponse =
            serde_json::from_str(&response.body).map_err(|e| ClientError::Parse(e.to_string()))?;

        self.cache.set(&request, &parsed).await;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cerberus_cache::{JsonKeyGen, MemoryCache, NullCache};
    use cerberus_golden::{GoldenData, HttpResponse, Recorder, ReplayTransport};

    use super::*;

    fn canned_response() -> String {
        serde_json::json!({
            "found": 2,
            "found_human": "Нашлось 2 результата",
            "request_id": "req-1",
            "groups": [[{
                "url": "https://docs.example/a",
                "domain": "docs.example",
                "title": "First **hit**",
                "passages": ["some **match** text"]
            }]]
        })
        .to_string()
    }

    struct CannedTransport {
        body: String,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl cerberus_golden::HttpTransport for CannedTransport {
        async fn execute(
            &self,
            _request: &HttpRequest,
        ) -> cerberus_golden::error::Result<HttpResponse> {
            *self.calls.lock().unwrap() += 1;
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::from([(
                    "content-type".to_string(),
                    "application/json".to_string(),
                )]),
                body: self.body.clone(),
            })
        }
    }

    fn client(transport: Arc<dyn cerberus_golden::HttpTransport>) -> SearchClient {
        SearchClient::new(
            "test-key",
            "folder",
            30,
            Arc::new(MemoryCache::new(Box::new(JsonKeyGen::default()), 3600, 100)),
            3600,
            "web-search",
            Arc::new(RateLimiterRegistry::new()),
            transport,
        )
    }

    #[tokio::test]
    async fn parses_grouped_response() {
        let transport = Arc::new(CannedTransport {
            body: canned_response(),
            calls: Mutex::new(0),
        });
        let client = client(transport);

        let response = client
            .search("rust docs", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(response.found, 2);
        assert_eq!(response.groups.len(), 1);
        assert_eq!(response.groups[0][0].domain, "docs.example");
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let transport = Arc::new(CannedTransport {
            body: canned_response(),
            calls: Mutex::new(0),
        });
        let client = client(transport.clone());

        client.search("rust docs", &SearchOptions::default()).await.unwrap();
        client.search("rust docs", &SearchOptions::default()).await.unwrap();
        assert_eq!(*transport.calls.lock().unwrap(), 1);

        // A different query misses the cache.
        client.search("other", &SearchOptions::default()).await.unwrap();
        assert_eq!(*transport.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn api_error_status_is_surfaced() {
        struct ErrorTransport;

        #[async_trait]
        impl cerberus_golden::HttpTransport for ErrorTransport {
            async fn execute(
                &self,
                _request: &HttpRequest,
            ) -> cerberus_golden::error::Result<HttpResponse> {
                Ok(HttpResponse {
                    status: 403,
                    headers: HashMap::new(),
                    body: "forbidden".to_string(),
                })
            }
        }

        let client = client(Arc::new(ErrorTransport));
        assert!(matches!(
            client.search("q", &SearchOptions::default()).await,
            Err(ClientError::Api { status: 403, .. })
        ));
    }

    /// Record one search through a canned "network", save the scenario,
    /// then replay it in a fresh client with no network at all.
    #[tokio::test]
    async fn recorded_search_replays_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.json");

        let recorder = Recorder::wrapping(
            Arc::new(CannedTransport {
                body: canned_response(),
                calls: Mutex::new(0),
            }),
            vec!["test-key".to_string()],
        );
        {
            // No cache during recording so the HTTP call actually happens.
            let client = SearchClient::new(
                "test-key",
                "folder",
                30,
                Arc::new(NullCache::new()),
                3600,
                "web-search",
                Arc::new(RateLimiterRegistry::new()),
                recorder.transport(),
            );
            client.search("rust docs", &SearchOptions::default()).await.unwrap();
        }
        recorder.save_golden_data(&path, Default::default()).unwrap();

        let golden = GoldenData::load(&path).unwrap();
        let replay = Arc::new(ReplayTransport::from_golden(&golden));
        let client = SearchClient::new(
            "test-key",
            "folder",
            30,
            Arc::new(NullCache::new()),
            3600,
            "web-search",
            Arc::new(RateLimiterRegistry::new()),
            replay.clone(),
        );

        let response = client
            .search("rust docs", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(response.found, 2);
        assert!(replay.verify_all_calls_used());
    }
}

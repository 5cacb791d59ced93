//! URL fetcher + condenser: download a page, keep raw content cached,
//! convert HTML to Markdown, and summarize through the LLM when the result
//! exceeds the caller's size budget.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cerberus_cache::Cache;
use cerberus_golden::{HttpRequest, HttpTransport};
use cerberus_ratelimit::RateLimiterRegistry;

use crate::error::{ClientError, Result};
use crate::llm::{ChatMessage, LlmClient};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; CerberusBot/1.0)";

const CONDENSE_SYSTEM_PROMPT: &str = "Сделай максимально подробный пересказ этого документа. \
Сохраняй язык оригинала (не переводи), ответ так же давай на языке документа (не этого запроса). \
Включи все идеи, аргументы и факты. \
Структура пересказа должна соответствовать структуре исходного текста (разделы, подразделы). \
Пересказывай исключительно на языке исходного текста.";

/// Raw downloaded page, cached per URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlContent {
    pub content: String,
    pub content_type: String,
}

/// Condensed-result cache key: same URL with a different size budget is a
/// different entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CondensedKey {
    pub url: String,
    pub max_size: usize,
}

/// Model pair used for condensing, resolved from chat settings.
#[derive(Debug, Clone)]
pub struct CondenseModels {
    pub model: String,
    pub fallback_model: String,
}

pub struct UrlFetcher {
    raw_cache: Arc<dyn Cache<String, UrlContent>>,
    condensed_cache: Arc<dyn Cache<CondensedKey, String>>,
    cache_ttl: i64,
    request_timeout_secs: u64,
    queue: String,
    limiter: Arc<RateLimiterRegistry>,
    transport: Arc<dyn HttpTransport>,
    llm: Option<Arc<LlmClient>>,
    strip_pattern: Regex,
}

impl UrlFetcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        raw_cache: Arc<dyn Cache<String, UrlContent>>,
        condensed_cache: Arc<dyn Cache<CondensedKey, String>>,
        cache_ttl: i64,
        request_timeout_secs: u64,
        queue: impl Into<String>,
        limiter: Arc<RateLimiterRegistry>,
        transport: Arc<dyn HttpTransport>,
        llm: Option<Arc<LlmClient>>,
    ) -> Self {
        Self {
            raw_cache,
            condensed_cache,
            cache_ttl,
            request_timeout_secs,
            queue: queue.into(),
            limiter,
            transport,
            llm,
            strip_pattern: Regex::new(r"(?is)<svg\b.*?</svg>|<img\b[^>]*>").unwrap(),
        }
    }

    /// Fetch a page and return its text, markdown-converted and condensed
    /// to `max_size` when necessary.
    pub async fn url_content(
        &self,
        url: &str,
        parse_to_markdown: bool,
        max_size: usize,
        models: Option<&CondenseModels>,
    ) -> Result<String> {
        let condensed_key = CondensedKey {
            url: url.to_string(),
            max_size,
        };
        if let Some(condensed) = self
            .condensed_cache
            .get(&condensed_key, Some(self.cache_ttl))
            .await
        {
            debug!(url, "condensed cache hit");
            return Ok(condensed);
        }

        let raw = match self
            .raw_cache
            .get(&url.to_string(), Some(self.cache_ttl))
            .await
        {
            Some(cached) => cached,
            None => {
                let downloaded = self.download(url).await?;
                self.raw_cache.set(&url.to_string(), &downloaded).await;
                downloaded
            }
        };

        let mut content = raw.content;
        if parse_to_markdown && raw.content_type.contains("html") {
            let stripped = self.strip_pattern.replace_all(&content, "");
            content = html2md::parse_html(&stripped);
        }

        if content.len() >= max_size {
            if let (Some(llm), Some(models)) = (&self.llm, models) {
                debug!(url, length = content.len(), max_size, "condensing oversized content");
                let messages = [
                    ChatMessage::system(CONDENSE_SYSTEM_PROMPT),
                    ChatMessage::user(content.as_str()),
                ];
                match llm
                    .generate_with_fallback(&models.model, &models.fallback_model, &messages)
                    .await
                {
                    Ok(condensed) => {
                        self.condensed_cache.set(&condensed_key, &condensed).await;
                        content = condensed;
                    }
                    Err(e) => warn!(url, error = %e, "condensing failed, returning full content"),
                }
            }
        }

        Ok(content)
    }

    async fn download(&self, url: &str) -> Result<UrlContent> {
        self.limiter.apply_limit(&self.queue).await;

        let response = self
            .transport
            .execute(
                &HttpRequest::get(url)
                    .header("User-Agent", USER_AGENT)
                    .header(
                        "Accept",
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    )
                    .header("Accept-Language", "ru-RU,ru,en-US,en;q=0.5")
                    .timeout(self.request_timeout_secs)
                    .redirects(5),
            )
            .await?;

        if !response.is_success() {
            return Err(ClientError::RequestFailed {
                status: response.status,
            });
        }

        let content_type = response
            .content_type()
            .unwrap_or("text/html")
            .to_string();
        if !content_type.starts_with("text/") {
            warn!(url, %content_type, "refusing non-text content");
            return Err(ClientError::NotText { content_type });
        }

        Ok(UrlContent {
            content: response.body,
            content_type,
        })
    }
}

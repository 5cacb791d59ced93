use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Top-level config (cerberus.toml + CERBERUS_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CerberusConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ratelimit: RateLimitConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Web-search integration. Disabled by default; enabling it without an API
/// key is a startup error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub folder_id: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_search_cache_ttl")]
    pub cache_ttl_secs: i64,
    #[serde(default = "default_search_queue")]
    pub ratelimiter_queue: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            folder_id: String::new(),
            request_timeout_secs: default_request_timeout(),
            cache_ttl_secs: default_search_cache_ttl(),
            ratelimiter_queue: default_search_queue(),
        }
    }
}

/// Weather + geocoding integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    /// Geocoding results barely change; cache for 30 days by default.
    #[serde(default = "default_geocoding_ttl")]
    pub geocoding_ttl_secs: i64,
    #[serde(default = "default_weather_ttl")]
    pub weather_ttl_secs: i64,
    #[serde(default = "default_weather_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_weather_queue")]
    pub ratelimiter_queue: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            geocoding_ttl_secs: default_geocoding_ttl(),
            weather_ttl_secs: default_weather_ttl(),
            request_timeout_secs: default_weather_request_timeout(),
            ratelimiter_queue: default_weather_queue(),
        }
    }
}

/// LLM provider used for summarization/condensing. OpenAI-compatible
/// chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_queue")]
    pub ratelimiter_queue: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            base_url: default_llm_base_url(),
            ratelimiter_queue: default_llm_queue(),
        }
    }
}

/// URL fetcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_fetch_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_url_content_ttl")]
    pub cache_ttl_secs: i64,
    #[serde(default = "default_fetch_queue")]
    pub ratelimiter_queue: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_fetch_timeout(),
            cache_ttl_secs: default_url_content_ttl(),
            ratelimiter_queue: default_fetch_queue(),
        }
    }
}

/// Named outbound-request queues. Aliases route one queue name onto
/// another's limiter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub queues: HashMap<String, QueueConfig>,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cerberus/cerberus.db", home)
}
fn default_request_timeout() -> u64 {
    30
}
fn default_search_cache_ttl() -> i64 {
    3600
}
fn default_search_queue() -> String {
    "web-search".to_string()
}
fn default_geocoding_ttl() -> i64 {
    2_592_000
}
fn default_weather_ttl() -> i64 {
    1800
}
fn default_weather_request_timeout() -> u64 {
    10
}
fn default_weather_queue() -> String {
    "weather".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_llm_queue() -> String {
    "llm".to_string()
}
fn default_fetch_timeout() -> u64 {
    60
}
fn default_url_content_ttl() -> i64 {
    3600
}
fn default_fetch_queue() -> String {
    "url-fetch".to_string()
}

impl CerberusConfig {
    /// Load config from a TOML file with CERBERUS_* env var overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: CerberusConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CERBERUS_").split("_"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Enabled integrations must carry their credentials; the process
    /// refuses to start otherwise.
    pub fn validate(&self) -> Result<()> {
        if self.search.enabled && self.search.api_key.is_empty() {
            return Err(CoreError::Config(
                "search integration enabled without api_key".to_string(),
            ));
        }
        if self.weather.enabled && self.weather.api_key.is_empty() {
            return Err(CoreError::Config(
                "weather integration enabled without api_key".to_string(),
            ));
        }
        if self.llm.enabled && self.llm.api_key.is_empty() {
            return Err(CoreError::Config(
                "llm integration enabled without api_key".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cerberus/cerberus.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = CerberusConfig::default();
        assert!(config.validate().is_ok());
        // Section defaults must match the serde field defaults.
        assert_eq!(config.search.request_timeout_secs, 30);
        assert_eq!(config.weather.geocoding_ttl_secs, 2_592_000);
        assert_eq!(config.fetcher.request_timeout_secs, 60);
        assert_eq!(config.llm.base_url, "https://api.openai.com");
    }

    #[test]
    fn enabled_integration_without_key_is_fatal() {
        let mut config = CerberusConfig::default();
        config.search.enabled = true;
        assert!(config.validate().is_err());

        config.search.api_key = "key".to_string();
        assert!(config.validate().is_ok());
    }
}

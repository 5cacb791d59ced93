//! Upstream REST clients (web search, geocoding + weather), the URL
//! fetcher/condenser, the LLM chat-completions client, and the search
//! result formatter. Every client executes HTTP through an injected
//! transport so recording and replay wrap them uniformly.

pub mod error;
pub mod format;
pub mod llm;
pub mod search;
pub mod url;
pub mod weather;

pub use error::ClientError;
pub use format::format_search_result;
pub use llm::{ChatMessage, LlmClient};
pub use search::{FamilyMode, SearchClient, SearchDocument, SearchOptions, SearchRequest, SearchResponse};
pub use url::{CondenseModels, UrlFetcher};
pub use weather::{CombinedWeatherResult, GeocodingResult, WeatherClient, WeatherData};

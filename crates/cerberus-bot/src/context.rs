//! Root dependency context: one instance per process, threaded explicitly
//! into every component instead of free-function singletons.

use std::sync::Arc;

use cerberus_bayes::NaiveBayesFilter;
use cerberus_clients::{SearchClient, UrlFetcher, WeatherClient};
use cerberus_ratelimit::RateLimiterRegistry;
use cerberus_scheduler::SchedulerHandle;
use cerberus_store::{ChatStore, SettingsStore};

use crate::platform::Platform;

pub struct BotContext {
    pub platform: Arc<dyn Platform>,
    pub store: Arc<ChatStore>,
    pub settings: Arc<SettingsStore>,
    pub bayes: Arc<NaiveBayesFilter>,
    pub scheduler: SchedulerHandle,
    pub limiter: Arc<RateLimiterRegistry>,
    pub search: Option<Arc<SearchClient>>,
    pub weather: Option<Arc<WeatherClient>>,
    pub fetcher: Option<Arc<UrlFetcher>>,
}

//! Named outbound-request queues with sliding-window admission.
//!
//! One registry per process; limiter identity persists for the process
//! lifetime. Callers block in [`RateLimiterRegistry::apply_limit`] until a
//! permit is available.

mod window;

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use cerberus_core::config::RateLimitConfig;
pub use window::SlidingWindow;

/// Process-wide registry of named limiters. Queues may be aliased so that
/// several logical names share one limiter.
#[derive(Default)]
pub struct RateLimiterRegistry {
    limiters: DashMap<String, Arc<SlidingWindow>>,
    aliases: DashMap<String, String>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the `[ratelimit]` config section.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let registry = Self::new();
        for (name, queue) in &config.queues {
            registry.register(name, queue.max_requests, queue.window_seconds);
        }
        for (alias, target) in &config.aliases {
            registry.bind_queue(alias, target);
        }
        registry
    }

    pub fn register(&self, name: &str, max_requests: usize, window_seconds: u64) {
        debug!(queue = name, max_requests, window_seconds, "registered rate limiter");
        self.limiters.insert(
            name.to_string(),
            Arc::new(SlidingWindow::new(max_requests, window_seconds)),
        );
    }

    /// Route `alias` onto `target`'s limiter. The target does not need to
    /// exist yet; resolution happens at acquisition time.
    pub fn bind_queue(&self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    pub fn list_queues(&self) -> Vec<String> {
        self.limiters.iter().map(|e| e.key().clone()).collect()
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.limiters.contains_key(self.resolve(name).as_str())
    }

    fn resolve(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .map(|t| t.value().clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Block until the named queue admits one request. Unknown queues admit
    /// immediately: a missing limiter must not stall the pipeline.
    pub async fn apply_limit(&self, queue: &str) {
        let resolved = self.resolve(queue);
        let limiter = match self.limiters.get(&resolved) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                warn!(queue, %resolved, "no rate limiter registered, admitting");
                return;
            }
        };
        limiter.acquire().await;
    }
}

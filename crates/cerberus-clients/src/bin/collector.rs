//! Golden-data collector CLI: runs scenario specs against the live APIs
//! under a recording session and writes one masked golden file each.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use cerberus_cache::NullCache;
use cerberus_clients::{SearchClient, SearchOptions, UrlFetcher, WeatherClient};
use cerberus_golden::{
    run_collection, GoldenError, HttpTransport, OperationRegistry, ScenarioSpec,
};
use cerberus_ratelimit::RateLimiterRegistry;

#[derive(Parser, Debug)]
#[command(
    name = "collector",
    about = "Collect golden data for the upstream API clients"
)]
struct Args {
    /// Path to the scenarios JSON file.
    #[arg(long, short)]
    input: PathBuf,

    /// Output directory for golden data files.
    #[arg(long, short)]
    output: PathBuf,

    /// Comma-separated secrets to mask. Each entry is treated as an
    /// environment variable name; when unset, the literal value is used.
    #[arg(long, short)]
    secrets: Option<String>,

    /// Only collect scenarios from this module.
    #[arg(long)]
    module: Option<String>,

    /// Only collect scenarios calling this method.
    #[arg(long)]
    function: Option<String>,
}

fn resolve_secrets(spec: &str) -> Vec<String> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| std::env::var(entry).unwrap_or_else(|_| entry.to_string()))
        .collect()
}

fn str_arg(kwargs: &serde_json::Value, key: &str) -> Result<String, GoldenError> {
    kwargs[key]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| GoldenError::ScenarioFailed(format!("missing kwarg: {key}")))
}

fn build_registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();

    registry.register(
        "cerberus_clients.weather.WeatherClient.weather_by_city",
        Box::new(|init, kwargs, transport: Arc<dyn HttpTransport>| {
            Box::pin(async move {
                let client = WeatherClient::new(
                    str_arg(&init, "api_key")?,
                    Arc::new(NullCache::new()),
                    Arc::new(NullCache::new()),
                    0,
                    0,
                    10,
                    "weather",
                    Arc::new(RateLimiterRegistry::new()),
                    transport,
                );
                let city = str_arg(&kwargs, "city")?;
                let country = kwargs["country"].as_str().map(str::to_string);
                client
                    .weather_by_city(&city, country.as_deref())
                    .await
                    .map_err(|e| GoldenError::ScenarioFailed(e.to_string()))?;
                Ok("CombinedWeatherResult".to_string())
            })
        }),
    );

    registry.register(
        "cerberus_clients.weather.WeatherClient.coordinates",
        Box::new(|init, kwargs, transport: Arc<dyn HttpTransport>| {
            Box::pin(async move {
                let client = WeatherClient::new(
                    str_arg(&init, "api_key")?,
                    Arc::new(NullCache::new()),
                    Arc::new(NullCache::new()),
                    0,
                    0,
                    10,
                    "weather",
                    Arc::new(RateLimiterRegistry::new()),
                    transport,
                );
                let city = str_arg(&kwargs, "city")?;
                let country = kwargs["country"].as_str().map(str::to_string);
                client
                    .coordinates(&city, country.as_deref(), None)
                    .await
                    .map_err(|e| GoldenError::ScenarioFailed(e.to_string()))?;
                Ok("GeocodingResult".to_string())
            })
        }),
    );

    registry.register(
        "cerberus_clients.search.SearchClient.search",
        Box::new(|init, kwargs, transport: Arc<dyn HttpTransport>| {
            Box::pin(async move {
                let client = SearchClient::new(
                    str_arg(&init, "api_key")?,
                    str_arg(&init, "folder_id")?,
                    30,
                    Arc::new(NullCache::new()),
                    0,
                    "web-search",
                    Arc::new(RateLimiterRegistry::new()),
                    transport,
                );
                let query = str_arg(&kwargs, "query")?;
                client
                    .search(&query, &SearchOptions::default())
                    .await
                    .map_err(|e| GoldenError::ScenarioFailed(e.to_string()))?;
                Ok("SearchResponse".to_string())
            })
        }),
    );

    registry.register(
        "cerberus_clients.url.UrlFetcher.url_content",
        Box::new(|_init, kwargs, transport: Arc<dyn HttpTransport>| {
            Box::pin(async move {
                let fetcher = UrlFetcher::new(
                    Arc::new(NullCache::new()),
                    Arc::new(NullCache::new()),
                    0,
                    60,
                    "url-fetch",
                    Arc::new(RateLimiterRegistry::new()),
                    transport,
                    None,
                );
                let url = str_arg(&kwargs, "url")?;
                fetcher
                    .url_content(&url, true, usize::MAX, None)
                    .await
                    .map_err(|e| GoldenError::ScenarioFailed(e.to_string()))?;
                Ok("String".to_string())
            })
        }),
    );

    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "collector=info,cerberus_golden=info".into()),
        )
        .init();

    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.input)?;
    let mut scenarios: Vec<ScenarioSpec> = serde_json::from_str(&raw)?;
    if let Some(module) = &args.module {
        scenarios.retain(|s| &s.module == module);
    }
    if let Some(function) = &args.function {
        scenarios.retain(|s| &s.method == function);
    }
    info!(count = scenarios.len(), "loaded scenarios");

    let secrets = args
        .secrets
        .as_deref()
        .map(resolve_secrets)
        .unwrap_or_default();
    if secrets.is_empty() {
        eprintln!("warning: no secrets provided, sensitive data will not be masked");
    }

    let registry = build_registry();
    let summary = run_collection(&scenarios, &args.output, &secrets, &registry).await?;

    println!(
        "Collection complete: {} total, {} succeeded, {} failed",
        summary.total, summary.succeeded, summary.failed
    );

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

//! Cerberus service binary.
//!
//! Wires the root context from configuration and drives the pipeline from
//! newline-delimited JSON messages on stdin. The console platform stands
//! in for the real chat transport adapter, which connects through the
//! [`cerberus_bot::Platform`] trait.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::Parser;
use rusqlite::Connection;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use cerberus_bayes::{BayesConfig, NaiveBayesFilter, SqliteBayesStorage, TokenizerConfig};
use cerberus_bot::pipeline::run_delayed_tasks;
use cerberus_bot::{BotContext, Dispatcher, InboundMessage, Pipeline, Platform, SentMessage};
use cerberus_cache::{JsonCodec, JsonKeyGen, SqliteCache, StringCodec, StringKeyGen};
use cerberus_clients::{LlmClient, SearchClient, UrlFetcher, WeatherClient};
use cerberus_core::config::CerberusConfig;
use cerberus_core::MessageCategory;
use cerberus_golden::ReqwestTransport;
use cerberus_ratelimit::RateLimiterRegistry;
use cerberus_scheduler::{SchedulerEngine, SchedulerHandle};
use cerberus_store::{ChatStore, SettingsStore};

#[derive(Parser, Debug)]
#[command(name = "cerberus", about = "Chat moderation service")]
struct Args {
    /// Config file path (default: ~/.cerberus/cerberus.toml).
    #[arg(long, short)]
    config: Option<String>,
}

/// Stdout platform: outbound operations are logged instead of sent. The
/// production transport adapter replaces this through the Platform trait.
struct ConsolePlatform {
    next_message_id: Mutex<i64>,
}

impl ConsolePlatform {
    fn new() -> Self {
        Self {
            next_message_id: Mutex::new(1),
        }
    }
}

#[async_trait]
impl Platform for ConsolePlatform {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        category: MessageCategory,
        _reply_to: Option<i64>,
    ) -> cerberus_bot::error::Result<Option<SentMessage>> {
        println!("[send:{category}] chat {chat_id}: {text}");
        let mut next = self.next_message_id.lock().unwrap();
        *next += 1;
        Ok(Some(SentMessage {
            chat_id,
            message_id: *next,
        }))
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> cerberus_bot::error::Result<()> {
        println!("[delete] chat {chat_id}, message {message_id}");
        Ok(())
    }

    async fn delete_messages(
        &self,
        chat_id: i64,
        message_ids: &[i64],
    ) -> cerberus_bot::error::Result<()> {
        println!("[delete-bulk] chat {chat_id}, messages {message_ids:?}");
        Ok(())
    }

    async fn ban_chat_member(
        &self,
        chat_id: i64,
        user_id: i64,
        revoke_messages: bool,
    ) -> cerberus_bot::error::Result<()> {
        println!("[ban] chat {chat_id}, user {user_id}, revoke={revoke_messages}");
        Ok(())
    }

    async fn ban_chat_sender_chat(
        &self,
        chat_id: i64,
        sender_chat_id: i64,
    ) -> cerberus_bot::error::Result<()> {
        println!("[ban-sender-chat] chat {chat_id}, sender chat {sender_chat_id}");
        Ok(())
    }

    async fn unban_chat_member(
        &self,
        chat_id: i64,
        user_id: i64,
        _only_if_banned: bool,
    ) -> cerberus_bot::error::Result<()> {
        println!("[unban] chat {chat_id}, user {user_id}");
        Ok(())
    }

    async fn is_admin(&self, _chat_id: i64, _user_id: i64) -> cerberus_bot::error::Result<bool> {
        Ok(false)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cerberus=info,cerberus_bot=info".into()),
        )
        .init();

    let args = Args::parse();
    // A broken config is fatal; the process refuses to start.
    let config = CerberusConfig::load(args.config.as_deref())?;

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Arc::new(Mutex::new(Connection::open(&config.database.path)?));
    {
        let conn = conn.lock().unwrap();
        cerberus_cache::db::init_db(&conn)?;
    }

    let limiter = Arc::new(RateLimiterRegistry::from_config(&config.ratelimit));
    for (queue, max_requests, window_seconds) in [
        (config.search.ratelimiter_queue.as_str(), 10, 1),
        (config.weather.ratelimiter_queue.as_str(), 60, 60),
        (config.llm.ratelimiter_queue.as_str(), 20, 60),
        (config.fetcher.ratelimiter_queue.as_str(), 30, 60),
    ] {
        if !limiter.has_queue(queue) {
            limiter.register(queue, max_requests, window_seconds);
        }
    }

    let transport = Arc::new(ReqwestTransport::new());

    let search = if config.search.enabled {
        Some(Arc::new(SearchClient::new(
            config.search.api_key.clone(),
            config.search.folder_id.clone(),
            config.search.request_timeout_secs,
            Arc::new(SqliteCache::new(
                conn.clone(),
                "web-search",
                Box::new(JsonKeyGen::default()),
                Box::new(JsonCodec::new()),
                config.search.cache_ttl_secs,
                1000,
            )),
            config.search.cache_ttl_secs,
            config.search.ratelimiter_queue.clone(),
            limiter.clone(),
            transport.clone(),
        )))
    } else {
        None
    };

    let weather = if config.weather.enabled {
        Some(Arc::new(WeatherClient::new(
            config.weather.api_key.clone(),
            Arc::new(SqliteCache::new(
                conn.clone(),
                "geocoding",
                Box::new(StringKeyGen),
                Box::new(JsonCodec::new()),
                config.weather.geocoding_ttl_secs,
                10_000,
            )),
            Arc::new(SqliteCache::new(
                conn.clone(),
                "weather",
                Box::new(StringKeyGen),
                Box::new(JsonCodec::new()),
                config.weather.weather_ttl_secs,
                10_000,
            )),
            config.weather.geocoding_ttl_secs,
            config.weather.weather_ttl_secs,
            config.weather.request_timeout_secs,
            config.weather.ratelimiter_queue.clone(),
            limiter.clone(),
            transport.clone(),
        )))
    } else {
        None
    };

    let llm = if config.llm.enabled {
        Some(Arc::new(LlmClient::new(
            config.llm.api_key.clone(),
            config.llm.base_url.clone(),
            config.llm.ratelimiter_queue.clone(),
            limiter.clone(),
            transport.clone(),
        )))
    } else {
        None
    };

    let fetcher = Some(Arc::new(UrlFetcher::new(
        Arc::new(SqliteCache::new(
            conn.clone(),
            "url-content",
            Box::new(StringKeyGen),
            Box::new(JsonCodec::new()),
            config.fetcher.cache_ttl_secs,
            1000,
        )),
        Arc::new(SqliteCache::new(
            conn.clone(),
            "url-content-condensed",
            Box::new(JsonKeyGen::plain()),
            Box::new(StringCodec),
            config.fetcher.cache_ttl_secs,
            1000,
        )),
        config.fetcher.cache_ttl_secs,
        config.fetcher.request_timeout_secs,
        config.fetcher.ratelimiter_queue.clone(),
        limiter.clone(),
        transport.clone(),
        llm,
    )));

    let bayes_storage = Arc::new(SqliteBayesStorage::new(conn.clone())?);
    let bayes = Arc::new(NaiveBayesFilter::new(
        bayes_storage,
        BayesConfig {
            tokenizer: TokenizerConfig {
                use_trigrams: true,
                ..Default::default()
            },
            ..Default::default()
        },
    )?);

    let store = Arc::new(ChatStore::new(conn.clone())?);
    let settings = Arc::new(SettingsStore::new(conn.clone())?);
    let scheduler = SchedulerHandle::new(conn.clone())?;

    let ctx = Arc::new(BotContext {
        platform: Arc::new(ConsolePlatform::new()),
        store,
        settings,
        bayes,
        scheduler,
        limiter,
        search,
        weather,
        fetcher,
    });

    // Delayed-task engine plus its delivery loop.
    let (fired_tx, fired_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine = SchedulerEngine::new(conn, fired_tx)?;
    tokio::spawn(engine.run(shutdown_rx));
    tokio::spawn(run_delayed_tasks(ctx.clone(), fired_rx));

    let pipeline = Arc::new(Pipeline::new(ctx));
    let dispatcher = Dispatcher::new(pipeline);

    info!("cerberus started, reading messages from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundMessage>(&line) {
            Ok(message) => dispatcher.dispatch(message).await,
            Err(e) => warn!(error = %e, "unparseable inbound message"),
        }
    }

    info!("input closed, shutting down");
    if shutdown_tx.send(true).is_err() {
        error!("scheduler already stopped");
    }
    Ok(())
}

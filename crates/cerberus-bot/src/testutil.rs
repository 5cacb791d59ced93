//! Shared fixtures for the pipeline and spam-engine tests.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;

use cerberus_bayes::{BayesConfig, NaiveBayesFilter, SqliteBayesStorage};
use cerberus_ratelimit::RateLimiterRegistry;
use cerberus_scheduler::SchedulerHandle;
use cerberus_store::{ChatStore, SettingsStore};

use crate::context::BotContext;
use crate::envelope::{ChatKind, ChatRef, InboundMessage, UserRef};
use crate::platform::mock::MockPlatform;

/// Full context over one in-memory database and a scripted platform.
pub fn test_context(platform: Arc<MockPlatform>) -> Arc<BotContext> {
    let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
    let store = Arc::new(ChatStore::new(conn.clone()).unwrap());
    let settings = Arc::new(SettingsStore::new(conn.clone()).unwrap());
    let bayes_storage = Arc::new(SqliteBayesStorage::new(conn.clone()).unwrap());
    let bayes = Arc::new(NaiveBayesFilter::new(bayes_storage, BayesConfig::default()).unwrap());
    let scheduler = SchedulerHandle::new(conn).unwrap();

    Arc::new(BotContext {
        platform,
        store,
        settings,
        bayes,
        scheduler,
        limiter: Arc::new(RateLimiterRegistry::new()),
        search: None,
        weather: None,
        fetcher: None,
    })
}

pub fn group_message(chat_id: i64, user_id: i64, message_id: i64, text: &str) -> InboundMessage {
    InboundMessage {
        chat: ChatRef {
            id: chat_id,
            kind: ChatKind::Supergroup,
            title: "test chat".to_string(),
        },
        from: Some(UserRef {
            id: user_id,
            username: format!("user{user_id}"),
            full_name: format!("User {user_id}"),
        }),
        sender_chat_id: None,
        message_id,
        date: Utc::now(),
        text: Some(text.to_string()),
        entities: vec![],
        reply_to: None,
        thread_id: None,
        is_automatic_forward: false,
    }
}

//! Message pipeline orchestrator: validate, spam-check, record, dispatch
//! to the handler chain. Messages within one chat are processed in receive
//! order by a dedicated worker; chats proceed independently.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use cerberus_core::{ChatSettings, ChatSettingsKey, MessageCategory};
use cerberus_scheduler::{DelayedTask, TaskFunction};

use crate::context::BotContext;
use crate::envelope::{InboundMessage, MessageEnvelope, MessageType, UserRef};
use crate::handlers::{default_handlers, Handler, HandlerResult};
use crate::spam::{SpamEngine, SpamVerdict};
use crate::wizard;

pub struct Pipeline {
    ctx: Arc<BotContext>,
    engine: SpamEngine,
    handlers: Vec<Arc<dyn Handler>>,
}

impl Pipeline {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self::with_handlers(ctx, default_handlers())
    }

    pub fn with_handlers(ctx: Arc<BotContext>, mut handlers: Vec<Arc<dyn Handler>>) -> Self {
        handlers.sort_by_key(|h| h.meta().order);
        Self {
            engine: SpamEngine::new(ctx.clone()),
            ctx,
            handlers,
        }
    }

    pub fn context(&self) -> &Arc<BotContext> {
        &self.ctx
    }

    /// Run one inbound message through the full pipeline.
    pub async fn process(&self, raw: InboundMessage) {
        let envelope = match MessageEnvelope::ensure(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping invalid message");
                return;
            }
        };
        debug!(
            chat_id = envelope.chat.id,
            message_id = envelope.message_id,
            "processing message"
        );

        let settings = match self.ctx.settings.chat_settings(envelope.chat.id) {
            Ok(settings) => settings,
            Err(e) => {
                error!(error = %e, "failed to load chat settings, using defaults");
                ChatSettings::default()
            }
        };

        // Spam gate before anything else touches the message. The check
        // must not see the current message in the log, so recording comes
        // after.
        if !envelope.chat.is_private() && settings.get(ChatSettingsKey::DetectSpam).to_bool() {
            match self.engine.check_spam(&envelope, &settings).await {
                Ok(SpamVerdict::Ban(score)) => {
                    info!(
                        chat_id = envelope.chat.id,
                        score, "message handled as spam, pipeline terminated"
                    );
                    return;
                }
                Ok(verdict) => debug!(?verdict, "spam check passed"),
                // A broken classifier must never eat messages.
                Err(e) => error!(error = %e, "spam check failed, treating as non-spam"),
            }
        }

        if envelope.message_type == MessageType::Text {
            let category = if envelope.command().is_some() {
                MessageCategory::UserCommand
            } else {
                MessageCategory::User
            };
            if let Err(e) = self.ctx.store.record_message(
                envelope.chat.id,
                envelope.user.id,
                &envelope.user.username,
                &envelope.user.full_name,
                envelope.message_id,
                &envelope.message_text,
                category,
            ) {
                error!(error = %e, "failed to record message");
            }
        }

        for handler in &self.handlers {
            if !handler.matches(&envelope) {
                continue;
            }
            let name = handler.meta().name;
            match handler.handle(&self.ctx, &envelope, &settings).await {
                HandlerResult::Final => {
                    debug!(handler = name, "handler finished the pipeline");
                    break;
                }
                HandlerResult::Fatal => {
                    warn!(handler = name, "handler aborted the pipeline");
                    break;
                }
                HandlerResult::Error => {
                    // Handler errors are advisory; the chain continues.
                    warn!(handler = name, "handler reported an error");
                }
                HandlerResult::Next | HandlerResult::Skipped => {}
            }
        }
    }

    /// Route one callback-button press to the settings wizard.
    pub async fn process_callback(&self, chat_id: i64, from: &UserRef, payload: &str) {
        if let Err(e) = wizard::handle_callback(&self.ctx, chat_id, from, payload).await {
            warn!(error = %e, chat_id, "callback handling failed");
        }
    }
}

/// Fans inbound messages out to one worker per chat, preserving per-chat
/// receive order.
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    workers: DashMap<i64, mpsc::Sender<InboundMessage>>,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            workers: DashMap::new(),
        }
    }

    pub async fn dispatch(&self, message: InboundMessage) {
        let chat_id = message.chat.id;
        let tx = self
            .workers
            .entry(chat_id)
            .or_insert_with(|| {
                let (tx, mut rx) = mpsc::channel::<InboundMessage>(256);
                let pipeline = self.pipeline.clone();
                tokio::spawn(async move {
                    while let Some(message) = rx.recv().await {
                        pipeline.process(message).await;
                    }
                });
                tx
            })
            .clone();
        if tx.send(message).await.is_err() {
            warn!(chat_id, "chat worker is gone, message dropped");
        }
    }
}

/// Deliver fired delayed tasks. Runs until the scheduler channel closes.
pub async fn run_delayed_tasks(ctx: Arc<BotContext>, mut fired_rx: mpsc::Receiver<DelayedTask>) {
    while let Some(task) = fired_rx.recv().await {
        match task.function {
            TaskFunction::DeleteMessage => {
                let chat_id = task.payload["chat_id"].as_i64();
                let message_id = task.payload["message_id"].as_i64();
                match (chat_id, message_id) {
                    (Some(chat_id), Some(message_id)) => {
                        debug!(chat_id, message_id, "executing delayed delete");
                        if let Err(e) = ctx.platform.delete_message(chat_id, message_id).await {
                            error!(error = %e, "delayed delete failed");
                        }
                    }
                    _ => error!(task_id = %task.id, "malformed delete_message payload"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EntityKind, MessageEntity};
    use crate::platform::mock::MockPlatform;
    use crate::testutil::{group_message, test_context};

    use cerberus_core::SpamReason;

    fn pipeline(platform: Arc<MockPlatform>) -> Pipeline {
        Pipeline::new(test_context(platform))
    }

    async fn configure_seed_settings(pipeline: &Pipeline, chat_id: i64) {
        let settings = &pipeline.context().settings;
        settings
            .set(chat_id, ChatSettingsKey::AutoSpamMaxMessages, "5")
            .unwrap();
        settings
            .set(chat_id, ChatSettingsKey::SpamWarnThreshold, "40")
            .unwrap();
        settings
            .set(chat_id, ChatSettingsKey::SpamBanThreshold, "60")
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_text_leads_to_ban() {
        let platform = Arc::new(MockPlatform::new());
        let pipeline = pipeline(platform.clone());
        let chat_id = -100;
        configure_seed_settings(&pipeline, chat_id).await;

        // First send passes and is recorded.
        pipeline
            .process(group_message(chat_id, 7, 1, "Buy cheap deals!"))
            .await;
        assert!(platform.banned_users().is_empty());

        // The exact same text again: dup=1, others=0 in the last-10
        // window, score 100 > 60.
        pipeline
            .process(group_message(chat_id, 7, 2, "Buy cheap deals!"))
            .await;

        assert_eq!(platform.banned_users(), vec![(chat_id, 7)]);
        assert!(platform.deleted_messages().contains(&(chat_id, 2)));

        let store = &pipeline.context().store;
        let exemplars = store.spam_messages_by_text("Buy cheap deals!").unwrap();
        assert_eq!(exemplars.len(), 1);
        assert_eq!(exemplars[0].reason, SpamReason::Auto);
        let user = store.chat_user(chat_id, 7).unwrap().unwrap();
        assert!(user.is_spammer);

        // Ban notification got a delayed self-destruct task.
        assert_eq!(pipeline.context().scheduler.pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn url_plus_bot_mention_exceeds_ban_threshold() {
        let platform = Arc::new(MockPlatform::new());
        let pipeline = pipeline(platform.clone());
        let chat_id = -100;
        configure_seed_settings(&pipeline, chat_id).await;

        let text = "Click https://example.com and @evilbot for prize";
        let mut message = group_message(chat_id, 9, 1, text);
        message.entities = vec![
            MessageEntity {
                kind: EntityKind::Url,
                offset: 6,
                length: 19,
            },
            MessageEntity {
                kind: EntityKind::Mention,
                offset: 30,
                length: 8,
            },
        ];
        pipeline.process(message).await;

        // +60 url, +60 stranger mention, +40 bot suffix = 160 > 60.
        assert_eq!(platform.banned_users(), vec![(chat_id, 9)]);
    }

    #[tokio::test]
    async fn established_users_skip_the_check_and_feed_ham() {
        let platform = Arc::new(MockPlatform::new());
        let pipeline = pipeline(platform.clone());
        let chat_id = -100;
        configure_seed_settings(&pipeline, chat_id).await;

        // Five ordinary messages push the user past the ceiling.
        for message_id in 1..=5 {
            let text = format!("regular chatter number {message_id}");
            pipeline
                .process(group_message(chat_id, 7, message_id, &text))
                .await;
        }
        // Now even a duplicate burst is ignored.
        pipeline
            .process(group_message(chat_id, 7, 6, "Buy cheap deals!"))
            .await;
        pipeline
            .process(group_message(chat_id, 7, 7, "Buy cheap deals!"))
            .await;

        assert!(platform.banned_users().is_empty());
        // The skipped messages were learned as ham.
        let stats = pipeline.context().bayes.model_info(Some(chat_id)).unwrap();
        assert!(stats.ham_messages >= 2);
    }

    #[tokio::test]
    async fn private_chats_are_never_spam_checked() {
        let platform = Arc::new(MockPlatform::new());
        let pipeline = pipeline(platform.clone());

        let mut message = group_message(5, 5, 1, "Buy cheap deals!");
        message.chat.kind = crate::envelope::ChatKind::Private;
        // Same-text spam exemplar exists, which would score 100 in a group.
        pipeline
            .context()
            .store
            .add_spam_message(-1, 2, 1, "Buy cheap deals!", SpamReason::Auto, 100.0)
            .unwrap();

        pipeline.process(message).await;
        assert!(platform.banned_users().is_empty());
    }

    #[tokio::test]
    async fn invalid_messages_are_dropped_silently() {
        let platform = Arc::new(MockPlatform::new());
        let pipeline = pipeline(platform.clone());

        let mut message = group_message(-100, 7, 1, "hello");
        message.from = None;
        pipeline.process(message).await;

        assert!(platform.actions().is_empty());
    }

    #[tokio::test]
    async fn delayed_delete_task_reaches_the_platform() {
        let platform = Arc::new(MockPlatform::new());
        let ctx = test_context(platform.clone());

        let (tx, rx) = mpsc::channel(4);
        tx.send(DelayedTask {
            id: "del-1-2".to_string(),
            fire_at: String::new(),
            function: TaskFunction::DeleteMessage,
            payload: serde_json::json!({"chat_id": -100, "message_id": 42}),
            created_at: String::new(),
        })
        .await
        .unwrap();
        drop(tx);

        run_delayed_tasks(ctx, rx).await;
        assert_eq!(platform.deleted_messages(), vec![(-100, 42)]);
    }

    #[tokio::test]
    async fn settings_callback_updates_settings_for_admins() {
        let platform = Arc::new(MockPlatform::new());
        let pipeline = pipeline(platform.clone());
        let chat_id = -100;
        platform.make_admin(chat_id, 7);

        let admin = UserRef {
            id: 7,
            username: "alice".to_string(),
            full_name: "Alice".to_string(),
        };
        pipeline
            .process_callback(chat_id, &admin, r#"{"a":"set","k":"detect-spam","v":"false"}"#)
            .await;

        let settings = pipeline.context().settings.chat_settings(chat_id).unwrap();
        assert!(!settings.get(ChatSettingsKey::DetectSpam).to_bool());

        // A non-admin is denied.
        let stranger = UserRef {
            id: 8,
            username: "bob".to_string(),
            full_name: String::new(),
        };
        pipeline
            .process_callback(chat_id, &stranger, r#"{"a":"set","k":"detect-spam","v":"true"}"#)
            .await;
        let settings = pipeline.context().settings.chat_settings(chat_id).unwrap();
        assert!(!settings.get(ChatSettingsKey::DetectSpam).to_bool());
    }
}

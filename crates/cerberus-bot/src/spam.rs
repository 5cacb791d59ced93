//! Spam decision engine: rule heuristics fused with the Bayes classifier,
//! plus the mark-spam and unban actions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use cerberus_core::{ChatSettings, ChatSettingsKey, MessageCategory, SpamReason};
use cerberus_scheduler::TaskFunction;
use cerberus_store::ChatUser;

use crate::context::BotContext;
use crate::envelope::{EntityKind, MessageEnvelope, UserRef};
use crate::error::Result;

const URL_SCORE: f64 = 60.0;
const MENTION_SCORE: f64 = 60.0;
const BOT_MENTION_BONUS: f64 = 40.0;
/// How many recent user messages the duplicate heuristic inspects.
const DUPLICATE_WINDOW: usize = 10;
/// Ban notifications self-destruct after this long.
const NOTIFICATION_TTL_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpamVerdict {
    Pass,
    Warn(f64),
    Ban(f64),
}

/// Outcome of a pretraining run over stored history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PretrainStats {
    pub spam_learned: usize,
    pub ham_learned: usize,
    pub failed: usize,
}

/// Target of a mark-spam action, independent of how it was triggered
/// (automatic verdict or a /spam reply).
#[derive(Debug, Clone)]
pub struct SpamTarget {
    pub chat_id: i64,
    pub user: UserRef,
    pub message_id: i64,
    pub text: String,
    pub sender_chat_id: Option<i64>,
}

impl SpamTarget {
    pub fn from_envelope(envelope: &MessageEnvelope) -> Self {
        Self {
            chat_id: envelope.chat.id,
            user: envelope.user.clone(),
            message_id: envelope.message_id,
            text: envelope.message_text.clone(),
            sender_chat_id: envelope.sender_chat_id,
        }
    }
}

pub struct SpamEngine {
    ctx: Arc<BotContext>,
}

impl SpamEngine {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    /// Run the full decision for one message. Returns the verdict; on a
    /// ban the offending message has already been handled via
    /// [`Self::mark_as_spam`] and the pipeline must not process it further.
    pub async fn check_spam(
        &self,
        envelope: &MessageEnvelope,
        settings: &ChatSettings,
    ) -> Result<SpamVerdict> {
        if envelope.is_automatic_forward {
            // Automatic forwards from the linked channel are never spam.
            return Ok(SpamVerdict::Pass);
        }
        if envelope.user.id == envelope.chat.id {
            // Anonymous admin posting on behalf of the chat.
            return Ok(SpamVerdict::Pass);
        }
        if envelope.message_text.is_empty() {
            // Text-less media messages are skipped, a known limitation.
            return Ok(SpamVerdict::Pass);
        }

        let chat_id = envelope.chat.id;
        let sender = &envelope.user;
        let user_info = self.ctx.store.chat_user(chat_id, sender.id)?;
        let (messages_count, is_spammer, not_spammer) = match &user_info {
            Some(user) => (user.messages_count, user.is_spammer, user.not_spammer()),
            // First message we see from this user.
            None => (1, false, false),
        };

        let max_check_messages = settings.get(ChatSettingsKey::AutoSpamMaxMessages).to_int();
        if max_check_messages != 0 && messages_count >= max_check_messages {
            // Established user. Feed the corpus while we are here.
            if !is_spammer {
                self.mark_as_ham(chat_id, &envelope.message_text);
            }
            return Ok(SpamVerdict::Pass);
        }

        if not_spammer {
            info!(user_id = sender.id, chat_id, "user explicitly marked not spammer, skipping");
            return Ok(SpamVerdict::Pass);
        }

        let mut score: f64 = 0.0;

        if is_spammer {
            info!(user_id = sender.id, chat_id, "known spammer posting again");
            score += 100.0;
        }

        // Duplicate-message heuristic over the user's recent history.
        let recent = self
            .ctx
            .store
            .chat_messages_by_user(chat_id, sender.id, DUPLICATE_WINDOW)?;
        let mut duplicates = 0usize;
        let mut others = 0usize;
        for message in &recent {
            if message.message_text == envelope.message_text
                && message.message_id != envelope.message_id
            {
                duplicates += 1;
            } else {
                others += 1;
            }
        }
        if duplicates > 0 && duplicates > others {
            let dup_score =
                (duplicates + 1) as f64 / (duplicates + 1 + others) as f64 * 100.0;
            debug!(duplicates, others, dup_score, "duplicate heuristic fired");
            score = score.max(dup_score);
        }

        // Known spam text is spam again.
        if !self
            .ctx
            .store
            .spam_messages_by_text(&envelope.message_text)?
            .is_empty()
        {
            info!(chat_id, "message text matches stored spam");
            score = score.max(100.0);
        }

        score += self.score_entities(envelope)?;

        let warn_threshold = settings.get(ChatSettingsKey::SpamWarnThreshold).to_float();
        let ban_threshold = settings.get(ChatSettingsKey::SpamBanThreshold).to_float();

        if score < ban_threshold && settings.get(ChatSettingsKey::BayesEnabled).to_bool() {
            let result = self.ctx.bayes.classify(
                &envelope.message_text,
                Some(chat_id),
                Some(warn_threshold),
                true,
            );
            let min_confidence = settings.get(ChatSettingsKey::BayesMinConfidence).to_float();
            if result.confidence >= min_confidence {
                debug!(
                    rules_score = score,
                    bayes_score = result.score,
                    confidence = result.confidence,
                    "adding Bayes score"
                );
                score += result.score;
            } else {
                debug!(
                    confidence = result.confidence,
                    min_confidence, "Bayes confidence too low, ignoring"
                );
            }
        }

        if score > ban_threshold {
            info!(score, ban_threshold, chat_id, user_id = sender.id, "banning for spam");
            self.send_ban_notification(envelope, score, ban_threshold).await;
            self.mark_as_spam(&SpamTarget::from_envelope(envelope), SpamReason::Auto, score)
                .await?;
            return Ok(SpamVerdict::Ban(score));
        }
        if score >= warn_threshold {
            info!(score, warn_threshold, chat_id, user_id = sender.id, "possible spam");
            let _ = self
                .ctx
                .platform
                .send_message(
                    chat_id,
                    &format!(
                        "Возможно спам (Вероятность: {score:.0}, порог: {warn_threshold:.0})"
                    ),
                    MessageCategory::BotSpamNotification,
                    Some(envelope.message_id),
                )
                .await;
            return Ok(SpamVerdict::Warn(score));
        }

        debug!(score, warn_threshold, "not spam");
        Ok(SpamVerdict::Pass)
    }

    /// URL and mention scoring over the message entity annotations.
    fn score_entities(&self, envelope: &MessageEnvelope) -> Result<f64> {
        let mut score = 0.0;
        for entity in &envelope.entities {
            match entity.kind {
                EntityKind::Url | EntityKind::TextLink => {
                    debug!("url entity, +{URL_SCORE}");
                    score += URL_SCORE;
                }
                EntityKind::Mention => {
                    let mention = envelope.entity_text(entity);
                    let known = self
                        .ctx
                        .store
                        .chat_user_by_username(envelope.chat.id, &mention)?;
                    if known.is_none() {
                        debug!(%mention, "mention of a stranger, +{MENTION_SCORE}");
                        score += MENTION_SCORE;
                        if mention.ends_with("bot") {
                            debug!(%mention, "bot mention, +{BOT_MENTION_BONUS}");
                            score += BOT_MENTION_BONUS;
                        }
                    }
                }
            }
        }
        Ok(score)
    }

    async fn send_ban_notification(&self, envelope: &MessageEnvelope, score: f64, threshold: f64) {
        let sender = &envelope.user;
        let text = format!(
            "Пользователь [{name}](tg://user?id={id}) заблокирован за спам.\n\
             (Вероятность: {score:.0}, порог: {threshold:.0})\n\
             (Данное сообщение будет удалено в течение минуты)",
            name = sender.display_name(),
            id = sender.id,
        );
        match self
            .ctx
            .platform
            .send_message(
                envelope.chat.id,
                &text,
                MessageCategory::BotSpamNotification,
                None,
            )
            .await
        {
            Ok(Some(sent)) => {
                let task_id = format!("del-{}-{}", sent.chat_id, sent.message_id);
                if let Err(e) = self.ctx.scheduler.add_task(
                    &task_id,
                    Utc::now() + Duration::seconds(NOTIFICATION_TTL_SECS),
                    TaskFunction::DeleteMessage,
                    serde_json::json!({
                        "chat_id": sent.chat_id,
                        "message_id": sent.message_id,
                    }),
                ) {
                    error!(error = %e, "failed to schedule notification cleanup");
                }
            }
            Ok(None) => error!("ban notification was not sent"),
            Err(e) => error!(error = %e, "failed to send ban notification"),
        }
    }

    /// Mark a message as spam: learn, persist the exemplar, delete the
    /// message, ban the sender, flag the user, optionally purge their
    /// recent messages. Steps tolerate earlier failures so an interrupted
    /// run still converges on a banned sender.
    pub async fn mark_as_spam(
        &self,
        target: &SpamTarget,
        reason: SpamReason,
        score: f64,
    ) -> Result<()> {
        let chat_id = target.chat_id;
        let user_id = target.user.id;
        let settings = self.ctx.settings.chat_settings(chat_id)?;

        if self
            .ctx
            .platform
            .is_admin(chat_id, user_id)
            .await
            .unwrap_or(false)
        {
            warn!(chat_id, user_id, "attempt to mark an admin as spammer");
            let _ = self
                .ctx
                .platform
                .send_message(
                    chat_id,
                    "Алярм! Попытка представить администратора спаммером",
                    MessageCategory::BotCommandReply,
                    None,
                )
                .await;
            return Ok(());
        }

        let can_mark_old_users = settings
            .get(ChatSettingsKey::AllowMarkSpamOldUsers)
            .to_bool();
        if reason != SpamReason::Admin || !can_mark_old_users {
            let max_messages = settings.get(ChatSettingsKey::AutoSpamMaxMessages).to_int();
            let user_info = self.ctx.store.chat_user(chat_id, user_id)?;
            if max_messages != 0
                && user_info
                    .map(|u| u.messages_count > max_messages)
                    .unwrap_or(false)
            {
                warn!(chat_id, user_id, "attempt to mark an established user as spammer");
                let _ = self
                    .ctx
                    .platform
                    .send_message(
                        chat_id,
                        "Алярм! Попытка представить честного пользователя спаммером",
                        MessageCategory::BotCommandReply,
                        None,
                    )
                    .await;
                return Ok(());
            }
        }

        if !target.text.is_empty() && settings.get(ChatSettingsKey::BayesAutoLearn).to_bool() {
            if let Err(e) = self.ctx.bayes.learn_spam(&target.text, Some(chat_id)) {
                error!(error = %e, "failed to learn spam message");
            }
        }

        if !target.text.is_empty() {
            self.ctx.store.add_spam_message(
                chat_id,
                user_id,
                target.message_id,
                &target.text,
                reason,
                score,
            )?;
        }

        if let Err(e) = self
            .ctx
            .platform
            .delete_message(chat_id, target.message_id)
            .await
        {
            error!(error = %e, "failed to delete spam message");
        }
        if let Some(sender_chat_id) = target.sender_chat_id {
            if let Err(e) = self
                .ctx
                .platform
                .ban_chat_sender_chat(chat_id, sender_chat_id)
                .await
            {
                error!(error = %e, "failed to ban sender chat");
            }
        }
        if let Err(e) = self
            .ctx
            .platform
            .ban_chat_member(chat_id, user_id, true)
            .await
        {
            error!(error = %e, "failed to ban chat member");
        }

        self.ctx.store.ensure_user(
            chat_id,
            user_id,
            &target.user.username,
            &target.user.full_name,
        )?;
        self.ctx.store.set_user_spammer(chat_id, user_id, true)?;
        info!(chat_id, user_id, %reason, score, "user banned for spam");

        if settings
            .get(ChatSettingsKey::SpamDeleteAllUserMessages)
            .to_bool()
        {
            let recent = self
                .ctx
                .store
                .chat_messages_by_user(chat_id, user_id, DUPLICATE_WINDOW)?;
            let message_ids: Vec<i64> = recent
                .iter()
                .map(|m| m.message_id)
                .filter(|id| *id != target.message_id)
                .collect();
            if !message_ids.is_empty() {
                if let Err(e) = self
                    .ctx
                    .platform
                    .delete_messages(chat_id, &message_ids)
                    .await
                {
                    error!(error = %e, "failed to bulk-delete spammer messages");
                }
            }
        }

        Ok(())
    }

    /// Learn a message as ham. Failures only log; this is opportunistic.
    pub fn mark_as_ham(&self, chat_id: i64, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Err(e) = self.ctx.bayes.learn_ham(text, Some(chat_id)) {
            debug!(error = %e, "failed to learn ham message");
        }
    }

    /// Seed the classifier from history: stored spam exemplars for the
    /// chat plus recent user messages as ham, skipping anything authored
    /// by a known spam sender.
    pub fn pretrain_from_history(&self, chat_id: i64, limit: usize) -> Result<PretrainStats> {
        let mut stats = PretrainStats::default();

        let mut spam_user_ids = std::collections::HashSet::new();
        for exemplar in self.ctx.store.spam_messages(limit)? {
            if exemplar.chat_id != chat_id || exemplar.message_text.is_empty() {
                continue;
            }
            spam_user_ids.insert(exemplar.user_id);
            match self
                .ctx
                .bayes
                .learn_spam(&exemplar.message_text, Some(chat_id))
            {
                Ok(()) => stats.spam_learned += 1,
                Err(_) => stats.failed += 1,
            }
        }

        for message in self.ctx.store.recent_user_messages(chat_id, limit)? {
            if message.message_text.is_empty() || spam_user_ids.contains(&message.user_id) {
                continue;
            }
            match self
                .ctx
                .bayes
                .learn_ham(&message.message_text, Some(chat_id))
            {
                Ok(()) => stats.ham_learned += 1,
                Err(_) => stats.failed += 1,
            }
        }

        info!(chat_id, ?stats, "pretraining completed");
        Ok(stats)
    }

    /// Inverse of mark-spam: lift the ban, clear the flag, migrate the
    /// user's spam exemplars into the ham store, and exempt them from
    /// future checks.
    pub async fn unban(&self, user: &ChatUser) -> Result<()> {
        let chat_id = user.chat_id;
        let user_id = user.user_id;

        self.ctx
            .platform
            .unban_chat_member(chat_id, user_id, true)
            .await?;

        self.ctx
            .store
            .ensure_user(chat_id, user_id, &user.username, &user.full_name)?;
        self.ctx.store.set_user_spammer(chat_id, user_id, false)?;

        // Correct the training corpus: everything we held against this
        // user becomes ham.
        let spam_messages = self.ctx.store.spam_messages_by_user(chat_id, user_id)?;
        self.ctx.store.delete_spam_messages_by_user(chat_id, user_id)?;
        for message in &spam_messages {
            self.ctx.store.add_ham_message(
                message.chat_id,
                message.user_id,
                message.message_id,
                &message.message_text,
                SpamReason::Unban,
                message.score,
            )?;
        }

        let mut metadata: HashMap<String, String> = self
            .ctx
            .store
            .chat_user(chat_id, user_id)?
            .map(|u| u.metadata)
            .unwrap_or_default();
        metadata.insert("notSpammer".to_string(), "true".to_string());
        self.ctx.store.set_user_metadata(chat_id, user_id, &metadata)?;

        info!(chat_id, user_id, migrated = spam_messages.len(), "user unbanned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EntityKind, MessageEntity, MessageEnvelope};
    use crate::platform::mock::{Action, MockPlatform};
    use crate::testutil::{group_message, test_context};

    fn engine(platform: Arc<MockPlatform>) -> SpamEngine {
        SpamEngine::new(test_context(platform))
    }

    fn envelope_with_url(chat_id: i64, user_id: i64, message_id: i64) -> MessageEnvelope {
        let text = "visit https://spam.example now";
        let mut message = group_message(chat_id, user_id, message_id, text);
        message.entities = vec![MessageEntity {
            kind: EntityKind::Url,
            offset: 6,
            length: 19,
        }];
        MessageEnvelope::ensure(message).unwrap()
    }

    fn settings_with(warn: &str, ban: &str) -> ChatSettings {
        let mut overrides = HashMap::new();
        overrides.insert(
            ChatSettingsKey::SpamWarnThreshold,
            cerberus_core::ChatSettingsValue::new(warn),
        );
        overrides.insert(
            ChatSettingsKey::SpamBanThreshold,
            cerberus_core::ChatSettingsValue::new(ban),
        );
        overrides.insert(
            ChatSettingsKey::BayesEnabled,
            cerberus_core::ChatSettingsValue::new("false"),
        );
        ChatSettings::new(overrides)
    }

    /// A single URL entity scores exactly 60; sweep the thresholds around
    /// it and check exactly one branch fires per call.
    #[tokio::test]
    async fn exactly_one_decision_branch_fires() {
        let platform = Arc::new(MockPlatform::new());
        let engine = engine(platform.clone());

        // warn 70, ban 80: 60 is below both.
        let verdict = engine
            .check_spam(&envelope_with_url(-1, 7, 1), &settings_with("70", "80"))
            .await
            .unwrap();
        assert_eq!(verdict, SpamVerdict::Pass);

        // warn 40, ban 70: warn <= 60 <= ban.
        let verdict = engine
            .check_spam(&envelope_with_url(-2, 7, 1), &settings_with("40", "70"))
            .await
            .unwrap();
        assert_eq!(verdict, SpamVerdict::Warn(60.0));

        // warn 40, ban 50: 60 exceeds the ban threshold.
        let verdict = engine
            .check_spam(&envelope_with_url(-3, 7, 1), &settings_with("40", "50"))
            .await
            .unwrap();
        assert_eq!(verdict, SpamVerdict::Ban(60.0));
    }

    /// A score exactly at the ban threshold warns, not bans.
    #[tokio::test]
    async fn ban_threshold_is_exclusive() {
        let platform = Arc::new(MockPlatform::new());
        let engine = engine(platform.clone());
        let verdict = engine
            .check_spam(&envelope_with_url(-1, 7, 1), &settings_with("40", "60"))
            .await
            .unwrap();
        assert_eq!(verdict, SpamVerdict::Warn(60.0));
        assert!(platform.banned_users().is_empty());
    }

    #[tokio::test]
    async fn automatic_forwards_and_anonymous_admins_pass() {
        let platform = Arc::new(MockPlatform::new());
        let engine = engine(platform.clone());

        let mut message = group_message(-1, 7, 1, "spam spam spam");
        message.is_automatic_forward = true;
        let envelope = MessageEnvelope::ensure(message).unwrap();
        assert_eq!(
            engine
                .check_spam(&envelope, &settings_with("0", "0"))
                .await
                .unwrap(),
            SpamVerdict::Pass
        );

        // Sender id equal to chat id means an anonymous admin post.
        let message = group_message(-1, -1, 2, "spam spam spam");
        let envelope = MessageEnvelope::ensure(message).unwrap();
        assert_eq!(
            engine
                .check_spam(&envelope, &settings_with("0", "0"))
                .await
                .unwrap(),
            SpamVerdict::Pass
        );
    }

    #[tokio::test]
    async fn admins_cannot_be_marked_as_spammers() {
        let platform = Arc::new(MockPlatform::new());
        let engine = engine(platform.clone());
        platform.make_admin(-1, 7);

        let target = SpamTarget {
            chat_id: -1,
            user: UserRef {
                id: 7,
                username: "admin".to_string(),
                full_name: "Admin".to_string(),
            },
            message_id: 5,
            text: "not actually spam".to_string(),
            sender_chat_id: None,
        };
        engine.mark_as_spam(&target, SpamReason::User, 50.0).await.unwrap();

        assert!(platform.banned_users().is_empty());
        assert!(platform
            .sent_texts()
            .iter()
            .any(|text| text.contains("Алярм")));
    }

    #[tokio::test]
    async fn marking_spam_bans_sender_chat_too() {
        let platform = Arc::new(MockPlatform::new());
        let engine = engine(platform.clone());

        let target = SpamTarget {
            chat_id: -1,
            user: UserRef {
                id: 7,
                username: "spammer".to_string(),
                full_name: String::new(),
            },
            message_id: 5,
            text: "buy now".to_string(),
            sender_chat_id: Some(-999),
        };
        engine.mark_as_spam(&target, SpamReason::Auto, 100.0).await.unwrap();

        let actions = platform.actions();
        assert!(actions.contains(&Action::BanSenderChat {
            chat_id: -1,
            sender_chat_id: -999
        }));
        assert!(actions.contains(&Action::Ban {
            chat_id: -1,
            user_id: 7,
            revoke_messages: true
        }));
    }

    /// Mark two messages as spam, then unban: the spam store empties, the
    /// ham store receives the migrated exemplars, and the user is exempt
    /// from future checks.
    #[tokio::test]
    async fn unban_migrates_the_corpus() {
        let platform = Arc::new(MockPlatform::new());
        let ctx = test_context(platform.clone());
        let engine = SpamEngine::new(ctx.clone());

        let alice = UserRef {
            id: 7,
            username: "alice".to_string(),
            full_name: "Alice".to_string(),
        };
        for (message_id, text) in [(1, "spam one"), (2, "spam two")] {
            let target = SpamTarget {
                chat_id: -1,
                user: alice.clone(),
                message_id,
                text: text.to_string(),
                sender_chat_id: None,
            };
            engine.mark_as_spam(&target, SpamReason::Auto, 90.0).await.unwrap();
        }
        assert_eq!(ctx.store.spam_messages_by_user(-1, 7).unwrap().len(), 2);
        assert_eq!(ctx.store.ham_messages_by_user(-1, 7).unwrap().len(), 0);

        let user = ctx.store.chat_user(-1, 7).unwrap().unwrap();
        engine.unban(&user).await.unwrap();

        assert!(ctx.store.spam_messages_by_user(-1, 7).unwrap().is_empty());
        let ham = ctx.store.ham_messages_by_user(-1, 7).unwrap();
        assert_eq!(ham.len(), 2);
        assert!(ham.iter().all(|m| m.reason == SpamReason::Unban));

        let user = ctx.store.chat_user(-1, 7).unwrap().unwrap();
        assert!(!user.is_spammer);
        assert!(user.not_spammer());
        assert!(platform
            .actions()
            .contains(&Action::Unban { chat_id: -1, user_id: 7 }));

        // Future spam checks skip this user entirely.
        let envelope = MessageEnvelope::ensure(group_message(-1, 7, 10, "buy now cheap")).unwrap();
        let verdict = engine
            .check_spam(&envelope, &settings_with("1", "2"))
            .await
            .unwrap();
        assert_eq!(verdict, SpamVerdict::Pass);
    }

    #[tokio::test]
    async fn pretraining_learns_spam_and_clean_history() {
        let platform = Arc::new(MockPlatform::new());
        let ctx = test_context(platform);
        let engine = SpamEngine::new(ctx.clone());

        ctx.store
            .add_spam_message(-1, 99, 1, "crypto casino bonus", SpamReason::Auto, 100.0)
            .unwrap();
        // User 7 chats normally; user 99 is the spam author and must not
        // contribute ham.
        ctx.store
            .record_message(-1, 7, "alice", "Alice", 2, "lunch plans today", MessageCategory::User)
            .unwrap();
        ctx.store
            .record_message(-1, 99, "spammer", "", 3, "hello everyone", MessageCategory::User)
            .unwrap();

        let stats = engine.pretrain_from_history(-1, 1000).unwrap();
        assert_eq!(stats.spam_learned, 1);
        assert_eq!(stats.ham_learned, 1);
        assert_eq!(stats.failed, 0);

        let model = ctx.bayes.model_info(Some(-1)).unwrap();
        assert_eq!(model.spam_messages, 1);
        assert_eq!(model.ham_messages, 1);
    }

    #[tokio::test]
    async fn known_spam_text_scores_maximum() {
        let platform = Arc::new(MockPlatform::new());
        let ctx = test_context(platform.clone());
        let engine = SpamEngine::new(ctx.clone());

        ctx.store
            .add_spam_message(-5, 2, 1, "Limited offer!", SpamReason::Admin, 100.0)
            .unwrap();

        let envelope = MessageEnvelope::ensure(group_message(-1, 7, 1, "Limited offer!")).unwrap();
        let verdict = engine
            .check_spam(&envelope, &settings_with("40", "60"))
            .await
            .unwrap();
        assert!(matches!(verdict, SpamVerdict::Ban(score) if score >= 100.0));
    }

    #[tokio::test]
    async fn mentions_of_chat_members_do_not_score() {
        let platform = Arc::new(MockPlatform::new());
        let ctx = test_context(platform.clone());
        let engine = SpamEngine::new(ctx.clone());

        // "bob" is a known member of the chat.
        ctx.store
            .record_message(-1, 8, "bob", "Bob", 1, "hi", MessageCategory::User)
            .unwrap();

        let text = "thanks @bob";
        let mut message = group_message(-1, 7, 2, text);
        message.entities = vec![MessageEntity {
            kind: EntityKind::Mention,
            offset: 7,
            length: 4,
        }];
        let envelope = MessageEnvelope::ensure(message).unwrap();
        let verdict = engine
            .check_spam(&envelope, &settings_with("40", "60"))
            .await
            .unwrap();
        assert_eq!(verdict, SpamVerdict::Pass);
    }
}

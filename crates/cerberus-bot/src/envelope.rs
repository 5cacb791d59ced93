//! Raw inbound messages and their validated envelope form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
}

impl UserRef {
    /// Display name preferred for user-facing mentions.
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: i64,
    pub kind: ChatKind,
    #[serde(default)]
    pub title: String,
}

impl ChatRef {
    pub fn is_private(&self) -> bool {
        self.kind == ChatKind::Private
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Url,
    TextLink,
    Mention,
}

/// Entity annotation over the message text; offsets count characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRef {
    pub message_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from: Option<UserRef>,
}

/// Raw message as delivered by the platform adapter. Anything optional
/// here is validated by [`MessageEnvelope::ensure`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat: ChatRef,
    #[serde(default)]
    pub from: Option<UserRef>,
    /// Set when the message was posted on behalf of a channel or an
    /// anonymous admin.
    #[serde(default)]
    pub sender_chat_id: Option<i64>,
    pub message_id: i64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
    #[serde(default)]
    pub reply_to: Option<ReplyRef>,
    #[serde(default)]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub is_automatic_forward: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Unknown,
}

/// Validated, immutable form of an inbound message. Created on receive,
/// destroyed when the pipeline invocation completes.
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    pub user: UserRef,
    pub chat: ChatRef,
    pub message_id: i64,
    pub date: DateTime<Utc>,
    pub message_text: String,
    pub message_type: MessageType,
    pub reply_id: Option<i64>,
    pub reply_text: Option<String>,
    pub is_reply: bool,
    pub reply_user: Option<UserRef>,
    pub thread_id: Option<i64>,
    pub entities: Vec<MessageEntity>,
    pub sender_chat_id: Option<i64>,
    pub is_automatic_forward: bool,
}

impl MessageEnvelope {
    /// Validate a raw message. Missing user or chat information is a
    /// validation error: the message is logged and dropped upstream.
    pub fn ensure(message: InboundMessage) -> Result<Self> {
        let user = message
            .from
            .ok_or_else(|| BotError::Validation("message user undefined".to_string()))?;

        let (message_text, message_type) = match message.text {
            Some(text) if !text.is_empty() => (text, MessageType::Text),
            _ => (String::new(), MessageType::Unknown),
        };

        let (reply_id, reply_text, reply_user, is_reply) = match message.reply_to {
            Some(reply) => (Some(reply.message_id), reply.text, reply.from, true),
            None => (None, None, None, false),
        };

        Ok(Self {
            user,
            chat: message.chat,
            message_id: message.message_id,
            date: message.date,
            message_text,
            message_type,
            reply_id,
            reply_text,
            is_reply,
            reply_user,
            thread_id: message.thread_id,
            entities: message.entities,
            sender_chat_id: message.sender_chat_id,
            is_automatic_forward: message.is_automatic_forward,
        })
    }

    /// Slice the message text covered by an entity (character offsets).
    pub fn entity_text(&self, entity: &MessageEntity) -> String {
        self.message_text
            .chars()
            .skip(entity.offset)
            .take(entity.length)
            .collect()
    }

    /// Parse `/command args`, dropping a `@botname` suffix on the command.
    pub fn command(&self) -> Option<(String, String)> {
        let text = self.message_text.trim();
        let stripped = text.strip_prefix('/')?;
        let (head, rest) = match stripped.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim().to_string()),
            None => (stripped, String::new()),
        };
        let command = head.split('@').next().unwrap_or(head).to_lowercase();
        if command.is_empty() {
            return None;
        }
        Some((command, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: Option<&str>) -> InboundMessage {
        InboundMessage {
            chat: ChatRef {
                id: -100,
                kind: ChatKind::Supergroup,
                title: "test chat".to_string(),
            },
            from: Some(UserRef {
                id: 7,
                username: "alice".to_string(),
                full_name: "Alice".to_string(),
            }),
            sender_chat_id: None,
            message_id: 1,
            date: Utc::now(),
            text: text.map(str::to_string),
            entities: vec![],
            reply_to: None,
            thread_id: None,
            is_automatic_forward: false,
        }
    }

    #[test]
    fn missing_user_is_a_validation_error() {
        let mut message = raw(Some("hi"));
        message.from = None;
        assert!(matches!(
            MessageEnvelope::ensure(message),
            Err(BotError::Validation(_))
        ));
    }

    #[test]
    fn textless_message_is_unknown_type_with_empty_text() {
        let envelope = MessageEnvelope::ensure(raw(None)).unwrap();
        assert_eq!(envelope.message_type, MessageType::Unknown);
        assert!(envelope.message_text.is_empty());
    }

    #[test]
    fn command_parsing_strips_bot_suffix() {
        let mut message = raw(Some("/Spam@cerberus_bot now"));
        message.text = Some("/spam@cerberus_bot now please".to_string());
        let envelope = MessageEnvelope::ensure(message).unwrap();
        assert_eq!(
            envelope.command(),
            Some(("spam".to_string(), "now please".to_string()))
        );
    }

    #[test]
    fn non_command_text_has_no_command() {
        let envelope = MessageEnvelope::ensure(raw(Some("hello"))).unwrap();
        assert_eq!(envelope.command(), None);
    }

    #[test]
    fn entity_text_uses_character_offsets() {
        let mut message = raw(Some("привет @somebot пока"));
        message.entities = vec![MessageEntity {
            kind: EntityKind::Mention,
            offset: 7,
            length: 8,
        }];
        let envelope = MessageEnvelope::ensure(message).unwrap();
        assert_eq!(envelope.entity_text(&envelope.entities[0]), "@somebot");
    }
}

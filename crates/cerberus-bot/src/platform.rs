//! Outbound platform operations the core consumes. The real transport
//! adapter lives outside this workspace; tests use [`MockPlatform`].

use async_trait::async_trait;

use cerberus_core::MessageCategory;

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i64,
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Send a message; returns the sent message when the platform reports
    /// one. `category` tags bot-authored messages for the message log.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        category: MessageCategory,
        reply_to: Option<i64>,
    ) -> Result<Option<SentMessage>>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;

    async fn delete_messages(&self, chat_id: i64, message_ids: &[i64]) -> Result<()>;

    async fn ban_chat_member(&self, chat_id: i64, user_id: i64, revoke_messages: bool)
        -> Result<()>;

    async fn ban_chat_sender_chat(&self, chat_id: i64, sender_chat_id: i64) -> Result<()>;

    async fn unban_chat_member(&self, chat_id: i64, user_id: i64, only_if_banned: bool)
        -> Result<()>;

    async fn is_admin(&self, chat_id: i64, user_id: i64) -> Result<bool>;
}

#[cfg(test)]
pub mod mock {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    /// One recorded outbound action.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Action {
        Send {
            chat_id: i64,
            text: String,
            category: MessageCategory,
        },
        Delete {
            chat_id: i64,
            message_id: i64,
        },
        DeleteBulk {
            chat_id: i64,
            message_ids: Vec<i64>,
        },
        Ban {
            chat_id: i64,
            user_id: i64,
            revoke_messages: bool,
        },
        BanSenderChat {
            chat_id: i64,
            sender_chat_id: i64,
        },
        Unban {
            chat_id: i64,
            user_id: i64,
        },
    }

    /// Scripted platform double recording every outbound action.
    #[derive(Default)]
    pub struct MockPlatform {
        pub actions: Mutex<Vec<Action>>,
        pub admins: Mutex<HashSet<(i64, i64)>>,
        next_message_id: Mutex<i64>,
    }

    impl MockPlatform {
        pub fn new() -> Self {
            Self {
                next_message_id: Mutex::new(10_000),
                ..Default::default()
            }
        }

        pub fn make_admin(&self, chat_id: i64, user_id: i64) {
            self.admins.lock().unwrap().insert((chat_id, user_id));
        }

        pub fn actions(&self) -> Vec<Action> {
            self.actions.lock().unwrap().clone()
        }

        pub fn sent_texts(&self) -> Vec<String> {
            self.actions()
                .into_iter()
                .filter_map(|a| match a {
                    Action::Send { text, .. } => Some(text),
                    _ => None,
                })
                .collect()
        }

        pub fn banned_users(&self) -> Vec<(i64, i64)> {
            self.actions()
                .into_iter()
                .filter_map(|a| match a {
                    Action::Ban {
                        chat_id, user_id, ..
                    } => Some((chat_id, user_id)),
                    _ => None,
                })
                .collect()
        }

        pub fn deleted_messages(&self) -> Vec<(i64, i64)> {
            self.actions()
                .into_iter()
                .flat_map(|a| match a {
                    Action::Delete {
                        chat_id,
                        message_id,
                    } => vec![(chat_id, message_id)],
                    Action::DeleteBulk {
                        chat_id,
                        message_ids,
                    } => message_ids.into_iter().map(|m| (chat_id, m)).collect(),
                    _ => vec![],
                })
                .collect()
        }
    }

    #[async_trait]
    impl Platform for MockPlatform {
        async fn send_message(
            &self,
            chat_id: i64,
            text: &str,
            category: MessageCategory,
            _reply_to: Option<i64>,
        ) -> Result<Option<SentMessage>> {
            self.actions.lock().unwrap().push(Action::Send {
                chat_id,
                text: text.to_string(),
                category,
            });
            let mut next = self.next_message_id.lock().unwrap();
            *next += 1;
            Ok(Some(SentMessage {
                chat_id,
                message_id: *next,
            }))
        }

        async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
            self.actions.lock().unwrap().push(Action::Delete {
                chat_id,
                message_id,
            });
            Ok(())
        }

        async fn delete_messages(&self, chat_id: i64, message_ids: &[i64]) -> Result<()> {
            self.actions.lock().unwrap().push(Action::DeleteBulk {
                chat_id,
                message_ids: message_ids.to_vec(),
            });
            Ok(())
        }

        async fn ban_chat_member(
            &self,
            chat_id: i64,
            user_id: i64,
            revoke_messages: bool,
        ) -> Result<()> {
            self.actions.lock().unwrap().push(Action::Ban {
                chat_id,
                user_id,
                revoke_messages,
            });
            Ok(())
        }

        async fn ban_chat_sender_chat(&self, chat_id: i64, sender_chat_id: i64) -> Result<()> {
            self.actions.lock().unwrap().push(Action::BanSenderChat {
                chat_id,
                sender_chat_id,
            });
            Ok(())
        }

        async fn unban_chat_member(
            &self,
            chat_id: i64,
            user_id: i64,
            _only_if_banned: bool,
        ) -> Result<()> {
            self.actions
                .lock()
                .unwrap()
                .push(Action::Unban { chat_id, user_id });
            Ok(())
        }

        async fn is_admin(&self, chat_id: i64, user_id: i64) -> Result<bool> {
            Ok(self.admins.lock().unwrap().contains(&(chat_id, user_id)))
        }
    }
}

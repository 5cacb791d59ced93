//! Settings wizard driven by callback-button payloads.
//!
//! Payloads are compact JSON dicts (platform limit: 64 bytes), e.g.
//! `{"a":"set","c":-100,"k":"detect-spam","v":"true"}`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use cerberus_core::{ChatSettingsKey, MessageCategory, SettingType};

use crate::context::BotContext;
use crate::envelope::UserRef;
use crate::error::{BotError, Result};

pub const MAX_PAYLOAD_BYTES: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    /// Action: "set" or "reset".
    pub a: String,
    /// Chat the setting applies to; defaults to the callback's chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<i64>,
    /// Settings key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    /// New value for "set".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
}

/// Check a raw value against the key's semantic type.
fn validate_value(key: ChatSettingsKey, value: &str) -> bool {
    match key.value_type() {
        SettingType::Bool => value == "true" || value == "false",
        SettingType::Int => value.parse::<i64>().is_ok(),
        SettingType::Float => value.parse::<f64>().is_ok(),
        SettingType::Str | SettingType::StrList => true,
    }
}

/// Apply one callback-button press. Changes are gated on the
/// `admin-can-change-settings` setting plus platform admin status.
pub async fn handle_callback(
    ctx: &BotContext,
    chat_id: i64,
    from: &UserRef,
    payload: &str,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(BotError::Validation(format!(
            "callback payload too large: {} bytes",
            payload.len()
        )));
    }
    let payload: CallbackPayload = serde_json::from_str(payload)
        .map_err(|e| BotError::Validation(format!("bad callback payload: {e}")))?;

    let target_chat = payload.c.unwrap_or(chat_id);
    let settings = ctx.settings.chat_settings(target_chat)?;

    let admin_allowed = settings
        .get(ChatSettingsKey::AdminCanChangeSettings)
        .to_bool();
    let is_admin = ctx
        .platform
        .is_admin(target_chat, from.id)
        .await
        .unwrap_or(false);
    if !admin_allowed || !is_admin {
        warn!(chat_id = target_chat, user_id = from.id, "settings change denied");
        let _ = ctx
            .platform
            .send_message(
                chat_id,
                "Недостаточно прав для изменения настроек",
                MessageCategory::BotError,
                None,
            )
            .await;
        return Ok(());
    }

    let key: ChatSettingsKey = payload
        .k
        .as_deref()
        .unwrap_or("")
        .parse()
        .map_err(BotError::Validation)?;

    match payload.a.as_str() {
        "set" => {
            let value = payload
                .v
                .ok_or_else(|| BotError::Validation("missing value".to_string()))?;
            if !validate_value(key, &value) {
                let _ = ctx
                    .platform
                    .send_message(
                        chat_id,
                        &format!("Недопустимое значение для `{key}`: `{value}`"),
                        MessageCategory::BotError,
                        None,
                    )
                    .await;
                return Ok(());
            }
            ctx.settings.set(target_chat, key, &value)?;
            let _ = ctx
                .platform
                .send_message(
                    chat_id,
                    &format!("Настройка `{key}` изменена на `{value}`"),
                    MessageCategory::BotCommandReply,
                    None,
                )
                .await;
        }
        "reset" => {
            ctx.settings.unset(target_chat, key)?;
            let _ = ctx
                .platform
                .send_message(
                    chat_id,
                    &format!("Настройка `{key}` сброшена"),
                    MessageCategory::BotCommandReply,
                    None,
                )
                .await;
        }
        other => {
            warn!(action = other, "unknown callback action");
        }
    }
    Ok(())
}

//! Explicit handler registry. Each handler is a value carrying its
//! metadata (commands, help, categories, ordering) and is registered at
//! construction time; dispatch runs in ascending `order`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use tracing::{debug, error, warn};

use cerberus_clients::format_search_result;
use cerberus_clients::{CondenseModels, SearchOptions};
use cerberus_core::{ChatSettings, ChatSettingsKey, MessageCategory, SpamReason};

use crate::context::BotContext;
use crate::envelope::MessageEnvelope;
use crate::spam::{SpamEngine, SpamTarget};

/// Outcome of one handler invocation. `Final`/`Fatal` terminate the chain;
/// `Skipped`/`Error` are advisory and the chain continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    Final,
    Next,
    Skipped,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    Admin,
    Private,
    Tools,
    Hidden,
}

pub struct HandlerMeta {
    pub name: &'static str,
    pub commands: &'static [&'static str],
    pub short_description: &'static str,
    pub help_message: &'static str,
    pub categories: &'static [CommandCategory],
    pub order: i32,
}

#[async_trait]
pub trait Handler: Send + Sync {
    fn meta(&self) -> &'static HandlerMeta;

    /// Quick test whether this handler wants the message. The default
    /// matches on the declared command names.
    fn matches(&self, envelope: &MessageEnvelope) -> bool {
        match envelope.command() {
            Some((command, _)) => self.meta().commands.contains(&command.as_str()),
            None => false,
        }
    }

    async fn handle(
        &self,
        ctx: &Arc<BotContext>,
        envelope: &MessageEnvelope,
        settings: &ChatSettings,
    ) -> HandlerResult;
}

/// The default handler chain in dispatch order.
pub fn default_handlers() -> Vec<Arc<dyn Handler>> {
    let mut handlers: Vec<Arc<dyn Handler>> = vec![
        Arc::new(SpamCommandHandler),
        Arc::new(UnbanCommandHandler),
        Arc::new(LearnCommandHandler),
        Arc::new(SpamScoreCommandHandler),
        Arc::new(SettingsCommandHandler),
        Arc::new(WebSearchCommandHandler),
        Arc::new(UrlPreviewCommandHandler),
        Arc::new(WeatherCommandHandler),
    ];
    handlers.sort_by_key(|h| h.meta().order);
    handlers
}

async fn reply(ctx: &BotContext, envelope: &MessageEnvelope, text: &str, category: MessageCategory) {
    if let Err(e) = ctx
        .platform
        .send_message(envelope.chat.id, text, category, Some(envelope.message_id))
        .await
    {
        error!(error = %e, chat_id = envelope.chat.id, "failed to send reply");
    }
}

async fn is_admin(ctx: &BotContext, chat_id: i64, user_id: i64) -> bool {
    ctx.platform.is_admin(chat_id, user_id).await.unwrap_or(false)
}

/// /spam: mark the replied-to message as spam.
pub struct SpamCommandHandler;

static SPAM_META: HandlerMeta = HandlerMeta {
    name: "spam",
    commands: &["spam"],
    short_description: "Mark answered message as spam",
    help_message: ": Указать боту на сообщение со спамом (должно быть ответом на спам-сообщение).",
    categories: &[CommandCategory::Admin],
    order: 10,
};

#[async_trait]
impl Handler for SpamCommandHandler {
    fn meta(&self) -> &'static HandlerMeta {
        &SPAM_META
    }

    async fn handle(
        &self,
        ctx: &Arc<BotContext>,
        envelope: &MessageEnvelope,
        settings: &ChatSettings,
    ) -> HandlerResult {
        let chat_id = envelope.chat.id;
        let allow_users = settings
            .get(ChatSettingsKey::AllowUserSpamCommand)
            .to_bool();
        let admin = is_admin(ctx, chat_id, envelope.user.id).await;

        if let (Some(reply_user), Some(reply_id)) = (&envelope.reply_user, envelope.reply_id) {
            if allow_users || admin {
                let target = SpamTarget {
                    chat_id,
                    user: reply_user.clone(),
                    message_id: reply_id,
                    text: envelope.reply_text.clone().unwrap_or_default(),
                    sender_chat_id: None,
                };
                let engine = SpamEngine::new(ctx.clone());
                let (reason, score) = if admin {
                    (SpamReason::Admin, 100.0)
                } else {
                    (SpamReason::User, 50.0)
                };
                if let Err(e) = engine.mark_as_spam(&target, reason, score).await {
                    error!(error = %e, "mark-as-spam failed");
                    return HandlerResult::Error;
                }
            } else {
                debug!(chat_id, "user not allowed to use /spam");
            }
        }

        // Drop the command message itself to reduce flood.
        if let Err(e) = ctx.platform.delete_message(chat_id, envelope.message_id).await {
            warn!(error = %e, "failed to delete /spam command message");
        }
        HandlerResult::Final
    }
}

/// /unban [@username]: lift a ban and migrate the user's corpus.
pub struct UnbanCommandHandler;

static UNBAN_META: HandlerMeta = HandlerMeta {
    name: "unban",
    commands: &["unban"],
    short_description: "[<username>] - Unban user from current chat",
    help_message: "[@<username>]: Разбанить пользователя в данном чате. \
Так же может быть ответом на сообщение забаненного пользователя.",
    categories: &[CommandCategory::Admin],
    order: 11,
};

#[async_trait]
impl Handler for UnbanCommandHandler {
    fn meta(&self) -> &'static HandlerMeta {
        &UNBAN_META
    }

    async fn handle(
        &self,
        ctx: &Arc<BotContext>,
        envelope: &MessageEnvelope,
        _settings: &ChatSettings,
    ) -> HandlerResult {
        let chat_id = envelope.chat.id;
        let args = envelope.command().map(|(_, args)| args).unwrap_or_default();

        let user = if !args.is_empty() {
            let username = args.split_whitespace().next().unwrap_or("");
            ctx.store
                .chat_user_by_username(chat_id, username)
                .unwrap_or(None)
        } else {
            match &envelope.reply_user {
                Some(reply_user) => ctx.store.chat_user(chat_id, reply_user.id).unwrap_or(None),
                None => None,
            }
        };

        let user = match user {
            Some(user) => user,
            None => {
                reply(ctx, envelope, "Пользователь не найден", MessageCategory::BotError).await;
                return HandlerResult::Final;
            }
        };

        if !is_admin(ctx, chat_id, envelope.user.id).await {
            reply(
                ctx,
                envelope,
                "Вы не являетесь администратором в этом чате",
                MessageCategory::BotError,
            )
            .await;
            return HandlerResult::Final;
        }

        let engine = SpamEngine::new(ctx.clone());
        match engine.unban(&user).await {
            Ok(()) => {
                let name = if user.full_name.is_empty() {
                    &user.username
                } else {
                    &user.full_name
                };
                reply(
                    ctx,
                    envelope,
                    &format!(
                        "Пользователь [{name}](tg://user?id={id}) разбанен",
                        id = user.user_id
                    ),
                    MessageCategory::BotCommandReply,
                )
                .await;
                HandlerResult::Final
            }
            Err(e) => {
                error!(error = %e, "unban failed");
                HandlerResult::Error
            }
        }
    }
}

/// /learn_spam, /learn_ham [chat_id]: teach the classifier from a reply.
pub struct LearnCommandHandler;

static LEARN_META: HandlerMeta = HandlerMeta {
    name: "learn",
    commands: &["learn_spam", "learn_ham"],
    short_description: "[<chatId>] - learn answered message as spam/ham for given chat",
    help_message: " `[<chatId>]`: Обучить фильтр на указанном сообщении как спам/не-спам.",
    categories: &[CommandCategory::Private],
    order: 12,
};

#[async_trait]
impl Handler for LearnCommandHandler {
    fn meta(&self) -> &'static HandlerMeta {
        &LEARN_META
    }

    async fn handle(
        &self,
        ctx: &Arc<BotContext>,
        envelope: &MessageEnvelope,
        _settings: &ChatSettings,
    ) -> HandlerResult {
        let (command, args) = match envelope.command() {
            Some(parsed) => parsed,
            None => return HandlerResult::Skipped,
        };
        let learn_spam = command == "learn_spam";

        let replied = envelope.reply_text.clone().unwrap_or_default();
        if replied.chars().count() < 3 {
            reply(
                ctx,
                envelope,
                "Команда должна быть ответом на сообщение достаточной длины",
                MessageCategory::BotError,
            )
            .await;
            return HandlerResult::Final;
        }

        let mut chat_id = envelope.chat.id;
        if let Some(arg) = args.split_whitespace().next() {
            match arg.parse() {
                Ok(id) => chat_id = id,
                Err(_) => error!(arg, "failed to parse chat id"),
            }
        }

        if !is_admin(ctx, chat_id, envelope.user.id).await {
            reply(
                ctx,
                envelope,
                "Вы не являетесь администратором в указанном чате",
                MessageCategory::BotError,
            )
            .await;
            return HandlerResult::Final;
        }

        let (learn_result, store_result, noun) = if learn_spam {
            (
                ctx.bayes.learn_spam(&replied, Some(chat_id)),
                ctx.store
                    .add_spam_message(chat_id, 0, 0, &replied, SpamReason::Admin, 100.0),
                "СПАМ",
            )
        } else {
            (
                ctx.bayes.learn_ham(&replied, Some(chat_id)),
                ctx.store
                    .add_ham_message(chat_id, 0, 0, &replied, SpamReason::Admin, 100.0),
                "НЕ СПАМ",
            )
        };
        if let Err(e) = learn_result {
            error!(error = %e, "learning failed");
            return HandlerResult::Error;
        }
        if let Err(e) = store_result {
            error!(error = %e, "saving exemplar failed");
            return HandlerResult::Error;
        }

        reply(
            ctx,
            envelope,
            &format!("Сообщение \n```\n{replied}\n```\n Запомнено как {noun} для чата #`{chat_id}`"),
            MessageCategory::BotCommandReply,
        )
        .await;
        HandlerResult::Final
    }
}

/// /get_spam_score [chat_id]: report the classifier verdict for a reply.
pub struct SpamScoreCommandHandler;

static SPAM_SCORE_META: HandlerMeta = HandlerMeta {
    name: "get_spam_score",
    commands: &["get_spam_score"],
    short_description: "[<chatId>] - Analyze answered message for spam and print result",
    help_message: " `[<chatId>]`: Выдать результат проверки указанного сообщения на спам.",
    categories: &[CommandCategory::Private],
    order: 13,
};

#[async_trait]
impl Handler for SpamScoreCommandHandler {
    fn meta(&self) -> &'static HandlerMeta {
        &SPAM_SCORE_META
    }

    async fn handle(
        &self,
        ctx: &Arc<BotContext>,
        envelope: &MessageEnvelope,
        _settings: &ChatSettings,
    ) -> HandlerResult {
        if !envelope.chat.is_private() {
            return HandlerResult::Skipped;
        }

        let replied = envelope.reply_text.clone().unwrap_or_default();
        if replied.chars().count() < 3 {
            reply(
                ctx,
                envelope,
                "Команда должна быть ответом на сообщение достаточной длины",
                MessageCategory::BotError,
            )
            .await;
            return HandlerResult::Final;
        }

        let mut chat_id = envelope.chat.id;
        if let Some(arg) = envelope
            .command()
            .and_then(|(_, args)| args.split_whitespace().next().map(str::to_string))
        {
            match arg.parse() {
                Ok(id) => chat_id = id,
                Err(_) => error!(%arg, "failed to parse chat id"),
            }
        }

        let score = ctx.bayes.classify(&replied, Some(chat_id), None, false);
        let dump = serde_json::to_string_pretty(&score).unwrap_or_else(|_| "{}".to_string());
        reply(
            ctx,
            envelope,
            &format!("Сообщение \n```\n{replied}\n```\n В чате #`{chat_id}` воспринимается как: \n```json\n{dump}\n```\n"),
            MessageCategory::BotCommandReply,
        )
        .await;
        HandlerResult::Final
    }
}

/// /settings: list the chat's effective settings.
pub struct SettingsCommandHandler;

static SETTINGS_META: HandlerMeta = HandlerMeta {
    name: "settings",
    commands: &["settings"],
    short_description: "Show chat settings",
    help_message: ": Показать настройки бота для данного чата.",
    categories: &[CommandCategory::Admin],
    order: 20,
};

#[async_trait]
impl Handler for SettingsCommandHandler {
    fn meta(&self) -> &'static HandlerMeta {
        &SETTINGS_META
    }

    async fn handle(
        &self,
        ctx: &Arc<BotContext>,
        envelope: &MessageEnvelope,
        settings: &ChatSettings,
    ) -> HandlerResult {
        let mut lines = vec!["Настройки чата:".to_string()];
        for key in ChatSettingsKey::ALL {
            let marker = if settings.is_overridden(key) { "*" } else { "" };
            lines.push(format!(
                "`{key}` = `{value}`{marker}: {label}",
                value = settings.get(key),
                label = key.label(),
            ));
        }
        reply(ctx, envelope, &lines.join("\n"), MessageCategory::BotCommandReply).await;
        HandlerResult::Final
    }
}

/// /web_search <query>: search the web and post formatted fragments.
pub struct WebSearchCommandHandler;

static WEB_SEARCH_META: HandlerMeta = HandlerMeta {
    name: "web_search",
    commands: &["web_search"],
    short_description: "<query> - Search Web for given query",
    help_message: " `<query>`: Поискать в интернете.",
    categories: &[CommandCategory::Tools],
    order: 30,
};

#[async_trait]
impl Handler for WebSearchCommandHandler {
    fn meta(&self) -> &'static HandlerMeta {
        &WEB_SEARCH_META
    }

    async fn handle(
        &self,
        ctx: &Arc<BotContext>,
        envelope: &MessageEnvelope,
        _settings: &ChatSettings,
    ) -> HandlerResult {
        let search = match &ctx.search {
            Some(search) => search,
            None => return HandlerResult::Skipped,
        };
        let query = envelope
            .command()
            .map(|(_, args)| args)
            .unwrap_or_default();
        if query.is_empty() {
            reply(
                ctx,
                envelope,
                "Необходимо указать запрос для поиска.",
                MessageCategory::BotError,
            )
            .await;
            return HandlerResult::Final;
        }

        // User-facing searches share the llm queue.
        ctx.limiter.apply_limit("llm").await;

        match search.search(&query, &SearchOptions::default()).await {
            Ok(response) => {
                for fragment in format_search_result(&response) {
                    reply(ctx, envelope, &fragment, MessageCategory::BotCommandReply).await;
                }
                HandlerResult::Final
            }
            Err(e) => {
                error!(error = %e, %query, "web search failed");
                reply(
                    ctx,
                    envelope,
                    "Ошибка при поиске информации.",
                    MessageCategory::BotError,
                )
                .await;
                HandlerResult::Error
            }
        }
    }
}

/// /get_url <url>: fetch a page as Markdown, condensed to a readable size.
pub struct UrlPreviewCommandHandler;

static URL_PREVIEW_META: HandlerMeta = HandlerMeta {
    name: "get_url",
    commands: &["get_url"],
    short_description: "<url> - Fetch page content as Markdown",
    help_message: " `<url>`: Скачать страницу и показать её содержимое.",
    categories: &[CommandCategory::Tools],
    order: 32,
};

/// Content longer than this is condensed through the chat's LLM.
const URL_PREVIEW_MAX_SIZE: usize = 10_240;

#[async_trait]
impl Handler for UrlPreviewCommandHandler {
    fn meta(&self) -> &'static HandlerMeta {
        &URL_PREVIEW_META
    }

    async fn handle(
        &self,
        ctx: &Arc<BotContext>,
        envelope: &MessageEnvelope,
        settings: &ChatSettings,
    ) -> HandlerResult {
        let fetcher = match &ctx.fetcher {
            Some(fetcher) => fetcher,
            None => return HandlerResult::Skipped,
        };
        let url = envelope
            .command()
            .map(|(_, args)| args)
            .unwrap_or_default();
        if url.is_empty() {
            reply(
                ctx,
                envelope,
                "Необходимо указать адрес страницы.",
                MessageCategory::BotError,
            )
            .await;
            return HandlerResult::Final;
        }

        let models = CondenseModels {
            model: settings.get(ChatSettingsKey::ChatModel).to_string(),
            fallback_model: settings.get(ChatSettingsKey::CondensingModel).to_string(),
        };
        match fetcher
            .url_content(&url, true, URL_PREVIEW_MAX_SIZE, Some(&models))
            .await
        {
            Ok(content) => {
                reply(ctx, envelope, &content, MessageCategory::BotCommandReply).await;
                HandlerResult::Final
            }
            Err(e) => {
                error!(error = %e, %url, "url fetch failed");
                reply(
                    ctx,
                    envelope,
                    &format!("Не удалось получить содержимое страницы: {e}"),
                    MessageCategory::BotError,
                )
                .await;
                HandlerResult::Error
            }
        }
    }
}

/// /weather <place>, or a natural-language "погода в <place>" request.
pub struct WeatherCommandHandler;

static WEATHER_META: HandlerMeta = HandlerMeta {
    name: "weather",
    commands: &["weather"],
    short_description: "<place> - Current weather and forecast",
    help_message: " `<место>`: Погода и прогноз для указанного места.",
    categories: &[CommandCategory::Tools],
    order: 31,
};

impl WeatherCommandHandler {
    fn requested_place(envelope: &MessageEnvelope) -> Option<String> {
        if let Some((command, args)) = envelope.command() {
            if command == "weather" && !args.is_empty() {
                return Some(args);
            }
            return None;
        }
        let lowered = envelope.message_text.to_lowercase();
        for prefix in ["погода в ", "погода во ", "weather in "] {
            if let Some(rest) = lowered.strip_prefix(prefix) {
                let place = rest.trim().trim_end_matches(&['?', '!', '.'][..]);
                if !place.is_empty() {
                    return Some(place.to_string());
                }
            }
        }
        None
    }
}

#[async_trait]
impl Handler for WeatherCommandHandler {
    fn meta(&self) -> &'static HandlerMeta {
        &WEATHER_META
    }

    fn matches(&self, envelope: &MessageEnvelope) -> bool {
        Self::requested_place(envelope).is_some()
    }

    async fn handle(
        &self,
        ctx: &Arc<BotContext>,
        envelope: &MessageEnvelope,
        _settings: &ChatSettings,
    ) -> HandlerResult {
        let weather = match &ctx.weather {
            Some(weather) => weather,
            None => return HandlerResult::Skipped,
        };
        let place = match Self::requested_place(envelope) {
            Some(place) => place,
            None => return HandlerResult::Skipped,
        };

        match weather.weather_by_city(&place, None).await {
            Ok(result) => {
                let location_name = result
                    .location
                    .local_names
                    .get("ru")
                    .cloned()
                    .unwrap_or_else(|| result.location.name.clone());
                let current = &result.weather.current;
                let mut lines = vec![
                    format!("Погода в {location_name} ({}):", result.location.country),
                    format!(
                        "Сейчас {:.1}°C (ощущается как {:.1}°C), {}",
                        current.temp, current.feels_like, current.weather_description
                    ),
                    format!(
                        "Ветер {:.1} м/с, влажность {}%",
                        current.wind_speed, current.humidity
                    ),
                ];
                for day in result.weather.daily.iter().take(3) {
                    let date = DateTime::from_timestamp(day.dt, 0)
                        .map(|ts| ts.date_naive().to_string())
                        .unwrap_or_default();
                    lines.push(format!(
                        "{date}: {:.0}…{:.0}°C, {}",
                        day.temp_min, day.temp_max, day.weather_description
                    ));
                }
                reply(ctx, envelope, &lines.join("\n"), MessageCategory::BotCommandReply).await;
                HandlerResult::Final
            }
            Err(e) => {
                error!(error = %e, %place, "weather request failed");
                reply(
                    ctx,
                    envelope,
                    "Не удалось получить данные о погоде.",
                    MessageCategory::BotError,
                )
                .await;
                HandlerResult::Error
            }
        }
    }
}

//! Telegram Bot API transport over plain HTTPS long polling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::channels::{
    CallbackPress, ChatContext, ChatKind, ChatPlatform, InboundEvent, InboundHandler,
    IncomingText, MemberRole, OutgoingMessage, ParseMode, SentMessage, Sender,
};
use crate::config::TelegramConfig;
use crate::db::Platform;
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "telegram";
const RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct TelegramChannel {
    client: Client,
    /// `{api_base_url}/bot{token}`.
    base_url: String,
    poll_timeout_secs: u64,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self, ChannelError> {
        let token = config.bot_token.expose_secret();
        if token.trim().is_empty() {
            return Err(ChannelError::StartupFailed {
                name: CHANNEL_NAME.to_string(),
                reason: "bot token cannot be empty".to_string(),
            });
        }

        // Long polls hold the request open for poll_timeout_secs.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", config.api_base_url, token),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    /// Poll for updates until `shutdown` fires. Each event is handled on its
    /// own task so a slow agent call never stalls polling.
    pub async fn run(&self, handler: Arc<dyn InboundHandler>, shutdown: CancellationToken) {
        tracing::info!("Telegram channel started");
        let mut offset: Option<i64> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Telegram channel stopped");
                    break;
                }
                polled = self.get_updates(offset) => {
                    match polled {
                        Ok(updates) => {
                            for update in updates {
                                offset = Some(offset.unwrap_or(0).max(update.update_id + 1));
                                let Some(event) = update.into_event() else {
                                    continue;
                                };
                                let handler = Arc::clone(&handler);
                                tokio::spawn(async move { handler.handle(event).await });
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Telegram poll error: {}", e);
                            tokio::select! {
                                _ = shutdown.cancelled() => {}
                                _ = tokio::time::sleep(RETRY_DELAY) => {}
                            }
                        }
                    }
                }
            }
        }
    }

    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, ChannelError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout_secs,
            allowed_updates: &["message", "callback_query"],
        };
        self.call("getUpdates", &request)
            .await
            .map_err(|reason| ChannelError::Http(format!("getUpdates: {reason}")))
    }

    /// POST a Bot API method and unwrap the `{ok, result}` envelope.
    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, String>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;

        let status = response.status();
        let envelope = response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| format!("invalid {method} payload ({status}): {e}"))?;

        if !envelope.ok {
            return Err(envelope
                .description
                .unwrap_or_else(|| format!("{method} returned ok=false ({status})")));
        }
        envelope
            .result
            .ok_or_else(|| format!("{method} returned no result"))
    }
}

#[async_trait]
impl ChatPlatform for TelegramChannel {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<SentMessage, ChannelError> {
        let request = SendMessageRequest::from(&message);
        let sent: TgMessage = self
            .call("sendMessage", &request)
            .await
            .map_err(|reason| ChannelError::SendFailed {
                name: CHANNEL_NAME.to_string(),
                reason,
            })?;
        Ok(SentMessage {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await
            .map_err(|reason| ChannelError::DeleteFailed {
                name: CHANNEL_NAME.to_string(),
                reason,
            })?;
        Ok(())
    }

    async fn member_role(&self, chat_id: i64, user_id: i64) -> Result<MemberRole, ChannelError> {
        let member: TgChatMember = self
            .call(
                "getChatMember",
                &serde_json::json!({ "chat_id": chat_id, "user_id": user_id }),
            )
            .await
            .map_err(|reason| ChannelError::MemberLookupFailed {
                name: CHANNEL_NAME.to_string(),
                reason,
            })?;
        parse_member_status(&member.status).ok_or_else(|| ChannelError::InvalidMessage(format!(
            "unknown chat member status '{}'",
            member.status
        )))
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), ChannelError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &serde_json::json!({ "callback_query_id": callback_id }),
            )
            .await
            .map_err(|reason| ChannelError::SendFailed {
                name: CHANNEL_NAME.to_string(),
                reason,
            })?;
        Ok(())
    }
}

fn parse_member_status(status: &str) -> Option<MemberRole> {
    match status {
        "creator" => Some(MemberRole::Owner),
        "administrator" => Some(MemberRole::Administrator),
        "member" => Some(MemberRole::Member),
        "restricted" => Some(MemberRole::Restricted),
        "left" => Some(MemberRole::Left),
        "kicked" => Some(MemberRole::Banned),
        _ => None,
    }
}

// ==================== Wire types ====================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    disable_notification: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    protect_content: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_parameters: Option<ReplyParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplyParameters {
    message_id: i64,
    allow_sending_without_reply: bool,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: Vec<Vec<InlineKeyboardButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

impl<'a> From<&'a OutgoingMessage> for SendMessageRequest<'a> {
    fn from(message: &'a OutgoingMessage) -> Self {
        let reply_markup = (!message.keyboard.is_empty()).then(|| InlineKeyboardMarkup {
            inline_keyboard: message
                .keyboard
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| InlineKeyboardButton {
                            text: &b.label,
                            callback_data: &b.data,
                        })
                        .collect()
                })
                .collect(),
        });

        Self {
            chat_id: message.chat_id,
            text: &message.text,
            parse_mode: message.parse_mode.map(|mode| match mode {
                ParseMode::Markdown => "Markdown",
                ParseMode::MarkdownV2 => "MarkdownV2",
            }),
            disable_notification: message.silent,
            protect_content: message.protect_content,
            reply_parameters: message.reply_to.map(|message_id| ReplyParameters {
                message_id,
                allow_sending_without_reply: true,
            }),
            reply_markup,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    from: Option<TgUser>,
    chat: TgChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    username: Option<String>,
    #[serde(default)]
    first_name: String,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    message: Option<TgMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChatMember {
    status: String,
}

impl TgChat {
    fn into_context(self) -> ChatContext {
        let kind = if self.kind == "private" {
            ChatKind::Private
        } else {
            ChatKind::Group
        };
        ChatContext {
            platform: Platform::Telegram,
            chat_id: self.id,
            kind,
            title: self.title,
        }
    }
}

impl From<TgUser> for Sender {
    fn from(user: TgUser) -> Self {
        Self {
            user_id: user.id,
            username: user.username.unwrap_or(user.first_name),
        }
    }
}

impl Update {
    /// Convert to an inbound event; updates the bot does not act on yield `None`.
    fn into_event(self) -> Option<InboundEvent> {
        if let Some(message) = self.message {
            let text = message.text.filter(|t| !t.trim().is_empty())?;
            let from = message.from?;
            return Some(InboundEvent::Text(IncomingText {
                message_id: message.message_id,
                chat: message.chat.into_context(),
                from: from.into(),
                text,
            }));
        }

        let query = self.callback_query?;
        let Some(message) = query.message else {
            tracing::debug!(callback_id = %query.id, "Callback without an accessible message");
            return None;
        };
        Some(InboundEvent::Callback(CallbackPress {
            callback_id: query.id,
            chat: message.chat.into_context(),
            from: query.from.into(),
            data: query.data.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::InlineButton;

    #[test]
    fn text_update_becomes_text_event() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "first_name": "Alice", "username": "alice"},
                "chat": {"id": -100123, "type": "supergroup", "title": "Team"},
                "text": "/ai sum hello"
            }
        }))
        .unwrap();

        let Some(InboundEvent::Text(text)) = update.into_event() else {
            panic!("expected text event");
        };
        assert_eq!(text.message_id, 5);
        assert_eq!(text.from.user_id, 42);
        assert_eq!(text.from.username, "alice");
        assert_eq!(text.chat.kind, ChatKind::Group);
        assert_eq!(text.chat.title.as_deref(), Some("Team"));
    }

    #[test]
    fn callback_update_uses_message_chat() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 11,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 42, "first_name": "Alice"},
                "message": {"message_id": 9, "chat": {"id": 42, "type": "private"}},
                "data": "reg_setup_user:7"
            }
        }))
        .unwrap();

        let Some(InboundEvent::Callback(press)) = update.into_event() else {
            panic!("expected callback event");
        };
        assert_eq!(press.callback_id, "cb-1");
        assert_eq!(press.data, "reg_setup_user:7");
        assert!(press.chat.is_private());
        assert_eq!(press.from.username, "Alice");
    }

    #[test]
    fn non_text_messages_are_dropped() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 12,
            "message": {
                "message_id": 1,
                "from": {"id": 1, "first_name": "A"},
                "chat": {"id": 1, "type": "private"}
            }
        }))
        .unwrap();
        assert!(update.into_event().is_none());
    }

    #[test]
    fn send_request_serializes_options() {
        let message = OutgoingMessage::new(7, "hi")
            .reply_to(3)
            .silent()
            .protected()
            .parse_mode(ParseMode::Markdown)
            .keyboard(vec![vec![InlineButton::new("Setup", "reg_setup_user:1")]]);
        let json = serde_json::to_value(SendMessageRequest::from(&message)).unwrap();

        assert_eq!(json["chat_id"], 7);
        assert_eq!(json["parse_mode"], "Markdown");
        assert_eq!(json["disable_notification"], true);
        assert_eq!(json["protect_content"], true);
        assert_eq!(json["reply_parameters"]["message_id"], 3);
        assert_eq!(
            json["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "reg_setup_user:1"
        );
    }

    #[test]
    fn plain_send_omits_optional_fields() {
        let json = serde_json::to_value(SendMessageRequest::from(&OutgoingMessage::new(1, "x")))
            .unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
    }

    #[test]
    fn member_statuses_map_to_roles() {
        assert_eq!(parse_member_status("creator"), Some(MemberRole::Owner));
        assert_eq!(
            parse_member_status("administrator"),
            Some(MemberRole::Administrator)
        );
        assert_eq!(parse_member_status("kicked"), Some(MemberRole::Banned));
        assert_eq!(parse_member_status("wizard"), None);
    }
}

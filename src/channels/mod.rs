//! Chat platform transport.
//!
//! The bot core only sees [`ChatPlatform`] for outbound calls and
//! [`InboundEvent`] for what arrives. Telegram is the shipped transport.

pub mod telegram;
pub mod testing;

use async_trait::async_trait;

use crate::db::Platform;
use crate::error::ChannelError;

pub use self::telegram::TelegramChannel;

/// Whether a chat is a one-to-one conversation with the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

/// The chat an event arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatContext {
    pub platform: Platform,
    pub chat_id: i64,
    pub kind: ChatKind,
    /// Group title; `None` for private chats.
    pub title: Option<String>,
}

impl ChatContext {
    pub fn is_private(&self) -> bool {
        self.kind == ChatKind::Private
    }
}

/// Who sent an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct IncomingText {
    pub message_id: i64,
    pub chat: ChatContext,
    pub from: Sender,
    pub text: String,
}

/// A button press on an inline keyboard.
#[derive(Debug, Clone)]
pub struct CallbackPress {
    pub callback_id: String,
    /// Chat holding the message the button was attached to.
    pub chat: ChatContext,
    pub from: Sender,
    pub data: String,
}

#[derive(Debug, Clone)]
pub enum InboundEvent {
    Text(IncomingText),
    Callback(CallbackPress),
}

/// Text formatting the platform should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Legacy Markdown: `*bold*`, `` `code` ``, `_italic_`.
    Markdown,
    /// MarkdownV2: reserved characters must be escaped.
    MarkdownV2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub reply_to: Option<i64>,
    /// Deliver without a notification sound.
    pub silent: bool,
    pub protect_content: bool,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Vec<Vec<InlineButton>>,
}

impl OutgoingMessage {
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_to: None,
            silent: false,
            protect_content: false,
            parse_mode: None,
            keyboard: Vec::new(),
        }
    }

    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn protected(mut self) -> Self {
        self.protect_content = true;
        self
    }

    pub fn parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = Some(mode);
        self
    }

    pub fn keyboard(mut self, rows: Vec<Vec<InlineButton>>) -> Self {
        self.keyboard = rows;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Membership status of a user in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberRole {
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator)
    }
}

/// Outbound operations the bot needs from a chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    fn platform(&self) -> Platform;

    /// Chat id of the one-to-one conversation with `user_id`. On Telegram
    /// the two are the same number.
    fn direct_chat_id(&self, user_id: i64) -> i64 {
        user_id
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<SentMessage, ChannelError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError>;

    async fn member_role(&self, chat_id: i64, user_id: i64) -> Result<MemberRole, ChannelError>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str) -> Result<(), ChannelError>;
}

/// Receives inbound events from a transport's polling loop.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent);
}

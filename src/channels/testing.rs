//! In-process [`ChatPlatform`] that records every outbound call.
//!
//! Used by unit and integration tests to drive the bot without a network.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::channels::{ChatPlatform, MemberRole, OutgoingMessage, SentMessage};
use crate::db::Platform;
use crate::error::ChannelError;

/// One outbound call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Send {
        message_id: i64,
        message: OutgoingMessage,
    },
    Delete {
        chat_id: i64,
        message_id: i64,
    },
    AnswerCallback(String),
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub at: Instant,
    pub call: PlatformCall,
}

#[derive(Debug)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<RecordedCall>>,
    roles: Mutex<HashMap<(i64, i64), MemberRole>>,
    next_message_id: AtomicI64,
    fail_deletes: AtomicBool,
    fail_role_lookups: AtomicBool,
    fail_markdown_sends: AtomicBool,
    max_text_len: AtomicUsize,
    changed: Notify,
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            roles: Mutex::new(HashMap::new()),
            next_message_id: AtomicI64::new(1000),
            fail_deletes: AtomicBool::new(false),
            fail_role_lookups: AtomicBool::new(false),
            fail_markdown_sends: AtomicBool::new(false),
            max_text_len: AtomicUsize::new(usize::MAX),
            changed: Notify::new(),
        }
    }
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role returned by `member_role` for `(chat_id, user_id)`. Unset pairs
    /// are plain members.
    pub fn set_role(&self, chat_id: i64, user_id: i64, role: MemberRole) {
        lock(&self.roles).insert((chat_id, user_id), role);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_role_lookups(&self, fail: bool) {
        self.fail_role_lookups.store(fail, Ordering::SeqCst);
    }

    /// Reject any send that asks for Markdown formatting.
    pub fn fail_markdown_sends(&self, fail: bool) {
        self.fail_markdown_sends.store(fail, Ordering::SeqCst);
    }

    /// Reject any send whose text exceeds `max` characters, as Telegram does
    /// past 4096.
    pub fn reject_texts_longer_than(&self, max: usize) {
        self.max_text_len.store(max, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Sent messages, in order.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match &c.call {
                PlatformCall::Send { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    pub fn last_sent(&self) -> Option<OutgoingMessage> {
        self.sent().pop()
    }

    pub fn deleted(&self) -> Vec<(i64, i64)> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c.call {
                PlatformCall::Delete {
                    chat_id,
                    message_id,
                } => Some((chat_id, message_id)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    /// Wait until at least `count` calls have been recorded.
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.changed.notified();
            if lock(&self.calls).len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, call: PlatformCall) {
        lock(&self.calls).push(RecordedCall {
            at: Instant::now(),
            call,
        });
        self.changed.notify_waiters();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<SentMessage, ChannelError> {
        if message.parse_mode.is_some() && self.fail_markdown_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                name: "recording".to_string(),
                reason: "can't parse entities".to_string(),
            });
        }
        if message.text.chars().count() > self.max_text_len.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                name: "recording".to_string(),
                reason: "message is too long".to_string(),
            });
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let chat_id = message.chat_id;
        self.record(PlatformCall::Send {
            message_id,
            message,
        });
        Ok(SentMessage {
            chat_id,
            message_id,
        })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError> {
        self.record(PlatformCall::Delete {
            chat_id,
            message_id,
        });
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ChannelError::DeleteFailed {
                name: "recording".to_string(),
                reason: "message can't be deleted".to_string(),
            });
        }
        Ok(())
    }

    async fn member_role(&self, chat_id: i64, user_id: i64) -> Result<MemberRole, ChannelError> {
        if self.fail_role_lookups.load(Ordering::SeqCst) {
            return Err(ChannelError::MemberLookupFailed {
                name: "recording".to_string(),
                reason: "chat not found".to_string(),
            });
        }
        Ok(lock(&self.roles)
            .get(&(chat_id, user_id))
            .copied()
            .unwrap_or(MemberRole::Member))
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), ChannelError> {
        self.record(PlatformCall::AnswerCallback(callback_id.to_string()));
        Ok(())
    }
}

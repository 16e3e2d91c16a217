//! Execution orchestrator.
//!
//! Runs one remote agent call and turns it into exactly one reply. If the
//! call outlasts the thinking delay a silent placeholder is posted and later
//! retracted. Cancellation abandons the call and sends nothing further.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channels::{ChatPlatform, OutgoingMessage, ParseMode, SentMessage};
use crate::error::{AgentError, ErrorKind};
use crate::remote::{RemoteAgent, redact_sensitive_detail};

pub(crate) const THINKING: &str = "🤔 Thinking...";

/// One request to run against a resolved endpoint.
#[derive(Debug)]
pub struct Invocation {
    pub chat_id: i64,
    /// Message the replies are threaded under.
    pub reply_to: Option<i64>,
    pub message: String,
    pub endpoint_url: String,
    pub credential: SecretString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    Answered { placeholder_shown: bool },
    Failed { kind: ErrorKind, placeholder_shown: bool },
    Cancelled,
}

pub struct Orchestrator {
    platform: Arc<dyn ChatPlatform>,
    agent: Arc<dyn RemoteAgent>,
    thinking_delay: Duration,
}

/// Aborts the worker if the orchestrating future is dropped mid-call.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Orchestrator {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        agent: Arc<dyn RemoteAgent>,
        thinking_delay: Duration,
    ) -> Self {
        Self {
            platform,
            agent,
            thinking_delay,
        }
    }

    pub async fn run(&self, invocation: Invocation, cancel: &CancellationToken) -> InvocationOutcome {
        let Invocation {
            chat_id,
            reply_to,
            message,
            endpoint_url,
            credential,
        } = invocation;

        let (tx, mut rx) = oneshot::channel();
        let agent = Arc::clone(&self.agent);
        let worker = AbortOnDrop(tokio::spawn(async move {
            let result = agent.invoke(&message, &endpoint_url, &credential).await;
            // The receiver is gone only when the invocation was cancelled.
            let _ = tx.send(result);
        }));

        let delay = tokio::time::sleep(self.thinking_delay);
        tokio::pin!(delay);
        let mut delay_pending = true;
        let mut placeholder: Option<SentMessage> = None;

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                received = &mut rx => {
                    break Some(received.unwrap_or_else(|_| {
                        Err(AgentError::Stream("agent task ended without a result".to_string()))
                    }));
                }
                _ = &mut delay, if delay_pending => {
                    delay_pending = false;
                    placeholder = self.show_placeholder(chat_id, reply_to).await;
                }
            }
        };

        let placeholder_shown = placeholder.is_some();
        let Some(result) = result else {
            drop(worker);
            self.retract(placeholder).await;
            tracing::info!(chat_id, "Agent invocation cancelled");
            return InvocationOutcome::Cancelled;
        };

        self.retract(placeholder).await;
        let kind = match result {
            Ok(answer) => {
                if self.deliver_answer(chat_id, reply_to, answer).await {
                    return InvocationOutcome::Answered { placeholder_shown };
                }
                ErrorKind::Transport
            }
            Err(e) => {
                let kind = e.kind();
                tracing::error!(
                    chat_id,
                    ?kind,
                    "Agent invocation failed: {}",
                    redact_sensitive_detail(&e.to_string())
                );
                kind
            }
        };
        self.send_error(chat_id, reply_to, kind).await;
        InvocationOutcome::Failed {
            kind,
            placeholder_shown,
        }
    }

    async fn send_error(&self, chat_id: i64, reply_to: Option<i64>, kind: ErrorKind) {
        let mut reply = OutgoingMessage::new(chat_id, kind.user_message());
        if let Some(id) = reply_to {
            reply = reply.reply_to(id);
        }
        if let Err(e) = self.platform.send_message(reply).await {
            tracing::error!(chat_id, "Failed to send error reply: {}", e);
        }
    }

    async fn show_placeholder(&self, chat_id: i64, reply_to: Option<i64>) -> Option<SentMessage> {
        let mut msg = OutgoingMessage::new(chat_id, THINKING).silent().protected();
        if let Some(id) = reply_to {
            msg = msg.reply_to(id);
        }
        match self.platform.send_message(msg).await {
            Ok(sent) => Some(sent),
            Err(e) => {
                tracing::warn!(chat_id, "Failed to send thinking placeholder: {}", e);
                None
            }
        }
    }

    async fn retract(&self, placeholder: Option<SentMessage>) {
        let Some(sent) = placeholder else {
            return;
        };
        if let Err(e) = self
            .platform
            .delete_message(sent.chat_id, sent.message_id)
            .await
        {
            tracing::warn!(
                chat_id = sent.chat_id,
                message_id = sent.message_id,
                "Failed to retract thinking placeholder: {}",
                e
            );
        }
    }

    /// Send the answer as Markdown, falling back to plain text when the
    /// platform rejects the formatting. Returns false when neither send
    /// went through.
    async fn deliver_answer(&self, chat_id: i64, reply_to: Option<i64>, answer: String) -> bool {
        let mut msg = OutgoingMessage::new(chat_id, answer);
        if let Some(id) = reply_to {
            msg = msg.reply_to(id);
        }

        let formatted = msg.clone().parse_mode(ParseMode::Markdown);
        let Err(e) = self.platform.send_message(formatted).await else {
            return true;
        };
        tracing::warn!(chat_id, "Markdown reply rejected, resending as plain text: {}", e);
        match self.platform.send_message(msg).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(chat_id, "Failed to send agent answer: {}", e);
                false
            }
        }
    }
}

//! The bot core: routes inbound chat events to registration, listing and
//! agent invocation.

pub mod commands;
pub mod executor;
mod listing;
pub mod permission;
mod registration;
pub mod resolver;
pub mod setup;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::bot::commands::{AiArgs, CallbackAction, Command, parse_command};
use crate::bot::executor::{Invocation, Orchestrator};
use crate::bot::resolver::{Resolution, UNREGISTERED, resolve};
use crate::bot::setup::SetupSessions;
use crate::channels::{
    CallbackPress, ChatPlatform, InboundEvent, InboundHandler, IncomingText, OutgoingMessage,
    SentMessage,
};
use crate::config::{Config, DefaultAgentConfig};
use crate::db::ConfigStore;
use crate::error::{Error, ErrorKind, Result};
use crate::remote::{RemoteAgent, redact_sensitive_detail};
use crate::secrets::CredentialVault;

pub const HELP_TEXT: &str = "👋 Welcome to ask Bot! Here are the available commands:

🚀 /start or /help
   Show this help message

📝 /reg
   Register a new user or server configuration
   • Set up a new user configuration
   • /reg server - Set up a new server configuration

📋 /ls
   List your commands or server configurations
   • List your personal commands
   • /ls server - List server configurations (in private chat) or server commands (in group chat)

🤖 /ai <subcommand> <message>
   Execute an AI command
   • Format: /ai <subcommand> <message>
   • The subcommand should match one of your configured commands

💬 /ask <message>
   Ask the default agent, when one is configured

📌 Example: /ai summarize Please summarize this text for me.

-------------------------------------------

❓ Need more help? Feel free to ask!";

const AI_USAGE: &str = "Usage: /ai <subcommand> <message>";
const ASK_USAGE: &str = "Usage: /ask <message>";
const ASK_NOT_CONFIGURED: &str = "The default agent is not configured.";

/// Runtime knobs for [`Bot`].
#[derive(Debug, Clone)]
pub struct BotOptions {
    pub thinking_delay: Duration,
    pub session_ttl: Duration,
    pub default_agent: Option<DefaultAgentConfig>,
}

impl BotOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thinking_delay: config.agent.thinking_delay,
            session_ttl: config.setup.session_ttl,
            default_agent: config.agent.default_agent.clone(),
        }
    }
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            thinking_delay: Duration::from_secs(1),
            session_ttl: Duration::from_secs(900),
            default_agent: None,
        }
    }
}

pub struct Bot {
    store: Arc<dyn ConfigStore>,
    platform: Arc<dyn ChatPlatform>,
    vault: Arc<CredentialVault>,
    sessions: SetupSessions,
    orchestrator: Orchestrator,
    default_agent: Option<DefaultAgentConfig>,
    shutdown: CancellationToken,
}

impl Bot {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        platform: Arc<dyn ChatPlatform>,
        vault: Arc<CredentialVault>,
        agent: Arc<dyn RemoteAgent>,
        options: BotOptions,
        shutdown: CancellationToken,
    ) -> Self {
        let orchestrator = Orchestrator::new(Arc::clone(&platform), agent, options.thinking_delay);
        Self {
            store,
            platform,
            vault,
            sessions: SetupSessions::new(options.session_ttl),
            orchestrator,
            default_agent: options.default_agent,
            shutdown,
        }
    }

    async fn on_text(&self, msg: &IncomingText) -> Result<()> {
        let Some(command) = parse_command(&msg.text) else {
            self.handle_setup_input(msg).await?;
            return Ok(());
        };

        let chat_id = msg.chat.chat_id;
        tracing::debug!(chat_id, user_id = msg.from.user_id, ?command, "Command received");
        match command {
            Command::Help => {
                self.say(chat_id, HELP_TEXT).await;
                Ok(())
            }
            Command::Register { server: false } => self.register_user(msg).await,
            Command::Register { server: true } => self.register_server(msg).await,
            Command::List { server: false } => self.list_user(msg).await,
            Command::List { server: true } => self.list_server(msg).await,
            Command::Ai(Some(args)) => self.invoke_command(msg, &args).await,
            Command::Ai(None) => {
                self.say(chat_id, AI_USAGE).await;
                Ok(())
            }
            Command::Ask(Some(message)) => {
                self.ask_default(msg, message).await;
                Ok(())
            }
            Command::Ask(None) => {
                self.say(chat_id, ASK_USAGE).await;
                Ok(())
            }
        }
    }

    async fn on_callback(&self, press: &CallbackPress) -> Result<()> {
        let Some(action) = CallbackAction::parse(&press.data) else {
            tracing::debug!(data = %press.data, "Ignoring unknown callback");
            return Ok(());
        };
        match action {
            CallbackAction::Setup(scope, id) => self.on_setup_pressed(press, scope, id).await,
            CallbackAction::Discard(scope, id) => self.on_discard_pressed(press, scope, id).await,
            CallbackAction::ListServer(id) => self.on_list_server_pressed(press, id).await,
            CallbackAction::Remove(scope, id) => self.on_remove_pressed(press, scope, id).await,
        }
    }

    /// `/ai <subcommand> <message>`.
    async fn invoke_command(&self, msg: &IncomingText, args: &AiArgs) -> Result<()> {
        let chat_id = msg.chat.chat_id;
        let config = match resolve(self.store.as_ref(), &msg.chat, &msg.from, &args.subcommand)
            .await?
        {
            Resolution::Found(config) => config,
            Resolution::Pending => {
                self.say(chat_id, ErrorKind::Pending.user_message()).await;
                return Ok(());
            }
            Resolution::NotFound => {
                self.say(chat_id, ErrorKind::NotFound.user_message()).await;
                return Ok(());
            }
            Resolution::Unregistered => {
                self.say(chat_id, UNREGISTERED).await;
                return Ok(());
            }
        };

        let credential = self.vault.decrypt(&config.api_key)?;
        tracing::info!(
            chat_id,
            config_id = config.id,
            scope = %config.scope,
            command = %config.command,
            "Invoking agent"
        );
        let invocation = Invocation {
            chat_id,
            reply_to: Some(msg.message_id),
            message: args.message.clone(),
            endpoint_url: config.endpoint_url,
            credential,
        };
        self.orchestrator.run(invocation, &self.shutdown).await;
        Ok(())
    }

    /// `/ask <message>` against the configured default agent.
    async fn ask_default(&self, msg: &IncomingText, message: String) {
        let chat_id = msg.chat.chat_id;
        let Some(agent) = &self.default_agent else {
            self.say(chat_id, ASK_NOT_CONFIGURED).await;
            return;
        };
        let invocation = Invocation {
            chat_id,
            reply_to: Some(msg.message_id),
            message,
            endpoint_url: agent.endpoint_url.clone(),
            credential: agent.token.clone(),
        };
        self.orchestrator.run(invocation, &self.shutdown).await;
    }

    /// Log a failed request and tell the user in one generic line.
    async fn report(&self, chat_id: i64, error: &Error) {
        let kind = error.kind();
        tracing::error!(
            chat_id,
            ?kind,
            "Request failed: {}",
            redact_sensitive_detail(&error.to_string())
        );
        self.say(chat_id, kind.user_message()).await;
    }

    async fn send(&self, message: OutgoingMessage) -> Option<SentMessage> {
        let chat_id = message.chat_id;
        match self.platform.send_message(message).await {
            Ok(sent) => Some(sent),
            Err(e) => {
                tracing::warn!(chat_id, "Failed to send message: {}", e);
                None
            }
        }
    }

    async fn say(&self, chat_id: i64, text: &str) {
        self.send(OutgoingMessage::new(chat_id, text)).await;
    }
}

#[async_trait]
impl InboundHandler for Bot {
    async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Text(msg) => {
                if let Err(e) = self.on_text(&msg).await {
                    self.report(msg.chat.chat_id, &e).await;
                }
            }
            InboundEvent::Callback(press) => {
                if let Err(e) = self.platform.answer_callback(&press.callback_id).await {
                    tracing::warn!(callback_id = %press.callback_id, "Failed to answer callback: {}", e);
                }
                if let Err(e) = self.on_callback(&press).await {
                    self.report(press.chat.chat_id, &e).await;
                }
            }
        }
    }
}

//! `/ls` listings and command removal.

use crate::bot::Bot;
use crate::bot::commands::CallbackAction;
use crate::bot::permission::{is_authorized, may_manage_config};
use crate::bot::setup::CONFIG_GONE;
use crate::channels::{CallbackPress, IncomingText, InlineButton, OutgoingMessage, ParseMode};
use crate::db::{AgentConfig, Scope};
use crate::error::{ErrorKind, Result};

const NO_USER_COMMANDS: &str =
    "You don't have any commands set up. Please use /reg to set up a command.";
const NO_SERVERS: &str = "You don't have any servers registered. Please go to a server and use /reg server to register a server.";
const NO_SERVER_COMMANDS: &str =
    "No commands found for this server. Please use /reg server to set up commands.";
const SELECT_SERVER: &str = "Select a server to view its commands:";
const COMMAND_REMOVED: &str = "Command removed successfully.";
const REMOVE_DENIED: &str = "You don't have permission to remove this command.";
const REMOVE_FAILED: &str = "Failed to remove command. Please try again.";

const LISTING_HEADER: &str = "📋 List of Commands\n\nHere are your current commands:\n\n";
const LISTING_SEPARATOR: &str = "\n\\-\\-\\-\n\n";

/// Escape text for MarkdownV2 outside of code spans.
pub(crate) fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|'
                | '{' | '}' | '.' | '!' | '\\'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape text for a MarkdownV2 inline code span.
fn escape_code(text: &str) -> String {
    text.replace('\\', "\\\\").replace('`', "\\`")
}

/// Render complete configs as a MarkdownV2 listing, with one remove button
/// per command when `removable`.
pub(crate) fn render_listing(
    configs: &[AgentConfig],
    removable: bool,
) -> (String, Vec<Vec<InlineButton>>) {
    let entries: Vec<String> = configs
        .iter()
        .map(|c| {
            format!(
                "🤖 *Command:* `{}`\n📝 *Description:* {}",
                escape_code(&c.command),
                escape_markdown_v2(&c.description)
            )
        })
        .collect();
    let text = format!("{LISTING_HEADER}{}", entries.join(LISTING_SEPARATOR));

    let keyboard = if removable {
        configs
            .iter()
            .map(|c| {
                vec![InlineButton::new(
                    format!("🗑️ Remove \"{}\"", c.command),
                    CallbackAction::Remove(c.scope, c.id).encode(),
                )]
            })
            .collect()
    } else {
        Vec::new()
    };
    (text, keyboard)
}

fn complete_only(configs: Vec<AgentConfig>) -> Vec<AgentConfig> {
    configs.into_iter().filter(AgentConfig::is_complete).collect()
}

impl Bot {
    /// `/ls`: the sender's own commands.
    pub(super) async fn list_user(&self, msg: &IncomingText) -> Result<()> {
        let chat_id = msg.chat.chat_id;
        let user = self
            .store
            .get_user_by_platform_id(msg.chat.platform, &msg.from.user_id.to_string())
            .await?;
        let configs = match user {
            Some(user) => complete_only(self.store.list_configs_by_owner(Scope::User, user.id).await?),
            None => Vec::new(),
        };
        if configs.is_empty() {
            self.say(chat_id, NO_USER_COMMANDS).await;
            return Ok(());
        }
        self.send_listing(chat_id, &configs, true).await;
        Ok(())
    }

    /// `/ls server`: owned servers in a private chat, this server's commands
    /// in a group.
    pub(super) async fn list_server(&self, msg: &IncomingText) -> Result<()> {
        let chat = &msg.chat;

        if chat.is_private() {
            let user = self
                .store
                .get_user_by_platform_id(chat.platform, &msg.from.user_id.to_string())
                .await?;
            let servers = match user {
                Some(user) => self.store.list_servers_by_owner(user.id).await?,
                None => Vec::new(),
            };
            if servers.is_empty() {
                self.say(chat.chat_id, NO_SERVERS).await;
                return Ok(());
            }
            let rows = servers
                .into_iter()
                .map(|s| {
                    let label = if s.name.is_empty() {
                        s.platform_server_id.clone()
                    } else {
                        s.name.clone()
                    };
                    vec![InlineButton::new(label, CallbackAction::ListServer(s.id).encode())]
                })
                .collect();
            self.send(OutgoingMessage::new(chat.chat_id, SELECT_SERVER).keyboard(rows))
                .await;
            return Ok(());
        }

        let server = self
            .store
            .get_server_by_platform_id(chat.platform, &chat.chat_id.to_string())
            .await?;
        let configs = match server {
            Some(server) => {
                complete_only(self.store.list_configs_by_owner(Scope::Server, server.id).await?)
            }
            None => Vec::new(),
        };
        if configs.is_empty() {
            self.say(chat.chat_id, NO_SERVER_COMMANDS).await;
            return Ok(());
        }
        let removable = is_authorized(self.platform.as_ref(), msg.from.user_id, chat).await;
        self.send_listing(chat.chat_id, &configs, removable).await;
        Ok(())
    }

    /// Server button from the private `/ls server` menu.
    pub(super) async fn on_list_server_pressed(
        &self,
        press: &CallbackPress,
        server_id: i64,
    ) -> Result<()> {
        let chat_id = press.chat.chat_id;
        let owner = self
            .store
            .get_user_by_platform_id(press.chat.platform, &press.from.user_id.to_string())
            .await?;
        let server = self.store.get_server(server_id).await?;

        let Some(server) = server.filter(|s| owner.is_some_and(|u| u.id == s.owner_id)) else {
            self.say(chat_id, ErrorKind::Unauthorized.user_message())
                .await;
            return Ok(());
        };

        let configs =
            complete_only(self.store.list_configs_by_owner(Scope::Server, server.id).await?);
        if configs.is_empty() {
            self.say(chat_id, NO_SERVER_COMMANDS).await;
            return Ok(());
        }
        self.send_listing(chat_id, &configs, true).await;
        Ok(())
    }

    /// Remove button under a listing.
    pub(super) async fn on_remove_pressed(
        &self,
        press: &CallbackPress,
        scope: Scope,
        config_id: i64,
    ) -> Result<()> {
        let chat_id = press.chat.chat_id;
        let Some(config) = self.store.get_config(scope, config_id).await? else {
            self.say(chat_id, CONFIG_GONE).await;
            return Ok(());
        };
        if !may_manage_config(
            self.store.as_ref(),
            self.platform.as_ref(),
            press.from.user_id,
            &config,
        )
        .await?
        {
            self.say(chat_id, REMOVE_DENIED).await;
            return Ok(());
        }

        match self.store.delete_config(scope, config_id).await {
            Ok(true) => {
                self.sessions.retire_config(scope, config_id).await;
                tracing::info!(config_id, %scope, command = %config.command, "Command removed");
                self.say(chat_id, COMMAND_REMOVED).await;
            }
            Ok(false) => self.say(chat_id, CONFIG_GONE).await,
            Err(e) => {
                tracing::error!(config_id, %scope, "Failed to remove command: {}", e);
                self.say(chat_id, REMOVE_FAILED).await;
            }
        }
        Ok(())
    }

    async fn send_listing(&self, chat_id: i64, configs: &[AgentConfig], removable: bool) {
        let (text, keyboard) = render_listing(configs, removable);
        self.send(
            OutgoingMessage::new(chat_id, text)
                .parse_mode(ParseMode::MarkdownV2)
                .keyboard(keyboard),
        )
        .await;
    }
}

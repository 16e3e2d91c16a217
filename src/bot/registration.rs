//! `/reg` flows and the pending-configuration menu.

use crate::bot::Bot;
use crate::bot::commands::CallbackAction;
use crate::bot::permission::{is_authorized, may_manage_config};
use crate::bot::setup::CONFIG_GONE;
use crate::channels::{CallbackPress, IncomingText, InlineButton, OutgoingMessage};
use crate::db::{AgentConfig, Scope};
use crate::error::{ErrorKind, Result};

const USER_REGISTERED: &str =
    "User registered successfully. Please complete your configuration by tapping the button below:";
const USER_PENDING: &str = "You have a pending configuration. Please complete it or remove it:";
const SERVER_INITIATED: &str = "Server configuration has been initiated successfully for this chat.";
const SERVER_PENDING: &str = "Please select a server to complete its configuration or remove it:";
const NO_PENDING_SERVERS: &str = "You have no pending server configurations. If you want to setup a new server, please move to the server chat and type the command `/reg server`.";

fn removed(scope: Scope) -> &'static str {
    match scope {
        Scope::User => "User configuration removed successfully.",
        Scope::Server => "Server configuration removed successfully.",
    }
}

fn remove_failed(scope: Scope) -> &'static str {
    match scope {
        Scope::User => "Failed to remove user configuration. Please try again.",
        Scope::Server => "Failed to remove server configuration. Please try again.",
    }
}

/// One menu row: resume on the left, discard on the right.
fn pending_row(label: String, config: &AgentConfig) -> Vec<InlineButton> {
    vec![
        InlineButton::new(label, CallbackAction::Setup(config.scope, config.id).encode()),
        InlineButton::new("❌", CallbackAction::Discard(config.scope, config.id).encode()),
    ]
}

impl Bot {
    /// `/reg`: resume a pending personal config or start a new one.
    pub(super) async fn register_user(&self, msg: &IncomingText) -> Result<()> {
        let user = self
            .store
            .get_or_create_user(
                msg.chat.platform,
                &msg.from.user_id.to_string(),
                &msg.from.username,
            )
            .await?;
        let dm = self.platform.direct_chat_id(msg.from.user_id);

        let pending = self.store.list_pending_by_user(Scope::User, user.id).await?;
        if !pending.is_empty() {
            let rows = pending
                .iter()
                .map(|config| {
                    let label = if config.command.is_empty() {
                        "Setup".to_string()
                    } else {
                        format!("Setup {}", config.command)
                    };
                    pending_row(label, config)
                })
                .collect();
            self.send(OutgoingMessage::new(dm, USER_PENDING).keyboard(rows))
                .await;
            return Ok(());
        }

        let config = self.store.create_config(Scope::User, user.id).await?;
        tracing::info!(config_id = config.id, user_id = user.id, "User config created");
        let button = InlineButton::new(
            "Setup Configuration",
            CallbackAction::Setup(Scope::User, config.id).encode(),
        );
        self.send(OutgoingMessage::new(dm, USER_REGISTERED).keyboard(vec![vec![button]]))
            .await;
        Ok(())
    }

    /// `/reg server`: in a group, create a server config (admins only); in a
    /// private chat, show the pending server configs.
    pub(super) async fn register_server(&self, msg: &IncomingText) -> Result<()> {
        let chat = &msg.chat;

        if chat.is_private() {
            let user = self
                .store
                .get_user_by_platform_id(chat.platform, &msg.from.user_id.to_string())
                .await?;
            let pending = match user {
                Some(user) => self.store.list_pending_by_user(Scope::Server, user.id).await?,
                None => Vec::new(),
            };
            if pending.is_empty() {
                self.say(chat.chat_id, NO_PENDING_SERVERS).await;
            } else {
                self.send_server_menu(chat.chat_id, &pending).await?;
            }
            return Ok(());
        }

        if !is_authorized(self.platform.as_ref(), msg.from.user_id, chat).await {
            self.say(chat.chat_id, ErrorKind::Unauthorized.user_message())
                .await;
            return Ok(());
        }

        let user = self
            .store
            .get_or_create_user(
                chat.platform,
                &msg.from.user_id.to_string(),
                &msg.from.username,
            )
            .await?;
        let server = self
            .store
            .get_or_create_server(
                chat.platform,
                &chat.chat_id.to_string(),
                chat.title.as_deref().unwrap_or_default(),
                user.id,
            )
            .await?;
        let config = self.store.create_config(Scope::Server, server.id).await?;
        tracing::info!(
            config_id = config.id,
            server_id = server.id,
            user_id = user.id,
            "Server config created"
        );
        self.say(chat.chat_id, SERVER_INITIATED).await;

        // Admins who don't own the server still get the config they just made.
        let mut pending = self.store.list_pending_by_user(Scope::Server, user.id).await?;
        if !pending.iter().any(|c| c.id == config.id) {
            pending.push(config);
        }
        let dm = self.platform.direct_chat_id(msg.from.user_id);
        self.send_server_menu(dm, &pending).await
    }

    async fn send_server_menu(&self, chat_id: i64, pending: &[AgentConfig]) -> Result<()> {
        let mut rows = Vec::with_capacity(pending.len());
        for config in pending {
            let name = match self.store.get_server(config.owner_id).await? {
                Some(server) if !server.name.is_empty() => server.name,
                Some(server) => server.platform_server_id,
                None => continue,
            };
            let label = if config.command.is_empty() {
                name
            } else {
                format!("{name} ({})", config.command)
            };
            rows.push(pending_row(label, config));
        }
        self.send(OutgoingMessage::new(chat_id, SERVER_PENDING).keyboard(rows))
            .await;
        Ok(())
    }

    /// "Setup" button on a pending config.
    pub(super) async fn on_setup_pressed(
        &self,
        press: &CallbackPress,
        scope: Scope,
        config_id: i64,
    ) -> Result<()> {
        let Some(config) = self.store.get_config(scope, config_id).await? else {
            self.say(press.chat.chat_id, CONFIG_GONE).await;
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
            self.say(press.chat.chat_id, ErrorKind::Unauthorized.user_message())
                .await;
            return Ok(());
        }

        self.start_setup(press.from.user_id, scope, config_id)
            .await
            .map(|_| ())
    }

    /// "❌" button on a pending config.
    pub(super) async fn on_discard_pressed(
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
            self.say(chat_id, ErrorKind::Unauthorized.user_message())
                .await;
            return Ok(());
        }

        match self.store.delete_config(scope, config_id).await {
            Ok(true) => {
                self.sessions.retire_config(scope, config_id).await;
                tracing::info!(config_id, %scope, "Pending config discarded");
                self.say(chat_id, removed(scope)).await;
            }
            Ok(false) => self.say(chat_id, CONFIG_GONE).await,
            Err(e) => {
                tracing::error!(config_id, %scope, "Failed to discard config: {}", e);
                self.say(chat_id, remove_failed(scope)).await;
            }
        }
        Ok(())
    }
}

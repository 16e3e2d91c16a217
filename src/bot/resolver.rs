//! Command resolution: which agent config a `/ai <subcommand>` refers to.

use crate::channels::{ChatContext, Sender};
use crate::db::{AgentConfig, ConfigStore, Scope};
use crate::error::DatabaseError;

/// Outcome of resolving a subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// An invocable config.
    Found(AgentConfig),
    /// A config with this command exists but is missing its endpoint or key.
    Pending,
    NotFound,
    /// Neither the acting user nor the chat's server is known to the store.
    Unregistered,
}

pub(crate) const UNREGISTERED: &str =
    "You are not registered yet. Use /reg to set up your first command.";

/// Resolve `subcommand` for `sender` in `chat`.
///
/// Private chats only see the user's own configs. In a group the server's
/// config wins and the user's own config is the fallback.
pub async fn resolve(
    store: &dyn ConfigStore,
    chat: &ChatContext,
    sender: &Sender,
    subcommand: &str,
) -> Result<Resolution, DatabaseError> {
    let user = store
        .get_user_by_platform_id(chat.platform, &sender.user_id.to_string())
        .await?;

    let server = if chat.is_private() {
        None
    } else {
        store
            .get_server_by_platform_id(chat.platform, &chat.chat_id.to_string())
            .await?
    };

    if user.is_none() && server.is_none() {
        return Ok(Resolution::Unregistered);
    }

    let candidates = server
        .map(|s| (Scope::Server, s.id))
        .into_iter()
        .chain(user.map(|u| (Scope::User, u.id)));

    let mut pending = false;
    for (scope, owner_id) in candidates {
        match store.get_config_by_command(scope, owner_id, subcommand).await? {
            Some(config) if config.is_invocable() => return Ok(Resolution::Found(config)),
            Some(_) => pending = true,
            None => {}
        }
    }

    Ok(if pending {
        Resolution::Pending
    } else {
        Resolution::NotFound
    })
}

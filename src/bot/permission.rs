//! Permission gate for administrative actions.

use crate::channels::{ChatContext, ChatKind, ChatPlatform};
use crate::db::{AgentConfig, ConfigStore, Scope};
use crate::error::DatabaseError;

/// Whether `user_id` may perform admin actions in `chat`.
///
/// A user talking to the bot directly is always authorized. In a group the
/// platform is asked for the user's role; only owners and administrators
/// pass, and a failed lookup denies.
pub async fn is_authorized(platform: &dyn ChatPlatform, user_id: i64, chat: &ChatContext) -> bool {
    if user_id == chat.chat_id {
        return true;
    }

    match platform.member_role(chat.chat_id, user_id).await {
        Ok(role) => role.is_admin(),
        Err(e) => {
            tracing::warn!(chat_id = chat.chat_id, user_id, "Member role lookup failed: {}", e);
            false
        }
    }
}

/// Whether `user_id` may set up, discard or remove `config`.
///
/// A user config belongs to its owner alone. A server config may also be
/// managed by anyone the platform reports as an admin of that server's chat.
pub async fn may_manage_config(
    store: &dyn ConfigStore,
    platform: &dyn ChatPlatform,
    user_id: i64,
    config: &AgentConfig,
) -> Result<bool, DatabaseError> {
    let acting = store
        .get_user_by_platform_id(platform.platform(), &user_id.to_string())
        .await?;

    match config.scope {
        Scope::User => Ok(acting.is_some_and(|u| u.id == config.owner_id)),
        Scope::Server => {
            let Some(server) = store.get_server(config.owner_id).await? else {
                return Ok(false);
            };
            if acting.is_some_and(|u| u.id == server.owner_id) {
                return Ok(true);
            }
            let Ok(chat_id) = server.platform_server_id.parse::<i64>() else {
                tracing::warn!(server_id = server.id, "Server has a non-numeric chat id");
                return Ok(false);
            };
            let chat = ChatContext {
                platform: server.platform,
                chat_id,
                kind: ChatKind::Group,
                title: Some(server.name),
            };
            Ok(is_authorized(platform, user_id, &chat).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::test_support::Harness;
    use crate::channels::MemberRole;
    use crate::channels::testing::RecordingPlatform;
    use crate::db::Platform;

    fn group(chat_id: i64) -> ChatContext {
        ChatContext {
            platform: Platform::Telegram,
            chat_id,
            kind: ChatKind::Group,
            title: Some("Team".into()),
        }
    }

    #[tokio::test]
    async fn private_chat_is_always_authorized() {
        let platform = RecordingPlatform::new();
        platform.fail_role_lookups(true);
        let chat = ChatContext {
            platform: Platform::Telegram,
            chat_id: 42,
            kind: ChatKind::Private,
            title: None,
        };
        assert!(is_authorized(&platform, 42, &chat).await);
    }

    #[tokio::test]
    async fn group_requires_owner_or_admin() {
        let platform = RecordingPlatform::new();
        platform.set_role(-100, 1, MemberRole::Owner);
        platform.set_role(-100, 2, MemberRole::Administrator);
        platform.set_role(-100, 3, MemberRole::Restricted);

        assert!(is_authorized(&platform, 1, &group(-100)).await);
        assert!(is_authorized(&platform, 2, &group(-100)).await);
        assert!(!is_authorized(&platform, 3, &group(-100)).await);
        assert!(!is_authorized(&platform, 4, &group(-100)).await);
    }

    #[tokio::test]
    async fn lookup_failure_denies() {
        let platform = RecordingPlatform::new();
        platform.set_role(-100, 1, MemberRole::Owner);
        platform.fail_role_lookups(true);
        assert!(!is_authorized(&platform, 1, &group(-100)).await);
    }

    #[tokio::test]
    async fn user_config_is_owner_only() {
        let h = Harness::new().await;
        let cfg = h.pending_user_config(42).await;
        h.store
            .get_or_create_user(Platform::Telegram, "43", "mallory")
            .await
            .unwrap();

        let store = h.store.as_ref();
        assert!(may_manage_config(store, h.platform.as_ref(), 42, &cfg).await.unwrap());
        assert!(!may_manage_config(store, h.platform.as_ref(), 43, &cfg).await.unwrap());
        assert!(!may_manage_config(store, h.platform.as_ref(), 44, &cfg).await.unwrap());
    }

    #[tokio::test]
    async fn server_config_allows_owner_and_chat_admins() {
        let h = Harness::new().await;
        let cfg = h.pending_server_config(42, -100).await;
        h.platform.set_role(-100, 43, MemberRole::Administrator);

        let store = h.store.as_ref();
        assert!(may_manage_config(store, h.platform.as_ref(), 42, &cfg).await.unwrap());
        assert!(may_manage_config(store, h.platform.as_ref(), 43, &cfg).await.unwrap());
        assert!(!may_manage_config(store, h.platform.as_ref(), 44, &cfg).await.unwrap());
    }
}

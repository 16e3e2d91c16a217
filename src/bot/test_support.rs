//! Shared fixtures for bot tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use crate::bot::{Bot, BotOptions};
use crate::channels::testing::RecordingPlatform;
use crate::channels::{CallbackPress, ChatContext, ChatKind, IncomingText, Sender};
use crate::db::libsql::LibSqlBackend;
use crate::db::{AgentConfig, ConfigField, ConfigStore, Platform, Scope};
use crate::error::AgentError;
use crate::remote::RemoteAgent;
use crate::secrets::CredentialVault;

/// Remote agent that answers (or fails) after a fixed delay and records
/// every request as `(message, endpoint, credential)`.
pub(crate) struct ScriptedAgent {
    delay: Duration,
    outcome: std::result::Result<String, fn() -> AgentError>,
    requests: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedAgent {
    pub(crate) fn answer(delay: Duration, answer: &str) -> Self {
        Self {
            delay,
            outcome: Ok(answer.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail(delay: Duration, error: fn() -> AgentError) -> Self {
        Self {
            delay,
            outcome: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<(String, String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteAgent for ScriptedAgent {
    async fn invoke(
        &self,
        message: &str,
        endpoint_url: &str,
        credential: &SecretString,
    ) -> Result<String, AgentError> {
        self.requests.lock().unwrap().push((
            message.to_string(),
            endpoint_url.to_string(),
            credential.expose_secret().to_string(),
        ));
        tokio::time::sleep(self.delay).await;
        match &self.outcome {
            Ok(answer) => Ok(answer.clone()),
            Err(make) => Err(make()),
        }
    }
}

/// A bot wired to a temp libSQL file, a recording platform and a scripted agent.
pub(crate) struct Harness {
    pub bot: Bot,
    pub store: Arc<dyn ConfigStore>,
    pub platform: Arc<RecordingPlatform>,
    pub vault: Arc<CredentialVault>,
    pub agent: Arc<ScriptedAgent>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        Self::with_options(
            ScriptedAgent::answer(Duration::from_millis(10), "answer"),
            BotOptions::default(),
        )
        .await
    }

    pub(crate) async fn with_options(agent: ScriptedAgent, options: BotOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backend = LibSqlBackend::new_local(&dir.path().join("bot.db"))
            .await
            .unwrap();
        backend.run_migrations().await.unwrap();
        let store: Arc<dyn ConfigStore> = Arc::new(backend);
        let platform = Arc::new(RecordingPlatform::new());
        let vault = Arc::new(CredentialVault::from_key_bytes(&[7u8; 32]).unwrap());
        let agent = Arc::new(agent);

        let bot = Bot::new(
            Arc::clone(&store),
            platform.clone(),
            Arc::clone(&vault),
            agent.clone(),
            options,
            CancellationToken::new(),
        );
        Self {
            bot,
            store,
            platform,
            vault,
            agent,
            _dir: dir,
        }
    }

    async fn user_id(&self, platform_user_id: i64) -> i64 {
        self.store
            .get_or_create_user(
                Platform::Telegram,
                &platform_user_id.to_string(),
                &format!("user{platform_user_id}"),
            )
            .await
            .unwrap()
            .id
    }

    async fn server_id(&self, owner: i64, chat_id: i64) -> i64 {
        let owner_id = self.user_id(owner).await;
        self.store
            .get_or_create_server(Platform::Telegram, &chat_id.to_string(), "Team", owner_id)
            .await
            .unwrap()
            .id
    }

    async fn complete(&self, config: AgentConfig, command: &str, url: &str) -> AgentConfig {
        let sealed = self.vault.encrypt("app-key").unwrap();
        let mut updated = config;
        for (field, value) in [
            (ConfigField::Command, command),
            (ConfigField::EndpointUrl, url),
            (ConfigField::ApiKey, sealed.as_str()),
            (ConfigField::Description, "Summarizes text"),
        ] {
            updated = self
                .store
                .update_field(updated.scope, updated.id, field, value)
                .await
                .unwrap();
        }
        updated
    }

    pub(crate) async fn pending_user_config(&self, user: i64) -> AgentConfig {
        let owner_id = self.user_id(user).await;
        self.store.create_config(Scope::User, owner_id).await.unwrap()
    }

    pub(crate) async fn complete_user_config(&self, user: i64, command: &str, url: &str) -> AgentConfig {
        let config = self.pending_user_config(user).await;
        self.complete(config, command, url).await
    }

    pub(crate) async fn pending_server_config(&self, owner: i64, chat_id: i64) -> AgentConfig {
        let server_id = self.server_id(owner, chat_id).await;
        self.store
            .create_config(Scope::Server, server_id)
            .await
            .unwrap()
    }

    pub(crate) async fn complete_server_config(
        &self,
        owner: i64,
        chat_id: i64,
        command: &str,
        url: &str,
    ) -> AgentConfig {
        let config = self.pending_server_config(owner, chat_id).await;
        self.complete(config, command, url).await
    }
}

pub(crate) fn private_chat(user_id: i64) -> ChatContext {
    ChatContext {
        platform: Platform::Telegram,
        chat_id: user_id,
        kind: ChatKind::Private,
        title: None,
    }
}

pub(crate) fn group_chat(chat_id: i64) -> ChatContext {
    ChatContext {
        platform: Platform::Telegram,
        chat_id,
        kind: ChatKind::Group,
        title: Some("Team".to_string()),
    }
}

pub(crate) fn sender(user_id: i64) -> Sender {
    Sender {
        user_id,
        username: format!("user{user_id}"),
    }
}

pub(crate) fn private_text(user_id: i64, text: &str) -> IncomingText {
    IncomingText {
        message_id: 1,
        chat: private_chat(user_id),
        from: sender(user_id),
        text: text.to_string(),
    }
}

pub(crate) fn group_text(chat_id: i64, user_id: i64, text: &str) -> IncomingText {
    IncomingText {
        message_id: 1,
        chat: group_chat(chat_id),
        from: sender(user_id),
        text: text.to_string(),
    }
}

/// A button press by `user_id` in `chat_id`, with empty data.
pub(crate) fn press(chat_id: i64, user_id: i64, callback_id: &str) -> CallbackPress {
    let chat = if chat_id == user_id {
        private_chat(user_id)
    } else {
        group_chat(chat_id)
    };
    CallbackPress {
        callback_id: callback_id.to_string(),
        chat,
        from: sender(user_id),
        data: String::new(),
    }
}

//! End-to-end bot flows.
//!
//! These tests start a real Axum server on a random port that streams agent
//! responses, wire the bot to it through the HTTP agent client, a libSQL file
//! and a recording chat platform, and drive:
//! - the `/reg` wizard from button press to completed config
//! - `/ai` resolution and answer extraction
//! - server-over-personal precedence in groups
//! - error replies for rejected credentials

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio_util::sync::CancellationToken;

use askbot::bot::{Bot, BotOptions};
use askbot::channels::testing::RecordingPlatform;
use askbot::channels::{
    CallbackPress, ChatContext, ChatKind, InboundEvent, InboundHandler, IncomingText,
    MemberRole, Sender,
};
use askbot::config::AgentConfig;
use askbot::db::libsql::LibSqlBackend;
use askbot::db::{ConfigStore, Platform, Scope};
use askbot::error::ErrorKind;
use askbot::remote::HttpAgentClient;
use askbot::secrets::CredentialVault;

#[derive(Clone, Default)]
struct MockAgent {
    /// `(path name, authorization header, query)` per request.
    requests: Arc<Mutex<Vec<(String, String, String)>>>,
}

async fn chat_handler(
    State(state): State<MockAgent>,
    Path(name): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<serde_json::Value>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let query = body["query"].as_str().unwrap_or_default().to_string();
    state
        .requests
        .lock()
        .unwrap()
        .push((name.clone(), auth.clone(), query));

    if !auth.starts_with("Bearer app-") {
        return (StatusCode::UNAUTHORIZED, "invalid key").into_response();
    }

    let thought = format!("  answer from {name}  \\n  second line ");
    let stream = format!(
        "data: {{\"event\":\"agent_thought\",\"thought\":\"\"}}\n\n\
         data: {{\"event\":\"agent_thought\",\"thought\":\"{thought}\"}}\n\n\
         data: {{\"event\":\"agent_message\",\"answer\":\"ignored\"}}\n\n"
    );
    ([(header::CONTENT_TYPE, "text/event-stream")], stream).into_response()
}

async fn start_mock_agent() -> (SocketAddr, MockAgent) {
    let state = MockAgent::default();
    let app = Router::new()
        .route("/{name}/chat-messages", post(chat_handler))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

struct TestBot {
    bot: Bot,
    store: Arc<dyn ConfigStore>,
    platform: Arc<RecordingPlatform>,
    _dir: tempfile::TempDir,
}

async fn test_bot() -> TestBot {
    let dir = tempfile::tempdir().unwrap();
    let backend = LibSqlBackend::new_local(&dir.path().join("flow.db"))
        .await
        .unwrap();
    backend.run_migrations().await.unwrap();
    let store: Arc<dyn ConfigStore> = Arc::new(backend);
    let platform = Arc::new(RecordingPlatform::new());
    let vault = Arc::new(CredentialVault::from_key_bytes(&[9u8; 32]).unwrap());
    let agent_config = AgentConfig {
        timeout: Duration::from_secs(10),
        ..AgentConfig::default()
    };
    let agent = Arc::new(HttpAgentClient::new(&agent_config).unwrap());

    let bot = Bot::new(
        Arc::clone(&store),
        platform.clone(),
        vault,
        agent,
        BotOptions {
            thinking_delay: Duration::from_secs(30),
            ..BotOptions::default()
        },
        CancellationToken::new(),
    );
    TestBot {
        bot,
        store,
        platform,
        _dir: dir,
    }
}

fn sender(user_id: i64) -> Sender {
    Sender {
        user_id,
        username: format!("user{user_id}"),
    }
}

fn chat(chat_id: i64, user_id: i64) -> ChatContext {
    if chat_id == user_id {
        ChatContext {
            platform: Platform::Telegram,
            chat_id,
            kind: ChatKind::Private,
            title: None,
        }
    } else {
        ChatContext {
            platform: Platform::Telegram,
            chat_id,
            kind: ChatKind::Group,
            title: Some("Research".to_string()),
        }
    }
}

fn text(chat_id: i64, user_id: i64, body: &str) -> InboundEvent {
    InboundEvent::Text(IncomingText {
        message_id: 500,
        chat: chat(chat_id, user_id),
        from: sender(user_id),
        text: body.to_string(),
    })
}

fn button(chat_id: i64, user_id: i64, data: &str) -> InboundEvent {
    InboundEvent::Callback(CallbackPress {
        callback_id: "cb".to_string(),
        chat: chat(chat_id, user_id),
        from: sender(user_id),
        data: data.to_string(),
    })
}

/// Press the first button of the last message, then answer each prompt.
async fn finish_wizard(t: &TestBot, user_id: i64, answers: [&str; 4]) {
    let menu = t.platform.last_sent().unwrap();
    let data = menu.keyboard[0][0].data.clone();
    t.bot.handle(button(user_id, user_id, &data)).await;
    for answer in answers {
        t.bot.handle(text(user_id, user_id, answer)).await;
    }
    assert_eq!(
        t.platform.last_sent().unwrap().text,
        "Description saved. Setup complete."
    );
}

#[tokio::test]
async fn register_then_invoke_personal_command() {
    let (addr, mock) = start_mock_agent().await;
    let t = test_bot().await;

    t.bot.handle(text(42, 42, "/reg")).await;
    finish_wizard(
        &t,
        42,
        [
            "summarize",
            &format!("http://{addr}/user/chat-messages"),
            "app-user-key",
            "Summarizes things",
        ],
    )
    .await;

    t.bot.handle(text(42, 42, "/ai summarize  please shorten this")).await;

    let reply = t.platform.last_sent().unwrap();
    assert_eq!(reply.text, "answer from user\nsecond line");
    assert_eq!(reply.reply_to, Some(500));
    assert_eq!(
        mock.requests.lock().unwrap().clone(),
        vec![(
            "user".to_string(),
            "Bearer app-user-key".to_string(),
            "please shorten this".to_string()
        )]
    );

    // The stored key is sealed and the key message was deleted from the chat.
    let user = t
        .store
        .get_user_by_platform_id(Platform::Telegram, "42")
        .await
        .unwrap()
        .unwrap();
    let config = t
        .store
        .get_config_by_command(Scope::User, user.id, "summarize")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(config.api_key, "app-user-key");
    assert!(config.is_active);
    assert_eq!(t.platform.deleted(), vec![(42, 500)]);
}

#[tokio::test]
async fn server_command_wins_in_group_and_personal_wins_in_private() {
    let (addr, mock) = start_mock_agent().await;
    let t = test_bot().await;
    t.platform.set_role(-100, 42, MemberRole::Owner);

    t.bot.handle(text(42, 42, "/reg")).await;
    finish_wizard(
        &t,
        42,
        [
            "ask",
            &format!("http://{addr}/user/chat-messages"),
            "app-user-key",
            "Personal",
        ],
    )
    .await;

    t.bot.handle(text(-100, 42, "/reg server")).await;
    finish_wizard(
        &t,
        42,
        [
            "ask",
            &format!("http://{addr}/server/chat-messages"),
            "app-server-key",
            "Team agent",
        ],
    )
    .await;

    t.bot.handle(text(-100, 42, "/ai ask in the group")).await;
    let group_reply = t.platform.last_sent().unwrap();
    assert_eq!(group_reply.chat_id, -100);
    assert_eq!(group_reply.text, "answer from server\nsecond line");

    t.bot.handle(text(42, 42, "/ai ask in private")).await;
    assert_eq!(
        t.platform.last_sent().unwrap().text,
        "answer from user\nsecond line"
    );

    let paths: Vec<String> = mock
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(|(name, _, _)| name.clone())
        .collect();
    assert_eq!(paths, vec!["server", "user"]);
}

#[tokio::test]
async fn rejected_credential_yields_generic_error() {
    let (addr, _mock) = start_mock_agent().await;
    let t = test_bot().await;

    t.bot.handle(text(42, 42, "/reg")).await;
    finish_wizard(
        &t,
        42,
        [
            "sum",
            &format!("http://{addr}/user/chat-messages"),
            "wrong-key",
            "Bad key",
        ],
    )
    .await;

    t.bot.handle(text(42, 42, "/ai sum hello")).await;
    assert_eq!(
        t.platform.last_sent().unwrap().text,
        ErrorKind::Transport.user_message()
    );
}

#[tokio::test]
async fn listing_after_registration_offers_removal() {
    let (addr, _mock) = start_mock_agent().await;
    let t = test_bot().await;

    t.bot.handle(text(42, 42, "/reg")).await;
    finish_wizard(
        &t,
        42,
        [
            "sum",
            &format!("http://{addr}/user/chat-messages"),
            "app-key",
            "Summaries",
        ],
    )
    .await;

    t.bot.handle(text(42, 42, "/ls")).await;
    let listing = t.platform.last_sent().unwrap();
    let remove = listing.keyboard[0][0].data.clone();
    assert!(remove.starts_with("ls_remove_command:user_"));

    t.bot.handle(button(42, 42, &remove)).await;
    assert_eq!(
        t.platform.last_sent().unwrap().text,
        "Command removed successfully."
    );

    t.bot.handle(text(42, 42, "/ai sum hello")).await;
    assert_eq!(
        t.platform.last_sent().unwrap().text,
        ErrorKind::NotFound.user_message()
    );
}

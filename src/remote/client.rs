//! HTTP client for remote agent endpoints.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config;
use crate::error::AgentError;
use crate::remote::RemoteAgent;
use crate::remote::stream::extract_answer;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    inputs: serde_json::Map<String, serde_json::Value>,
    query: &'a str,
    response_mode: &'static str,
    conversation_id: &'static str,
    user: &'a str,
}

/// Calls an agent endpoint over HTTP and streams the answer back.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    http: reqwest::Client,
    user_tag: String,
    timeout: Duration,
}

impl HttpAgentClient {
    pub fn new(settings: &config::AgentConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30).min(settings.timeout))
            .build()?;
        Ok(Self {
            http,
            user_tag: settings.user_tag.clone(),
            timeout: settings.timeout,
        })
    }

    async fn call(
        &self,
        message: &str,
        endpoint: url::Url,
        credential: &SecretString,
    ) -> Result<String, AgentError> {
        let body = ChatRequest {
            inputs: serde_json::Map::new(),
            query: message,
            response_mode: "streaming",
            conversation_id: "",
            user: &self.user_tag,
        };

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(credential.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Transport {
                status: status.as_u16(),
            });
        }

        extract_answer(response.bytes_stream()).await
    }
}

#[async_trait]
impl RemoteAgent for HttpAgentClient {
    async fn invoke(
        &self,
        message: &str,
        endpoint_url: &str,
        credential: &SecretString,
    ) -> Result<String, AgentError> {
        let endpoint = parse_endpoint(endpoint_url)?;
        let answer = tokio::time::timeout(self.timeout, self.call(message, endpoint, credential))
            .await
            .map_err(|_| AgentError::Timeout(self.timeout))??;

        let normalized = normalize_answer(&answer);
        if normalized.trim().is_empty() {
            return Err(AgentError::EmptyAnswer);
        }
        Ok(normalized)
    }
}

fn parse_endpoint(raw: &str) -> Result<url::Url, AgentError> {
    let url = url::Url::parse(raw).map_err(|e| AgentError::InvalidEndpoint {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AgentError::InvalidEndpoint {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

/// Trim every line of the answer, keeping the line structure.
pub fn normalize_answer(answer: &str) -> String {
    answer
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_each_line() {
        assert_eq!(
            normalize_answer("  Title \n\t- one  \n   \n- two\r"),
            "Title\n- one\n\n- two"
        );
    }

    #[test]
    fn endpoint_must_be_http() {
        assert!(parse_endpoint("https://agent.example/v1/chat-messages").is_ok());
        assert!(matches!(
            parse_endpoint("ftp://agent.example"),
            Err(AgentError::InvalidEndpoint { .. })
        ));
        assert!(parse_endpoint("not a url").is_err());
    }

    #[test]
    fn request_body_matches_wire_shape() {
        let body = ChatRequest {
            inputs: serde_json::Map::new(),
            query: "hello",
            response_mode: "streaming",
            conversation_id: "",
            user: "ask",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "inputs": {},
                "query": "hello",
                "response_mode": "streaming",
                "conversation_id": "",
                "user": "ask"
            })
        );
    }
}

//! Remote agent invocation.

pub mod client;
pub mod stream;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use secrecy::SecretString;

use crate::error::AgentError;

pub use self::client::HttpAgentClient;

/// Sends one message to an agent endpoint and returns its answer.
#[async_trait]
pub trait RemoteAgent: Send + Sync {
    async fn invoke(
        &self,
        message: &str,
        endpoint_url: &str,
        credential: &SecretString,
    ) -> Result<String, AgentError>;
}

static REDACTIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
        (
            r"(?i)\b(token|api[_\-]?key|secret|password)\b(\s*[:=]\s*)([^,\s]+)",
            "$1$2[REDACTED]",
        ),
        (r"(?i)\bapp-[a-z0-9]{8,}\b", "app-[REDACTED]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Mask credentials in error text before it reaches the logs.
pub fn redact_sensitive_detail(raw: &str) -> String {
    let mut value = raw.to_string();
    for (re, replacement) in REDACTIONS.iter() {
        value = re.replace_all(&value, *replacement).to_string();
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_masks_tokens() {
        let message = "request failed bearer abc.def token=abc123 api_key: xyz987 app-0123456789ab";
        let redacted = redact_sensitive_detail(message);
        assert!(!redacted.contains("abc.def"));
        assert!(!redacted.contains("abc123"));
        assert!(!redacted.contains("xyz987"));
        assert!(!redacted.contains("0123456789ab"));
        assert!(redacted.contains("bearer [REDACTED]"));
    }
}

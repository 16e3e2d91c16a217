//! Answer extraction from a streamed agent response.
//!
//! The body is a sequence of `data: {json}` lines. Only `agent_thought`
//! records matter; the answer is the last one whose `thought` is non-empty.

use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::error::AgentError;

const THOUGHT_EVENT: &str = "agent_thought";

#[derive(Debug, Deserialize)]
struct StreamRecord {
    event: Option<String>,
    #[serde(default)]
    thought: Option<String>,
}

/// Outcome of feeding one line to the collector.
#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Blank,
    Thought,
    Ignored,
    Malformed,
}

/// Tracks thought records in arrival order, keeping only what the final
/// answer can depend on.
#[derive(Debug, Default)]
struct ThoughtCollector {
    thoughts_seen: usize,
    last_non_empty: Option<String>,
}

impl ThoughtCollector {
    fn feed_line(&mut self, raw: &str) -> LineOutcome {
        let line = raw.trim();
        let payload = line.strip_prefix("data:").unwrap_or(line).trim();
        if payload.is_empty() {
            return LineOutcome::Blank;
        }

        let record: StreamRecord = match serde_json::from_str(payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed stream record");
                return LineOutcome::Malformed;
            }
        };

        match record.event.as_deref() {
            None => {
                tracing::debug!("Skipping stream record without event field");
                LineOutcome::Ignored
            }
            Some(THOUGHT_EVENT) => {
                self.thoughts_seen += 1;
                if let Some(thought) = record.thought.filter(|t| !t.is_empty()) {
                    self.last_non_empty = Some(thought);
                }
                LineOutcome::Thought
            }
            Some(_) => LineOutcome::Ignored,
        }
    }

    fn finish(self) -> Result<String, AgentError> {
        match self.last_non_empty {
            Some(answer) => Ok(answer),
            None => {
                tracing::debug!(thoughts = self.thoughts_seen, "No non-empty thought in stream");
                Err(AgentError::NoThought)
            }
        }
    }
}

/// Consume a response body chunk by chunk and pick the answer.
///
/// Lines may straddle chunk boundaries (including inside a multi-byte
/// character); only complete lines are decoded. A chunk error aborts the
/// whole extraction.
pub async fn extract_answer<S, B, E>(body: S) -> Result<String, AgentError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut collector = ThoughtCollector::default();
    let mut buffer: Vec<u8> = Vec::new();
    // Bytes of `buffer` already known to hold no newline.
    let mut scanned = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| AgentError::Stream(e.to_string()))?;
        buffer.extend_from_slice(chunk.as_ref());

        let mut consumed = 0;
        while let Some(offset) = buffer[scanned..].iter().position(|b| *b == b'\n') {
            let end = scanned + offset;
            collector.feed_line(&String::from_utf8_lossy(&buffer[consumed..=end]));
            consumed = end + 1;
            scanned = consumed;
        }
        buffer.drain(..consumed);
        scanned = buffer.len();
    }

    if !buffer.is_empty() {
        collector.feed_line(&String::from_utf8_lossy(&buffer));
    }

    collector.finish()
}

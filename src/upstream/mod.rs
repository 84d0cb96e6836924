//! Upstream provider subsystem.
//!
//! # Data Flow
//! ```text
//! Request handler
//!     → client.rs (POST {base_url}{path}, fixed headers, hard timeout)
//!     → normalize.rs (coalesce payload shape into {status, result})
//!     → UpstreamResponse | UpstreamError
//! ```
//!
//! One attempt per call. Failures surface immediately to the handler,
//! which maps them to a generic client-facing message.

pub mod client;
pub mod normalize;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::UpstreamClient;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Normalized provider answer, relayed to the client as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub status: bool,
    pub result: String,
}

/// Why an upstream call failed. The detail is for logs, not for clients.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed upstream body: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::Transport(_) => "transport",
            UpstreamError::Status { .. } => "status",
            UpstreamError::Malformed(_) => "malformed",
        }
    }
}

/// A provider that answers an ordered list of turns.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send the turns in order; the last one is the new prompt.
    async fn send(&self, turns: Vec<ConversationTurn>) -> Result<UpstreamResponse, UpstreamError>;

    /// Send a single prompt as one user turn.
    async fn send_prompt(&self, prompt: &str) -> Result<UpstreamResponse, UpstreamError> {
        self.send(vec![ConversationTurn::user(prompt)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_serialize_with_lowercase_roles() {
        let turns = vec![ConversationTurn::user("hi"), ConversationTurn::assistant("hello")];
        let json = serde_json::to_value(&turns).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ])
        );
    }
}

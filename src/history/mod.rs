pub mod store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::DuckDbHistoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model", alias = "assistant")]
    Agent,
}

/// One persisted transcript entry. Tool traffic is never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database connection lock poisoned")]
    LockPoisoned,
}

/// Per-session, append-only transcript with sliding expiry.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Ordered transcript; empty when nothing is stored, the entry expired,
    /// or the stored payload cannot be decoded.
    async fn load(&self, session_id: &str) -> Result<Vec<ChatMessage>, HistoryError>;

    /// Appends one message and refreshes the expiry.
    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<(), HistoryError>;

    /// Appends several messages in order as one write.
    async fn append_all(&self, session_id: &str, messages: Vec<ChatMessage>) -> Result<(), HistoryError> {
        for message in messages {
            self.append(session_id, message).await?;
        }
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), HistoryError>;
}

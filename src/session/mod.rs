pub mod controller;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub use controller::{SessionController, SessionEnd};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
}

/// Write half of a client connection.
#[async_trait]
pub trait Outbound: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No turn running, nothing pending.
    Idle,
    /// A turn is executing over the pending buffer.
    Running,
    /// Waiting for a superseded turn to unwind.
    Cancelling,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Running => write!(f, "running"),
            SessionState::Cancelling => write!(f, "cancelling"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Answers go into a channel; used by in-process clients and tests.
#[async_trait]
impl Outbound for tokio::sync::mpsc::UnboundedSender<String> {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(text).map_err(|_| TransportError::Closed)
    }
}

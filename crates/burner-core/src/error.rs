//! Error types
//!
//! Every failure inside a room session is normalized into one of these
//! kinds before it touches session state. Validation errors carry the exact
//! text shown to the user.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::Phase;

/// Input rejected before any network effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Please enter your name")]
    EmptyName,

    #[error("Name must be at least 2 characters")]
    NameTooShort,

    #[error("Name must be 20 characters or less")]
    NameTooLong,

    #[error("Please enter a room ID")]
    EmptyRoomId,

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Message must be 500 characters or less")]
    MessageTooLong,
}

/// Errors raised by a transport link
///
/// These are cloneable and serializable so they can travel inside
/// transport signals and lifecycle payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum TransportError {
    #[error("Connection attempt timed out after {}ms", .0.as_millis())]
    ConnectTimeout(Duration),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Top-level error for room session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Connection failed after {attempts} reconnection attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Cannot {action} while {phase}")]
    InvalidPhase { phase: Phase, action: &'static str },
}

impl ChatError {
    /// Whether the session can no longer recover without leaving
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatError::ReconnectExhausted { .. })
    }
}

impl From<ChatError> for String {
    fn from(err: ChatError) -> String {
        err.to_string()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ChatError>;

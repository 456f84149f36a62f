//! Burner Core Library
//!
//! Client side of an ephemeral, room-based chat. Nothing is persisted: a
//! room exists while people are in it, and a session's state lives only as
//! long as its [`RoomSession`].
//!
//! # Modules
//!
//! - [`transport`] - Reconnecting event channel to the room coordinator
//! - [`membership`] - Join handshake and presence tracking
//! - [`messaging`] - Sending and receiving chat messages
//! - [`session`] - Room session controller and its state machine
//! - [`message_log`] - Append-only room message log
//! - [`protocol`] - Wire envelope and payload types
//! - [`events`] - Update sink trait for decoupling rendering from the core
//! - [`config`] - Client and reconnection configuration
//! - [`validation`] / [`room_id`] - Input checks and room identifiers
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod events;
pub mod membership;
pub mod message_log;
pub mod messaging;
pub mod protocol;
pub mod room_id;
pub mod session;
pub mod transport;
pub mod validation;

// Re-export commonly used types
pub use config::{ClientConfig, ConfigError, ReconnectConfig};
pub use error::{ChatError, Result, TransportError, ValidationError};
pub use events::{NoOpSink, StdoutSink, UpdateSink};
pub use message_log::{ChatMessage, MessageId, MessageKind};
pub use messaging::SendOutcome;
pub use room_id::RoomId;
pub use session::{Phase, RoomSession, SessionState, SessionUpdate};
pub use transport::{Connector, Link, LinkRead, TransportSession, TransportSignal};
pub use validation::DisplayName;

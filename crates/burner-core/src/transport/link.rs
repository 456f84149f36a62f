//! Connector and link abstractions
//!
//! A [`Connector`] opens one physical connection to the room coordinator and
//! completes its handshake; the resulting [`Link`] carries text frames until
//! it is closed by either side.

use async_trait::async_trait;

use crate::error::TransportError;

/// Result of reading from a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRead {
    /// A text frame
    Frame(String),
    /// The coordinator closed the connection on purpose
    ServerClosed,
    /// The connection was lost
    Dropped(TransportError),
}

/// Opens connections to the room coordinator
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect and complete the handshake
    ///
    /// The returned link already knows its connection identifier.
    async fn connect(&self) -> Result<Box<dyn Link>, TransportError>;
}

/// One established connection
///
/// `recv` must be cancel-safe: the driver polls it inside `tokio::select!`.
#[async_trait]
pub trait Link: Send {
    /// Identifier the coordinator assigned to this connection
    fn connection_id(&self) -> &str;

    /// Send a text frame
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Wait for the next frame or the end of the connection
    async fn recv(&mut self) -> LinkRead;

    /// Close the connection from our side
    async fn close(&mut self);
}

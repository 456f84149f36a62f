//! In-memory connector for tests
//!
//! [`MockServer`] scripts the outcome of each connection attempt and hands
//! back a [`MockRemote`] per accepted connection, which plays the room
//! coordinator's side of the link.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::link::{Connector, Link, LinkRead};
use crate::error::TransportError;
use crate::protocol::Envelope;

enum Outcome {
    Accept(MockLink),
    Refuse(TransportError),
}

pub(crate) struct MockConnector {
    script: Mutex<mpsc::UnboundedReceiver<Outcome>>,
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Link>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        // An unscripted attempt hangs until the connect timeout fires
        let outcome = self.script.lock().await.recv().await;
        match outcome {
            Some(Outcome::Accept(link)) => Ok(Box::new(link)),
            Some(Outcome::Refuse(err)) => Err(err),
            None => std::future::pending().await,
        }
    }
}

pub(crate) struct MockServer {
    script: mpsc::UnboundedSender<Outcome>,
    attempts: Arc<AtomicU32>,
}

impl MockServer {
    pub(crate) fn new() -> (MockConnector, MockServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicU32::new(0));
        let connector = MockConnector {
            script: Mutex::new(rx),
            attempts: Arc::clone(&attempts),
        };
        (
            connector,
            MockServer {
                script: tx,
                attempts,
            },
        )
    }

    /// Accept the next connection attempt under `connection_id`
    pub(crate) fn accept(&self, connection_id: &str) -> MockRemote {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let link = MockLink {
            connection_id: connection_id.to_string(),
            incoming,
            outgoing,
            closed: Arc::clone(&closed),
        };
        let _ = self.script.send(Outcome::Accept(link));

        MockRemote {
            to_client,
            from_client,
            closed,
        }
    }

    /// Fail the next connection attempt
    pub(crate) fn refuse(&self, err: TransportError) {
        let _ = self.script.send(Outcome::Refuse(err));
    }

    /// Connection attempts made so far
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

struct MockLink {
    connection_id: String,
    incoming: mpsc::UnboundedReceiver<LinkRead>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Link for MockLink {
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.outgoing.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> LinkRead {
        self.incoming
            .recv()
            .await
            .unwrap_or(LinkRead::Dropped(TransportError::Closed))
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Coordinator side of one accepted connection
pub(crate) struct MockRemote {
    to_client: mpsc::UnboundedSender<LinkRead>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl MockRemote {
    /// Deliver an event to the client
    pub(crate) fn push(&self, event: &str, data: serde_json::Value) {
        let frame = serde_json::to_string(&Envelope::new(event, data)).unwrap();
        let _ = self.to_client.send(LinkRead::Frame(frame));
    }

    /// Deliver a raw text frame
    pub(crate) fn push_raw(&self, frame: &str) {
        let _ = self.to_client.send(LinkRead::Frame(frame.to_string()));
    }

    /// Close the connection from the coordinator side
    pub(crate) fn close(&self) {
        let _ = self.to_client.send(LinkRead::ServerClosed);
    }

    /// Simulate a network-level drop
    pub(crate) fn drop_link(&self) {
        let _ = self
            .to_client
            .send(LinkRead::Dropped(TransportError::WebSocket(
                "connection reset".to_string(),
            )));
    }

    /// Next frame the client sent on this connection
    pub(crate) async fn next_frame(&mut self) -> Envelope {
        let frame = self.from_client.recv().await.expect("client link closed");
        Envelope::decode(&frame).unwrap()
    }

    /// Every frame the client has sent so far
    pub(crate) fn sent_frames(&mut self) -> Vec<Envelope> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(Envelope::decode(&frame).unwrap());
        }
        frames
    }

    pub(crate) fn closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

//! WebSocket connector
//!
//! Connects to the room coordinator over WebSocket (tokio-tungstenite) and
//! waits for its `welcome` frame, which carries the connection identifier.
//! A Close frame from the coordinator is reported as a server-initiated
//! disconnect; any other end of stream is a network drop.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::link::{Connector, Link, LinkRead};
use crate::error::TransportError;
use crate::protocol::{events, Envelope, Welcome};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections to a fixed coordinator URL
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Link>, TransportError> {
        debug!("connecting to {}", self.url);
        let (mut stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let connection_id = await_welcome(&mut stream).await?;
        info!("WebSocket handshake complete, connection id {}", connection_id);

        Ok(Box::new(WsLink {
            stream,
            connection_id,
        }))
    }
}

/// Read frames until the coordinator's `welcome`
async fn await_welcome(stream: &mut WsStream) -> Result<String, TransportError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let envelope = Envelope::decode(&text)
                    .map_err(|e| TransportError::Handshake(e.to_string()))?;
                if envelope.event != events::WELCOME {
                    return Err(TransportError::Handshake(format!(
                        "expected {}, got {}",
                        events::WELCOME,
                        envelope.event
                    )));
                }
                let welcome: Welcome = envelope
                    .payload()
                    .map_err(|e| TransportError::Handshake(e.to_string()))?;
                return Ok(welcome.connection_id);
            }
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
        }
    }
}

struct WsLink {
    stream: WsStream,
    connection_id: String,
}

#[async_trait]
impl Link for WsLink {
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    async fn recv(&mut self) -> LinkRead {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return LinkRead::Frame(text),
                Some(Ok(Message::Close(frame))) => {
                    debug!("close frame from server: {:?}", frame);
                    return LinkRead::ServerClosed;
                }
                // Pings are answered by tungstenite on the next write
                Some(Ok(_)) => continue,
                Some(Err(e)) => return LinkRead::Dropped(TransportError::WebSocket(e.to_string())),
                None => return LinkRead::Dropped(TransportError::Closed),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("error closing WebSocket: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn coordinator(first_frame: serde_json::Value) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text(first_frame.to_string())).await.unwrap();

            let mut received = Vec::new();
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                received.push(text);
            }
            ws.send(Message::Text(
                json!({"event": "user_joined", "data": {"userCount": 1}}).to_string(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
            received
        });

        (format!("ws://{addr}/ws"), handle)
    }

    #[tokio::test]
    async fn test_handshake_and_server_close() {
        let (url, server) =
            coordinator(json!({"event": "welcome", "data": {"connectionId": "X"}})).await;

        let mut link = WsConnector::new(url).connect().await.unwrap();
        assert_eq!(link.connection_id(), "X");

        let frame = Envelope::encode(events::SEND_MESSAGE, &json!({"message": "hi"})).unwrap();
        link.send(frame.clone()).await.unwrap();

        match link.recv().await {
            LinkRead::Frame(text) => assert_eq!(Envelope::decode(&text).unwrap().event, "user_joined"),
            other => panic!("expected frame, got {other:?}"),
        }
        assert_eq!(link.recv().await, LinkRead::ServerClosed);

        assert_eq!(server.await.unwrap(), vec![frame]);
    }

    #[tokio::test]
    async fn test_handshake_rejects_unexpected_first_frame() {
        let (url, _server) =
            coordinator(json!({"event": "user_joined", "data": {"userCount": 1}})).await;

        let result = WsConnector::new(url).connect().await;
        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsConnector::new(format!("ws://{addr}/ws")).connect().await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}

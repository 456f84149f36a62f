//! Transport session
//!
//! Wraps a reconnecting, bidirectional event channel to the room
//! coordinator. The session owns:
//!
//! - a background driver task that holds the physical link (see [`driver`])
//! - a handler table mapping each event name to exactly one callback
//! - the connection identifier that is current at dispatch time
//!
//! Signals from the driver are pulled with [`TransportSession::next_signal`]
//! and run through the handler table with [`TransportSession::dispatch`] on
//! the owner's task, so handlers never run concurrently with each other.

mod driver;
mod handlers;
mod link;
#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "websocket")]
pub mod ws;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ReconnectConfig;
use crate::error::TransportError;
use crate::protocol::{
    events, ConnectErrorInfo, ConnectInfo, DisconnectInfo, DisconnectReason, Envelope,
    ReconnectAttempt, ReconnectFailed,
};

pub use handlers::{Handler, Subscription};
pub use link::{Connector, Link, LinkRead};

use driver::Driver;
use handlers::{HandlerTable, SharedTable};

/// Something the transport observed
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// A link is up and the coordinator assigned a connection identifier
    Connected {
        connection_id: String,
        recovered: bool,
    },
    /// The link went down
    Disconnected {
        reason: DisconnectReason,
        error: Option<TransportError>,
    },
    /// A connection attempt failed
    ConnectError(TransportError),
    /// A retry is scheduled
    Reconnecting { attempt: u32, delay: Duration },
    /// Retries are exhausted, the transport has stopped
    ReconnectFailed { attempts: u32 },
    /// An event from the coordinator
    Event(Envelope),
}

impl TransportSignal {
    /// Name under which the signal is dispatched
    pub fn event_name(&self) -> &str {
        match self {
            TransportSignal::Connected { .. } => events::CONNECT,
            TransportSignal::Disconnected { .. } => events::DISCONNECT,
            TransportSignal::ConnectError(_) => events::CONNECT_ERROR,
            TransportSignal::Reconnecting { .. } => events::RECONNECT_ATTEMPT,
            TransportSignal::ReconnectFailed { .. } => events::RECONNECT_FAILED,
            TransportSignal::Event(envelope) => envelope.event.as_str(),
        }
    }

    /// Payload handed to the handler
    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            TransportSignal::Connected {
                connection_id,
                recovered,
            } => serde_json::to_value(ConnectInfo {
                connection_id: connection_id.clone(),
                recovered: *recovered,
            }),
            TransportSignal::Disconnected { reason, error } => {
                serde_json::to_value(DisconnectInfo {
                    reason: *reason,
                    error: error.clone(),
                })
            }
            TransportSignal::ConnectError(err) => serde_json::to_value(ConnectErrorInfo {
                error: err.clone(),
            }),
            TransportSignal::Reconnecting { attempt, delay } => {
                serde_json::to_value(ReconnectAttempt {
                    attempt: *attempt,
                    delay_ms: delay.as_millis() as u64,
                })
            }
            TransportSignal::ReconnectFailed { attempts } => {
                serde_json::to_value(ReconnectFailed {
                    attempts: *attempts,
                })
            }
            TransportSignal::Event(envelope) => return envelope.data.clone(),
        };
        value.unwrap_or_default()
    }
}

/// What a handler sees for one dispatched event
pub struct Inbound<'a> {
    pub event: &'a str,
    pub payload: &'a serde_json::Value,
    /// Connection identifier current at dispatch time
    pub connection_id: Option<&'a str>,
    pub emitter: &'a Emitter,
}

impl Inbound<'_> {
    /// Deserialize the payload, logging and returning `None` when malformed
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        match serde_json::from_value(self.payload.clone()) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("dropping malformed {} payload: {}", self.event, err);
                None
            }
        }
    }
}

/// Fire-and-forget sender for outbound events
///
/// Frames emitted while no link is up are discarded by the driver.
#[derive(Clone, Debug)]
pub struct Emitter {
    commands: Option<mpsc::UnboundedSender<String>>,
}

impl Emitter {
    /// An emitter that drops everything
    pub fn detached() -> Self {
        Self { commands: None }
    }

    /// An emitter whose frames land in the returned receiver
    #[cfg(test)]
    pub(crate) fn capture() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { commands: Some(tx) }, rx)
    }

    pub fn emit<T: Serialize>(&self, event: &str, payload: &T) {
        let Some(commands) = &self.commands else {
            debug!("transport not started, dropping {}", event);
            return;
        };

        match Envelope::encode(event, payload) {
            Ok(frame) => {
                if commands.send(frame).is_err() {
                    debug!("transport stopped, dropping {}", event);
                }
            }
            Err(err) => warn!("failed to encode {}: {}", event, err),
        }
    }
}

/// Handles to a running driver task
struct DriverHandle {
    task: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
    commands: mpsc::UnboundedSender<String>,
    signals: Option<mpsc::UnboundedReceiver<TransportSignal>>,
    /// Link state of this driver only; a closing driver keeps its own
    connected: Arc<AtomicBool>,
}

/// Reconnecting event channel to a single room coordinator
///
/// `S` is the context type handlers operate on.
pub struct TransportSession<S> {
    connector: Arc<dyn Connector>,
    config: ReconnectConfig,
    handlers: SharedTable<S>,
    driver: Option<DriverHandle>,
    closing: Option<JoinHandle<()>>,
    connection_id: Option<String>,
}

impl<S> TransportSession<S> {
    pub fn new(connector: impl Connector, config: ReconnectConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            handlers: Arc::new(Mutex::new(HandlerTable::new())),
            driver: None,
            closing: None,
            connection_id: None,
        }
    }

    /// Start connecting
    ///
    /// No-op while a driver is already connecting or connected. Must be
    /// called from within a tokio runtime.
    pub fn connect(&mut self) {
        if let Some(driver) = &self.driver {
            if !driver.task.is_finished() {
                debug!("transport already connecting or connected");
                return;
            }
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let connected = Arc::new(AtomicBool::new(false));

        let driver = Driver {
            connector: Arc::clone(&self.connector),
            config: self.config.clone(),
            commands: commands_rx,
            signals: signals_tx,
            shutdown: shutdown_rx,
            connected: Arc::clone(&connected),
        };

        self.connection_id = None;
        self.driver = Some(DriverHandle {
            task: tokio::spawn(driver.run()),
            shutdown: Some(shutdown_tx),
            commands: commands_tx,
            signals: Some(signals_rx),
            connected,
        });
    }

    /// Tear down the channel and every registered handler
    ///
    /// After this returns no further signal can be dispatched. The link is
    /// closed in the background; await [`closed`](Self::closed) to wait for it.
    pub fn disconnect(&mut self) {
        self.handlers.lock().clear();
        self.connection_id = None;

        if let Some(mut driver) = self.driver.take() {
            if let Some(shutdown) = driver.shutdown.take() {
                let _ = shutdown.send(());
            }
            driver.signals = None;
            if let Some(previous) = self.closing.replace(driver.task) {
                previous.abort();
            }
        }
    }

    /// Wait for a previous [`disconnect`](Self::disconnect) to finish closing the link
    pub async fn closed(&mut self) {
        let Some(mut task) = self.closing.take() else {
            return;
        };

        match tokio::time::timeout(self.config.shutdown_timeout(), &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => warn!("transport driver terminated with error: {}", join_err),
            Err(_) => {
                warn!("transport driver did not exit within timeout, aborting");
                task.abort();
            }
        }
    }

    /// Emit an event to the coordinator
    ///
    /// Silently dropped when not connected; callers check connectivity first.
    pub fn emit<T: Serialize>(&self, event: &str, payload: &T) {
        self.emitter().emit(event, payload);
    }

    pub fn emitter(&self) -> Emitter {
        Emitter {
            commands: self.driver.as_ref().map(|d| d.commands.clone()),
        }
    }

    /// Register the handler for `event`, replacing any previous one
    pub fn on<F>(&mut self, event: &str, handler: F) -> Subscription<S>
    where
        F: FnMut(&mut S, &Inbound<'_>) + Send + 'static,
    {
        handlers::register(&self.handlers, event, Box::new(handler))
    }

    /// Remove the handler for `event`
    pub fn off(&mut self, event: &str) -> bool {
        self.handlers.lock().remove(event)
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.lock().contains(event)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Whether a link is currently up
    pub fn is_connected(&self) -> bool {
        self.driver
            .as_ref()
            .is_some_and(|d| d.connected.load(Ordering::Acquire))
    }

    /// Whether signals can still arrive
    pub fn is_active(&self) -> bool {
        self.driver.as_ref().is_some_and(|d| d.signals.is_some())
    }

    /// Connection identifier as of the last dispatched signal
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Wait for the next signal from the driver
    ///
    /// Returns `None` once the driver has stopped and every signal has been
    /// delivered, or when the session is not connected. Cancel-safe.
    pub async fn next_signal(&mut self) -> Option<TransportSignal> {
        let driver = self.driver.as_mut()?;
        let signals = driver.signals.as_mut()?;
        let signal = signals.recv().await;
        if signal.is_none() {
            driver.signals = None;
        }
        signal
    }

    /// Run the handler registered for `signal` against `ctx`
    ///
    /// Returns whether a handler ran.
    pub fn dispatch(&mut self, ctx: &mut S, signal: &TransportSignal) -> bool {
        match signal {
            TransportSignal::Connected { connection_id, .. } => {
                self.connection_id = Some(connection_id.clone());
            }
            TransportSignal::Disconnected { .. } | TransportSignal::ReconnectFailed { .. } => {
                self.connection_id = None;
            }
            _ => {}
        }

        let payload = signal.payload();
        let emitter = self.emitter();
        let inbound = Inbound {
            event: signal.event_name(),
            payload: &payload,
            connection_id: self.connection_id.as_deref(),
            emitter: &emitter,
        };

        let handled = self.handlers.lock().call(inbound.event, ctx, &inbound);
        if !handled {
            match signal {
                TransportSignal::Event(_) => warn!("dropping unhandled event {}", inbound.event),
                _ => debug!("no handler for {}", inbound.event),
            }
        }
        handled
    }
}

impl<S> Drop for TransportSession<S> {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.task.abort();
        }
        if let Some(task) = self.closing.take() {
            task.abort();
        }
    }
}

impl<S> std::fmt::Debug for TransportSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("connected", &self.is_connected())
            .field("connection_id", &self.connection_id)
            .field("active", &self.is_active())
            .finish()
    }
}

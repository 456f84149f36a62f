//! Connection driver
//!
//! Background task that owns the physical link. It connects with a bounded
//! timeout, pumps frames in both directions, and reconnects according to the
//! [`ReconnectConfig`]. Everything it observes is reported as a
//! [`TransportSignal`]; it never touches session state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::link::{Connector, Link, LinkRead};
use super::TransportSignal;
use crate::config::ReconnectConfig;
use crate::error::TransportError;
use crate::protocol::{DisconnectReason, Envelope};

/// How a pumped link came to an end
enum LinkOutcome {
    /// Local shutdown requested, or the session was dropped
    Shutdown,
    ServerClosed,
    Dropped(TransportError),
}

pub(crate) struct Driver {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) config: ReconnectConfig,
    pub(crate) commands: mpsc::UnboundedReceiver<String>,
    pub(crate) signals: mpsc::UnboundedSender<TransportSignal>,
    pub(crate) shutdown: oneshot::Receiver<()>,
    pub(crate) connected: Arc<AtomicBool>,
}

impl Driver {
    pub(crate) async fn run(mut self) {
        debug!("transport driver started");

        let mut failures: u32 = 0;
        let mut ever_connected = false;

        loop {
            let attempt = match self.attempt_connect().await {
                Some(result) => result,
                None => break,
            };

            match attempt {
                Ok(mut link) => {
                    failures = 0;
                    let connection_id = link.connection_id().to_string();
                    info!("connected as {}", connection_id);

                    self.connected.store(true, Ordering::Release);
                    self.signal(TransportSignal::Connected {
                        connection_id,
                        recovered: ever_connected,
                    });
                    ever_connected = true;

                    let outcome = self.pump(link.as_mut()).await;
                    self.connected.store(false, Ordering::Release);

                    match outcome {
                        LinkOutcome::Shutdown => break,
                        LinkOutcome::ServerClosed => {
                            info!("server closed the connection, reconnecting immediately");
                            self.signal(TransportSignal::Disconnected {
                                reason: DisconnectReason::ServerDisconnect,
                                error: None,
                            });
                            continue;
                        }
                        LinkOutcome::Dropped(err) => {
                            warn!("connection lost: {}", err);
                            self.signal(TransportSignal::Disconnected {
                                reason: DisconnectReason::TransportClose,
                                error: Some(err),
                            });
                        }
                    }
                }
                Err(err) => {
                    warn!("connection attempt failed: {}", err);
                    self.signal(TransportSignal::ConnectError(err));
                    failures += 1;
                }
            }

            // A dropped link counts as the first failure of a new retry cycle
            if failures == 0 {
                failures = 1;
            }

            if !self.config.allows_retry(failures) {
                let attempts = failures.saturating_sub(1);
                error!("giving up after {} reconnection attempts", attempts);
                self.signal(TransportSignal::ReconnectFailed { attempts });
                break;
            }

            let delay = self.config.delay_for(failures);
            debug!("reconnect attempt {} in {:?}", failures, delay);
            self.signal(TransportSignal::Reconnecting {
                attempt: failures,
                delay,
            });

            if !self.idle(tokio::time::sleep(delay)).await {
                break;
            }
        }

        debug!("transport driver exited");
    }

    /// One connection attempt under the configured timeout
    ///
    /// Returns `None` when shutdown was requested meanwhile.
    async fn attempt_connect(&mut self) -> Option<Result<Box<dyn Link>, TransportError>> {
        let timeout = self.config.connect_timeout();
        let connector = Arc::clone(&self.connector);
        let attempt = async move {
            match tokio::time::timeout(timeout, connector.connect()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::ConnectTimeout(timeout)),
            }
        };
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => return Some(result),
                _ = &mut self.shutdown => return None,
                cmd = self.commands.recv() => match cmd {
                    Some(_) => debug!("not connected, dropping outbound frame"),
                    None => return None,
                },
            }
        }
    }

    /// Wait for `until` while discarding outbound frames
    ///
    /// Returns `false` when shutdown was requested meanwhile.
    async fn idle(&mut self, until: impl std::future::Future<Output = ()>) -> bool {
        tokio::pin!(until);

        loop {
            tokio::select! {
                _ = &mut until => return true,
                _ = &mut self.shutdown => return false,
                cmd = self.commands.recv() => match cmd {
                    Some(_) => debug!("not connected, dropping outbound frame"),
                    None => return false,
                },
            }
        }
    }

    async fn pump(&mut self, link: &mut dyn Link) -> LinkOutcome {
        loop {
            tokio::select! {
                _ = &mut self.shutdown => {
                    debug!("shutdown requested, closing link");
                    link.close().await;
                    return LinkOutcome::Shutdown;
                }
                cmd = self.commands.recv() => match cmd {
                    Some(frame) => {
                        debug!("sending frame: {}", preview(&frame));
                        if let Err(err) = link.send(frame).await {
                            return LinkOutcome::Dropped(err);
                        }
                    }
                    None => {
                        link.close().await;
                        return LinkOutcome::Shutdown;
                    }
                },
                read = link.recv() => match read {
                    LinkRead::Frame(text) => match Envelope::decode(&text) {
                        Ok(envelope) => self.signal(TransportSignal::Event(envelope)),
                        Err(err) => warn!(
                            "dropping malformed frame: {} - {}",
                            err,
                            preview(&text)
                        ),
                    },
                    LinkRead::ServerClosed => return LinkOutcome::ServerClosed,
                    LinkRead::Dropped(err) => return LinkOutcome::Dropped(err),
                },
            }
        }
    }

    fn signal(&self, signal: TransportSignal) {
        if self.signals.send(signal).is_err() {
            debug!("signal receiver dropped");
        }
    }
}

/// First 100 characters of a frame, for logs
fn preview(frame: &str) -> &str {
    match frame.char_indices().nth(100) {
        Some((end, _)) => &frame[..end],
        None => frame,
    }
}

//! Room session controller
//!
//! [`RoomSession`] owns one transport session and the [`SessionState`] of
//! one room. Phase changes are driven only by transport signals and
//! protocol events; the view requests actions (`request_join`,
//! `send_message`, `leave`) and renders the [`SessionUpdate`]s each
//! dispatched signal produces.
//!
//! ```text
//! Unjoined -> Joining -> Joined -> Disconnected -> Reconnecting -> Joined
//!                |                      |               |
//!                +--------------------> Failed <--------+
//! ```

mod state;

pub use state::{Phase, SessionState, SessionUpdate};
pub(crate) use state::RoomContext;

use tracing::{debug, error, info, warn};

use crate::config::ReconnectConfig;
use crate::error::{ChatError, Result};
use crate::membership;
use crate::messaging::{self, SendOutcome};
use crate::protocol::{events, ConnectErrorInfo, ConnectInfo, DisconnectInfo, ReconnectAttempt, ReconnectFailed};
use crate::room_id::RoomId;
use crate::transport::{Connector, Inbound, Subscription, TransportSession, TransportSignal};
use crate::validation::DisplayName;

/// Controller for a single room
pub struct RoomSession {
    transport: TransportSession<RoomContext>,
    ctx: RoomContext,
    subscriptions: Vec<Subscription<RoomContext>>,
}

impl RoomSession {
    pub fn new(room_id: &str, connector: impl Connector, config: ReconnectConfig) -> Result<Self> {
        let room_id = RoomId::parse(room_id)?;
        Ok(Self {
            transport: TransportSession::new(connector, config),
            ctx: RoomContext::new(room_id),
            subscriptions: Vec::new(),
        })
    }

    /// Session talking to the coordinator at `config.server_url`
    #[cfg(feature = "websocket")]
    pub fn websocket(room_id: &str, config: &crate::config::ClientConfig) -> Result<Self> {
        let connector = crate::transport::ws::WsConnector::new(config.server_url.clone());
        Self::new(room_id, connector, config.reconnect.clone())
    }

    pub fn state(&self) -> &SessionState {
        &self.ctx.state
    }

    pub fn phase(&self) -> Phase {
        self.ctx.state.phase()
    }

    pub fn room_id(&self) -> &RoomId {
        self.ctx.state.room_id()
    }

    /// Connection identifier the coordinator assigned to the current link
    pub fn connection_id(&self) -> Option<&str> {
        self.transport.connection_id()
    }

    /// Whether transport signals can still arrive
    pub fn is_active(&self) -> bool {
        self.transport.is_active()
    }

    /// Validate the display name, then connect and join
    ///
    /// Fails before any network activity when the name is invalid. Only
    /// valid while unjoined; after a failure, [`leave`](Self::leave) first.
    pub fn request_join(&mut self, raw_name: &str) -> Result<()> {
        let name = DisplayName::parse(raw_name)?;

        let phase = self.phase();
        if phase != Phase::Unjoined {
            return Err(ChatError::InvalidPhase {
                phase,
                action: "join",
            });
        }

        self.register_handlers();
        membership::begin_join(&mut self.ctx, name);
        self.transport.connect();
        Ok(())
    }

    /// Send a chat message to the room
    ///
    /// Invalid text is an error. While not joined or not connected the call
    /// does nothing and reports [`SendOutcome::Skipped`].
    pub fn send_message(&mut self, text: &str) -> Result<SendOutcome> {
        let outcome = messaging::send(&self.ctx, &self.transport.emitter(), text)?;
        Ok(outcome)
    }

    /// Tear down the transport and reset to a fresh unjoined state
    ///
    /// Every handler is unregistered before this returns, so no later
    /// inbound event can touch the state. Idempotent.
    pub fn leave(&mut self) {
        self.subscriptions.clear();
        self.transport.disconnect();

        if self.phase() != Phase::Unjoined {
            info!("leaving room {}", self.room_id());
        }
        let room_id = self.ctx.state.room_id().clone();
        self.ctx = RoomContext::new(room_id);
    }

    /// Wait for the link closed by [`leave`](Self::leave) to shut down
    pub async fn closed(&mut self) {
        self.transport.closed().await;
    }

    /// Wait for the next transport signal and apply it
    ///
    /// Returns `None` once no further signal can arrive: before joining,
    /// after [`leave`](Self::leave), or after retries are exhausted.
    /// Cancel-safe.
    pub async fn next_updates(&mut self) -> Option<Vec<SessionUpdate>> {
        let signal = self.transport.next_signal().await?;
        Some(self.handle_signal(&signal))
    }

    /// Apply one transport signal, returning the resulting state changes
    pub fn handle_signal(&mut self, signal: &TransportSignal) -> Vec<SessionUpdate> {
        self.transport.dispatch(&mut self.ctx, signal);
        self.ctx.take_updates()
    }

    /// Drain updates produced by local actions such as `request_join`
    pub fn take_updates(&mut self) -> Vec<SessionUpdate> {
        self.ctx.take_updates()
    }

    /// Install the controller's handlers, replacing any earlier set
    fn register_handlers(&mut self) {
        self.subscriptions.clear();
        let transport = &mut self.transport;
        self.subscriptions = vec![
            transport.on(events::CONNECT, on_connect),
            transport.on(events::DISCONNECT, on_disconnect),
            transport.on(events::CONNECT_ERROR, on_connect_error),
            transport.on(events::RECONNECT_ATTEMPT, on_reconnect_attempt),
            transport.on(events::RECONNECT_FAILED, on_reconnect_failed),
            transport.on(events::USER_JOINED, membership::on_presence_snapshot),
            transport.on(events::USER_ACTIVITY, membership::on_presence_changed),
            transport.on(events::RECEIVE_MESSAGE, messaging::on_chat_message),
        ];
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("room_id", self.room_id())
            .field("phase", &self.phase())
            .field("transport", &self.transport)
            .finish()
    }
}

fn on_connect(ctx: &mut RoomContext, inbound: &Inbound<'_>) {
    let Some(info) = inbound.parse::<ConnectInfo>() else {
        return;
    };
    info!(
        "connected as {}{}",
        info.connection_id,
        if info.recovered { " (reconnect)" } else { "" }
    );

    ctx.set_connected(true);
    ctx.clear_problem();
    // Server-initiated disconnects reconnect without a scheduled retry
    if ctx.state.phase() == Phase::Disconnected {
        ctx.advance(Phase::Reconnecting);
    }
    membership::send_join(ctx, &info.connection_id, inbound.emitter);
}

fn on_disconnect(ctx: &mut RoomContext, inbound: &Inbound<'_>) {
    let Some(info) = inbound.parse::<DisconnectInfo>() else {
        return;
    };
    warn!("disconnected: {}", info.reason);

    ctx.set_connected(false);
    ctx.join_sent_on = None;
    if let Some(err) = info.error {
        ctx.report_problem(err.into());
    }
    if ctx.state.phase() == Phase::Joined {
        ctx.advance(Phase::Disconnected);
    }
}

fn on_connect_error(ctx: &mut RoomContext, inbound: &Inbound<'_>) {
    let Some(info) = inbound.parse::<ConnectErrorInfo>() else {
        return;
    };
    warn!("connection attempt failed: {}", info.error);
    ctx.report_problem(info.error.into());
}

fn on_reconnect_attempt(ctx: &mut RoomContext, inbound: &Inbound<'_>) {
    let Some(attempt) = inbound.parse::<ReconnectAttempt>() else {
        return;
    };
    debug!(
        "reconnect attempt {} in {}ms",
        attempt.attempt, attempt.delay_ms
    );

    ctx.set_reconnect_attempt(Some(attempt.attempt));
    if ctx.state.phase() == Phase::Disconnected {
        ctx.advance(Phase::Reconnecting);
    }
}

fn on_reconnect_failed(ctx: &mut RoomContext, inbound: &Inbound<'_>) {
    let Some(failed) = inbound.parse::<ReconnectFailed>() else {
        return;
    };
    error!("connection failed after {} attempts", failed.attempts);

    ctx.set_connected(false);
    ctx.set_reconnect_attempt(None);
    ctx.report_problem(ChatError::ReconnectExhausted {
        attempts: failed.attempts,
    });
    ctx.advance(Phase::Failed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TransportError, ValidationError};
    use crate::message_log::MessageKind;
    use crate::protocol::Envelope;
    use crate::transport::mock::{MockRemote, MockServer};
    use serde_json::json;
    use std::time::Duration;

    fn fast_config() -> ReconnectConfig {
        ReconnectConfig::default()
            .with_jitter(0.0)
            .with_attempts(2)
            .with_delays(100, 400)
            .with_connect_timeout_ms(1000)
    }

    fn room(server_config: ReconnectConfig) -> (RoomSession, MockServer) {
        let (connector, server) = MockServer::new();
        let session = RoomSession::new("abc12", connector, server_config).unwrap();
        (session, server)
    }

    /// Pump signals until the session reaches `phase`, collecting phases seen
    async fn run_until(session: &mut RoomSession, phase: Phase) -> Vec<Phase> {
        let mut seen = Vec::new();
        while session.phase() != phase {
            let updates = session.next_updates().await.expect("transport stopped early");
            seen.extend(updates.into_iter().filter_map(|u| match u {
                SessionUpdate::Phase(p) => Some(p),
                _ => None,
            }));
        }
        seen
    }

    async fn joined_session() -> (RoomSession, MockServer, MockRemote) {
        let (mut session, server) = room(fast_config());
        let mut remote = server.accept("X");
        session.request_join("Al").unwrap();

        session.next_updates().await.unwrap();
        assert_eq!(remote.next_frame().await.event, events::JOIN_ROOM);
        remote.push(events::USER_JOINED, json!({"userCount": 1}));
        run_until(&mut session, Phase::Joined).await;
        (session, server, remote)
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_room_scenario() {
        let (mut session, server) = room(fast_config());
        let mut remote = server.accept("X");

        session.request_join("  Al ").unwrap();
        assert_eq!(session.phase(), Phase::Joining);
        assert_eq!(session.state().display_name().unwrap().as_str(), "Al");
        assert_eq!(session.take_updates(), vec![SessionUpdate::Phase(Phase::Joining)]);

        let updates = session.next_updates().await.unwrap();
        assert!(updates.contains(&SessionUpdate::Connectivity(true)));
        assert_eq!(
            remote.next_frame().await,
            Envelope::new(events::JOIN_ROOM, json!({"roomId": "abc12", "username": "Al"}))
        );

        remote.push(events::USER_JOINED, json!({"userCount": 1}));
        let updates = session.next_updates().await.unwrap();
        assert_eq!(
            updates,
            vec![SessionUpdate::Phase(Phase::Joined), SessionUpdate::UserCount(1)]
        );
        assert_eq!(session.state().user_count(), 1);
        assert!(session.state().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_name_rejected_before_network() {
        let (mut session, server) = room(fast_config());

        let err = session.request_join("").unwrap_err();
        assert_eq!(err, ChatError::Validation(ValidationError::EmptyName));
        assert_eq!(err.to_string(), "Please enter your name");
        assert_eq!(session.phase(), Phase::Unjoined);
        assert!(!session.is_active());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(server.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_name_rejected() {
        let (mut session, server) = room(fast_config());

        let err = session.request_join(&"a".repeat(25)).unwrap_err();
        assert_eq!(err.to_string(), "Name must be 20 characters or less");
        assert_eq!(session.phase(), Phase::Unjoined);
        assert_eq!(server.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_name_length_bounds() {
        for (name, ok) in [("A", false), ("Al", true), (&"b".repeat(20)[..], true), ("  é ", false)] {
            let (mut session, _server) = room(fast_config());
            assert_eq!(session.request_join(name).is_ok(), ok, "name {name:?}");
        }
    }

    #[test]
    fn test_empty_room_id_rejected() {
        let (connector, _server) = MockServer::new();
        let err = RoomSession::new("  ", connector, fast_config()).unwrap_err();
        assert_eq!(err.to_string(), "Please enter a room ID");
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_twice_is_invalid() {
        let (mut session, _server, _remote) = joined_session().await;
        let err = session.request_join("Al").unwrap_err();
        assert_eq!(
            err,
            ChatError::InvalidPhase {
                phase: Phase::Joined,
                action: "join"
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_message_flagged() {
        let (mut session, _server, mut remote) = joined_session().await;

        assert_eq!(session.send_message("hi"), Ok(SendOutcome::Sent));
        let frame = remote.next_frame().await;
        assert_eq!(frame.data, json!({"message": "hi"}));
        assert!(session.state().messages().is_empty());

        remote.push(
            events::RECEIVE_MESSAGE,
            json!({"id": "m-1", "message": "hi", "sender": "Al", "senderId": "X", "timestamp": 1714566600000u64}),
        );
        let updates = session.next_updates().await.unwrap();
        match &updates[..] {
            [SessionUpdate::Message(message)] => {
                assert!(message.is_own);
                assert_eq!(message.kind, MessageKind::Chat);
                assert_eq!(message.text, "hi");
            }
            other => panic!("unexpected updates {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_follows_arrival_order() {
        let (mut session, _server, mut remote) = joined_session().await;

        remote.push(events::RECEIVE_MESSAGE, json!({"message": "one", "sender": "Bo", "senderId": "Y"}));
        remote.push(events::USER_ACTIVITY, json!({"userCount": 3, "message": "Cy joined the room"}));
        for _ in 0..2 {
            session.next_updates().await.unwrap();
        }

        // Sending leaves the log alone until the coordinator echoes it back
        assert_eq!(session.send_message("mine"), Ok(SendOutcome::Sent));
        assert_eq!(remote.next_frame().await.event, events::SEND_MESSAGE);
        assert_eq!(session.state().messages().len(), 2);

        remote.push(events::RECEIVE_MESSAGE, json!({"message": "two", "sender": "Bo", "senderId": "Y"}));
        session.next_updates().await.unwrap();
        assert_eq!(session.state().messages().len(), 3);

        remote.push(events::RECEIVE_MESSAGE, json!({"message": "mine", "sender": "Al", "senderId": "X"}));
        session.next_updates().await.unwrap();

        let log: Vec<(&str, bool)> = session
            .state()
            .messages()
            .iter()
            .map(|m| (m.text.as_str(), m.is_own))
            .collect();
        assert_eq!(
            log,
            vec![
                ("one", false),
                ("Cy joined the room", false),
                ("two", false),
                ("mine", true)
            ]
        );
        assert_eq!(session.state().user_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_does_not_disturb_join() {
        let (mut session, server) = room(fast_config());
        let mut remote = server.accept("X");
        session.request_join("Al").unwrap();

        session.next_updates().await.unwrap();
        assert_eq!(remote.next_frame().await.event, events::JOIN_ROOM);

        remote.push_raw("garbage{");
        remote.push(events::USER_JOINED, json!({"userCount": 1}));
        let updates = session.next_updates().await.unwrap();

        assert_eq!(
            updates,
            vec![SessionUpdate::Phase(Phase::Joined), SessionUpdate::UserCount(1)]
        );
        assert!(session.state().is_connected());
        assert_eq!(server.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_rejoins_once() {
        let (mut session, server, remote) = joined_session().await;
        let mut second = server.accept("Z");
        remote.drop_link();

        let phases = run_until(&mut session, Phase::Reconnecting).await;
        assert_eq!(phases, vec![Phase::Disconnected, Phase::Reconnecting]);
        assert!(!session.state().is_connected());
        assert!(session.state().last_problem().is_some());

        // Connected on the new link, join re-sent before Joined
        session.next_updates().await.unwrap();
        assert_eq!(session.phase(), Phase::Reconnecting);
        assert_eq!(session.connection_id(), Some("Z"));
        assert!(session.state().last_problem().is_none());
        assert_eq!(
            second.next_frame().await,
            Envelope::new(events::JOIN_ROOM, json!({"roomId": "abc12", "username": "Al"}))
        );

        second.push(events::USER_JOINED, json!({"userCount": 2}));
        let phases = run_until(&mut session, Phase::Joined).await;
        assert_eq!(phases, vec![Phase::Joined]);
        assert!(second.sent_frames().is_empty());
        assert_eq!(server.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_disconnect_rejoins_immediately() {
        let (mut session, server, remote) = joined_session().await;
        let mut second = server.accept("Z");
        remote.close();

        let updates = session.next_updates().await.unwrap();
        assert!(updates.contains(&SessionUpdate::Phase(Phase::Disconnected)));
        assert!(session.state().last_problem().is_none());

        let updates = session.next_updates().await.unwrap();
        assert!(updates.contains(&SessionUpdate::Phase(Phase::Reconnecting)));
        assert_eq!(second.next_frame().await.event, events::JOIN_ROOM);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_is_terminal() {
        let (mut session, server, remote) = joined_session().await;
        for _ in 0..3 {
            server.refuse(TransportError::Connect("refused".to_string()));
        }
        remote.drop_link();

        let phases = run_until(&mut session, Phase::Failed).await;
        assert_eq!(
            phases,
            vec![Phase::Disconnected, Phase::Reconnecting, Phase::Failed]
        );
        assert_eq!(
            session.state().last_problem(),
            Some(&ChatError::ReconnectExhausted { attempts: 2 })
        );
        assert!(session.next_updates().await.is_none());
        assert!(!session.is_active());

        assert_eq!(session.send_message("anyone?"), Ok(SendOutcome::Skipped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_connect_failure() {
        let (mut session, server) = room(ReconnectConfig::disabled());
        server.refuse(TransportError::Connect("refused".to_string()));
        session.request_join("Al").unwrap();

        let phases = run_until(&mut session, Phase::Failed).await;
        assert_eq!(phases, vec![Phase::Joining, Phase::Failed]);
        assert_eq!(
            session.request_join("Al").unwrap_err(),
            ChatError::InvalidPhase {
                phase: Phase::Failed,
                action: "join"
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_skipped_while_joining() {
        let (mut session, _server) = room(fast_config());
        session.request_join("Al").unwrap();
        assert_eq!(session.send_message("hello"), Ok(SendOutcome::Skipped));
        assert_eq!(
            session.send_message(" "),
            Err(ChatError::Validation(ValidationError::EmptyMessage))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_stops_all_mutation() {
        let (mut session, _server, remote) = joined_session().await;
        remote.push(events::USER_ACTIVITY, json!({"userCount": 2, "message": "Bo joined the room"}));

        session.leave();
        assert_eq!(session.phase(), Phase::Unjoined);
        assert!(session.state().messages().is_empty());
        assert!(session.next_updates().await.is_none());

        // A straggling event dispatched by hand finds no handler
        let before = session.state().clone();
        let updates = session.handle_signal(&TransportSignal::Event(Envelope::new(
            events::USER_ACTIVITY,
            json!({"userCount": 5, "message": "Cy joined the room"}),
        )));
        assert!(updates.is_empty());
        assert_eq!(session.state(), &before);

        session.closed().await;
        assert!(remote.closed_by_client());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_is_idempotent_and_allows_rejoin() {
        let (mut session, server, _remote) = joined_session().await;
        session.leave();
        session.leave();
        assert_eq!(session.phase(), Phase::Unjoined);

        let mut again = server.accept("W");
        session.request_join("Al").unwrap();
        session.next_updates().await.unwrap();
        assert_eq!(again.next_frame().await.event, events::JOIN_ROOM);
        again.push(events::USER_JOINED, json!({"userCount": 1}));
        run_until(&mut session, Phase::Joined).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_before_join() {
        let (mut session, _server) = room(fast_config());
        session.leave();
        assert_eq!(session.phase(), Phase::Unjoined);
        assert!(session.next_updates().await.is_none());
    }
}

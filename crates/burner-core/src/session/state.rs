//! Session state and the context handlers mutate

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ChatError;
use crate::message_log::{ChatMessage, MessageLog};
use crate::room_id::RoomId;
use crate::validation::DisplayName;

/// Where a room session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Unjoined,
    Joining,
    Joined,
    Disconnected,
    Reconnecting,
    Failed,
}

impl Phase {
    /// Whether `next` is a declared successor of this phase
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Unjoined, Joining)
                | (Joining, Joined)
                | (Joining, Failed)
                | (Joined, Disconnected)
                | (Disconnected, Reconnecting)
                | (Disconnected, Failed)
                | (Reconnecting, Joined)
                | (Reconnecting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Failed
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Unjoined => "unjoined",
            Phase::Joining => "joining",
            Phase::Joined => "joined",
            Phase::Disconnected => "disconnected",
            Phase::Reconnecting => "reconnecting",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything a room view renders
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    phase: Phase,
    room_id: RoomId,
    display_name: Option<DisplayName>,
    user_count: u32,
    is_connected: bool,
    messages: MessageLog,
    last_problem: Option<ChatError>,
    reconnect_attempt: Option<u32>,
}

impl SessionState {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            phase: Phase::Unjoined,
            room_id,
            display_name: None,
            user_count: 0,
            is_connected: false,
            messages: MessageLog::new(),
            last_problem: None,
            reconnect_attempt: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn display_name(&self) -> Option<&DisplayName> {
        self.display_name.as_ref()
    }

    pub fn user_count(&self) -> u32 {
        self.user_count
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.messages.entries()
    }

    /// Most recent connectivity problem, cleared on a successful connect
    pub fn last_problem(&self) -> Option<&ChatError> {
        self.last_problem.as_ref()
    }

    /// Retry number currently scheduled, if any
    pub fn reconnect_attempt(&self) -> Option<u32> {
        self.reconnect_attempt
    }
}

/// A single change to [`SessionState`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Phase(Phase),
    Connectivity(bool),
    UserCount(u32),
    Message(ChatMessage),
    Problem(ChatError),
}

/// Handler context: the state plus bookkeeping the view never sees
#[derive(Debug)]
pub(crate) struct RoomContext {
    pub(crate) state: SessionState,
    /// Connection the join request was last sent on
    pub(crate) join_sent_on: Option<String>,
    pending: Vec<SessionUpdate>,
}

impl RoomContext {
    pub(crate) fn new(room_id: RoomId) -> Self {
        Self {
            state: SessionState::new(room_id),
            join_sent_on: None,
            pending: Vec::new(),
        }
    }

    /// Move along the state machine, ignoring undeclared edges
    pub(crate) fn advance(&mut self, next: Phase) -> bool {
        let current = self.state.phase;
        if !current.can_transition_to(next) {
            debug!("ignoring phase change {} -> {}", current, next);
            return false;
        }
        info!("room {}: {} -> {}", self.state.room_id, current, next);
        self.state.phase = next;
        self.pending.push(SessionUpdate::Phase(next));
        true
    }

    pub(crate) fn set_display_name(&mut self, name: DisplayName) {
        self.state.display_name = Some(name);
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        if self.state.is_connected != connected {
            self.state.is_connected = connected;
            self.pending.push(SessionUpdate::Connectivity(connected));
        }
    }

    pub(crate) fn set_user_count(&mut self, count: u32) {
        if self.state.user_count != count {
            self.state.user_count = count;
            self.pending.push(SessionUpdate::UserCount(count));
        }
    }

    pub(crate) fn set_reconnect_attempt(&mut self, attempt: Option<u32>) {
        self.state.reconnect_attempt = attempt;
    }

    pub(crate) fn report_problem(&mut self, problem: ChatError) {
        self.state.last_problem = Some(problem.clone());
        self.pending.push(SessionUpdate::Problem(problem));
    }

    pub(crate) fn clear_problem(&mut self) {
        self.state.last_problem = None;
    }

    pub(crate) fn messages_mut(&mut self) -> &mut MessageLog {
        &mut self.state.messages
    }

    pub(crate) fn record_message(&mut self, message: ChatMessage) {
        self.pending.push(SessionUpdate::Message(message));
    }

    pub(crate) fn take_updates(&mut self) -> Vec<SessionUpdate> {
        std::mem::take(&mut self.pending)
    }
}

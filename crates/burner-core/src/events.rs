//! Update Sink Trait
//!
//! Decouples rendering of session updates from the controller. The CLI
//! prints to stdout; tests and headless hosts use [`NoOpSink`].

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde_json::json;

use crate::message_log::{ChatMessage, MessageKind};
use crate::session::{Phase, SessionState, SessionUpdate};

/// Receives every change a room session reports
#[async_trait]
pub trait UpdateSink: Send + Sync {
    /// Render one update; `state` already reflects it
    async fn emit_update(&self, state: &SessionState, update: &SessionUpdate) -> Result<(), String>;

    /// Show a line that is not a state change (command output, hints)
    async fn emit_notice(&self, text: &str) -> Result<(), String>;
}

/// Sink that discards everything
#[derive(Debug, Default, Clone)]
pub struct NoOpSink;

#[async_trait]
impl UpdateSink for NoOpSink {
    async fn emit_update(&self, _state: &SessionState, _update: &SessionUpdate) -> Result<(), String> {
        Ok(())
    }

    async fn emit_notice(&self, _text: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Prints updates to stdout, as chat lines or one JSON object per line
#[derive(Debug, Default, Clone)]
pub struct StdoutSink {
    pub json_output: bool,
}

impl StdoutSink {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }
}

#[async_trait]
impl UpdateSink for StdoutSink {
    async fn emit_update(&self, state: &SessionState, update: &SessionUpdate) -> Result<(), String> {
        if self.json_output {
            let line = serde_json::to_string(&render_json(state, update)).map_err(|e| e.to_string())?;
            println!("{line}");
        } else if let Some(line) = render_text(state, update) {
            println!("{line}");
        }
        Ok(())
    }

    async fn emit_notice(&self, text: &str) -> Result<(), String> {
        if self.json_output {
            println!("{}", json!({"event": "notice", "text": text}));
        } else {
            println!("{text}");
        }
        Ok(())
    }
}

/// Human-readable line for an update, if it deserves one
pub fn render_text(state: &SessionState, update: &SessionUpdate) -> Option<String> {
    match update {
        SessionUpdate::Phase(phase) => match phase {
            Phase::Unjoined => None,
            Phase::Joining => Some(format!("Joining room {}...", state.room_id())),
            Phase::Joined => Some(format!("Joined room {}", state.room_id())),
            Phase::Disconnected => Some("Connection lost, reconnecting...".to_string()),
            Phase::Reconnecting => match state.reconnect_attempt() {
                Some(attempt) => Some(format!("Reconnecting (attempt {attempt})...")),
                None => Some("Reconnecting...".to_string()),
            },
            Phase::Failed => Some("Connection failed. Type /rejoin to try again.".to_string()),
        },
        SessionUpdate::Connectivity(true) => Some("* connected".to_string()),
        SessionUpdate::Connectivity(false) => Some("* disconnected".to_string()),
        SessionUpdate::UserCount(count) => Some(format!("* {}", users_online(*count))),
        SessionUpdate::Message(message) => Some(render_message(message)),
        SessionUpdate::Problem(problem) if problem.is_terminal() => None,
        SessionUpdate::Problem(problem) => Some(format!("! {problem}")),
    }
}

/// JSON object for an update
pub fn render_json(state: &SessionState, update: &SessionUpdate) -> serde_json::Value {
    let room = state.room_id().as_str();
    match update {
        SessionUpdate::Phase(phase) => json!({"event": "phase", "room": room, "phase": phase}),
        SessionUpdate::Connectivity(connected) => {
            json!({"event": "connectivity", "room": room, "connected": connected})
        }
        SessionUpdate::UserCount(count) => {
            json!({"event": "user_count", "room": room, "userCount": count})
        }
        SessionUpdate::Message(message) => {
            json!({"event": "message", "room": room, "message": message})
        }
        SessionUpdate::Problem(problem) => json!({
            "event": "problem",
            "room": room,
            "error": problem.to_string(),
            "terminal": problem.is_terminal(),
        }),
    }
}

fn render_message(message: &ChatMessage) -> String {
    match message.kind {
        MessageKind::System => format!("* {}", message.text),
        MessageKind::Chat => {
            let time = format_clock(&message.sent_at.with_timezone(&Local));
            if message.is_own {
                format!("{time} you: {}", message.text)
            } else {
                let sender = message.sender_display_name.as_deref().unwrap_or("?");
                format!("{time} <{sender}> {}", message.text)
            }
        }
    }
}

fn users_online(count: u32) -> String {
    if count == 1 {
        "1 user online".to_string()
    } else {
        format!("{count} users online")
    }
}

/// Local wall-clock time as HH:MM
pub fn format_clock(at: &DateTime<Local>) -> String {
    at.format("%H:%M").to_string()
}

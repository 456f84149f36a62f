//! Interactive room view
//!
//! Runs a joined room until the user leaves: lines typed on stdin become
//! messages or commands, and every update the session reports is rendered
//! through the sink.

use burner_core::events::UpdateSink;
use burner_core::{DisplayName, Phase, RoomSession, SendOutcome, SessionUpdate};
use tokio::io::{AsyncBufRead, Lines};

/// How the room view ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomExit {
    /// The user quit or input ended
    Left,
    /// The user quit after the connection failed for good
    Failed,
}

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Say(String),
    Who,
    Room,
    Rejoin,
    Quit,
    Help,
    Unknown(String),
    Blank,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Input::Blank;
        }
        if !trimmed.starts_with('/') {
            return Input::Say(line.to_string());
        }

        let command = trimmed.split_whitespace().next().unwrap_or(trimmed);
        match command {
            "/who" => Input::Who,
            "/room" => Input::Room,
            "/rejoin" => Input::Rejoin,
            "/quit" | "/leave" => Input::Quit,
            "/help" => Input::Help,
            other => Input::Unknown(other.to_string()),
        }
    }
}

const HELP: &str = "Commands: /who, /room, /rejoin, /quit (or /leave)";

/// Join the room and run it until the user leaves
pub async fn run_room<R, E>(
    mut session: RoomSession,
    name: DisplayName,
    input: &mut Lines<R>,
    sink: E,
) -> Result<RoomExit, String>
where
    R: AsyncBufRead + Unpin,
    E: UpdateSink,
{
    session.request_join(name.as_str())?;
    let updates = session.take_updates();
    render(&session, updates, &sink).await;

    loop {
        tokio::select! {
            line = input.next_line() => {
                match line {
                    Ok(Some(line)) => match Input::parse(&line) {
                        Input::Say(text) => match session.send_message(&text) {
                            Ok(SendOutcome::Sent) => {}
                            Ok(SendOutcome::Skipped) => {
                                let _ = sink.emit_notice("Not connected, message not sent").await;
                            }
                            Err(e) => {
                                let _ = sink.emit_notice(&e.to_string()).await;
                            }
                        },
                        Input::Who => {
                            let count = session.state().user_count();
                            let _ = sink.emit_notice(&format!("{count} in room")).await;
                        }
                        Input::Room => {
                            let _ = sink.emit_notice(&format!("Room {}", session.room_id())).await;
                        }
                        Input::Rejoin => {
                            session.leave();
                            session.closed().await;
                            session.request_join(name.as_str())?;
                            let updates = session.take_updates();
                            render(&session, updates, &sink).await;
                        }
                        Input::Quit => break,
                        Input::Help => {
                            let _ = sink.emit_notice(HELP).await;
                        }
                        Input::Unknown(command) => {
                            let _ = sink.emit_notice(&format!("Unknown command {command}. {HELP}")).await;
                        }
                        Input::Blank => {}
                    },
                    Ok(None) => {
                        tracing::info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }

            updates = session.next_updates(), if session.is_active() => {
                if let Some(updates) = updates {
                    render(&session, updates, &sink).await;
                }
            }
        }
    }

    let failed = session.phase() == Phase::Failed;
    session.leave();
    session.closed().await;

    Ok(if failed { RoomExit::Failed } else { RoomExit::Left })
}

async fn render<E: UpdateSink>(session: &RoomSession, updates: Vec<SessionUpdate>, sink: &E) {
    for update in &updates {
        if let Err(e) = sink.emit_update(session.state(), update).await {
            tracing::warn!("failed to render update: {}", e);
        }
    }
}

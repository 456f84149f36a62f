//! Message exchange protocol
//!
//! Outgoing text is emitted as `send_message` and never echoed locally.
//! The coordinator stamps sender and time and rebroadcasts to every member,
//! the author included, so all participants see the same order.

use serde::Serialize;
use tracing::debug;

use crate::error::ValidationError;
use crate::protocol::{events, ChatDeliver, ChatSend};
use crate::session::{Phase, RoomContext};
use crate::transport::{Emitter, Inbound};
use crate::validation;

/// Result of a send request that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    /// Handed to the transport
    Sent,
    /// Not joined or not connected; nothing was sent
    Skipped,
}

pub(crate) fn send(
    ctx: &RoomContext,
    emitter: &Emitter,
    raw: &str,
) -> Result<SendOutcome, ValidationError> {
    let text = validation::message_text(raw)?;

    if ctx.state.phase() != Phase::Joined || !ctx.state.is_connected() {
        debug!(
            "not sending while {} (connected: {})",
            ctx.state.phase(),
            ctx.state.is_connected()
        );
        return Ok(SendOutcome::Skipped);
    }

    emitter.emit(
        events::SEND_MESSAGE,
        &ChatSend {
            text: text.to_string(),
        },
    );
    Ok(SendOutcome::Sent)
}

/// `receive_message`: append to the log, attributing authorship
pub(crate) fn on_chat_message(ctx: &mut RoomContext, inbound: &Inbound<'_>) {
    let Some(deliver) = inbound.parse::<ChatDeliver>() else {
        return;
    };
    let is_own = inbound.connection_id == Some(deliver.sender_connection_id.as_str());

    let remote_id = deliver.id.clone();
    match ctx.messages_mut().push_chat(deliver, is_own) {
        Some(message) => {
            let message = message.clone();
            ctx.record_message(message);
        }
        None => debug!("dropping duplicate delivery {:?}", remote_id),
    }
}

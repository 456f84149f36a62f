//! Room membership protocol
//!
//! Joining is a two-step handshake: the transport connects, then the
//! client emits `join_room` with its room id and display name. The
//! coordinator answers with a presence snapshot (`user_joined`) and later
//! broadcasts presence changes (`user_activity`) with a notice for the log.
//!
//! A bare transport reconnect does not restore membership, so the join is
//! re-sent on every fresh connection, at most once per connection id.

use tracing::{debug, info, warn};

use crate::protocol::{events, JoinRequest, PresenceChanged, PresenceSnapshot};
use crate::session::{Phase, RoomContext};
use crate::transport::{Emitter, Inbound};
use crate::validation::DisplayName;

/// Record the display name and enter `Joining`
pub(crate) fn begin_join(ctx: &mut RoomContext, name: DisplayName) {
    info!("joining room {} as {}", ctx.state.room_id(), name);
    ctx.set_display_name(name);
    ctx.join_sent_on = None;
    ctx.advance(Phase::Joining);
}

/// Emit the join request on a freshly connected link
pub(crate) fn send_join(ctx: &mut RoomContext, connection_id: &str, emitter: &Emitter) {
    if !matches!(ctx.state.phase(), Phase::Joining | Phase::Reconnecting) {
        debug!("not joining, phase is {}", ctx.state.phase());
        return;
    }
    if ctx.join_sent_on.as_deref() == Some(connection_id) {
        debug!("join already sent on {}", connection_id);
        return;
    }
    let Some(name) = ctx.state.display_name() else {
        warn!("connected without a display name, not joining");
        return;
    };

    let request = JoinRequest {
        room_id: ctx.state.room_id().to_string(),
        display_name: name.to_string(),
    };
    debug!("sending join for room {} on {}", request.room_id, connection_id);
    emitter.emit(events::JOIN_ROOM, &request);
    ctx.join_sent_on = Some(connection_id.to_string());
}

/// `user_joined`: authoritative count right after the join
pub(crate) fn on_presence_snapshot(ctx: &mut RoomContext, inbound: &Inbound<'_>) {
    let Some(snapshot) = inbound.parse::<PresenceSnapshot>() else {
        return;
    };
    if !matches!(
        ctx.state.phase(),
        Phase::Joining | Phase::Reconnecting | Phase::Joined
    ) {
        debug!("presence snapshot outside a join, ignoring");
        return;
    }

    if ctx.state.phase() != Phase::Joined {
        ctx.advance(Phase::Joined);
        ctx.set_reconnect_attempt(None);
    }
    ctx.set_user_count(snapshot.user_count);
}

/// `user_activity`: someone joined or left
pub(crate) fn on_presence_changed(ctx: &mut RoomContext, inbound: &Inbound<'_>) {
    let Some(change) = inbound.parse::<PresenceChanged>() else {
        return;
    };
    ctx.set_user_count(change.user_count);

    let message = ctx.messages_mut().push_system(change.notice).clone();
    ctx.record_message(message);
}

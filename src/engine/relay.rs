//! SignalingRelay: authenticated per-pair forwarding of opaque negotiation
//! blobs (spec.md §4.4). The blob itself is never parsed or mutated.

use serde_json::Value as JsonValue;
use tracing::warn;

use crate::core::user::{UserId, UserState};
use crate::protocol::{RoomId, ServerMessage};

use super::actor::MatchEngine;

/// Resets `id` to `waiting` and notifies it, used by every relay failure
/// path that requires a requeue (spec.md §4.4, §7 "state inconsistency").
fn reset_to_waiting(engine: &mut MatchEngine, id: UserId) {
    if let Some(room_id) = engine.room_of.get(&id).cloned() {
        super::session_relay::on_room_closing(engine, &room_id, id);
        engine.teardown_room(&room_id);
    }
    engine
        .registry
        .set_state(id, UserState::Waiting, &mut engine.queue);
    engine.push(id, ServerMessage::WaitingForPeer);
}

fn connection_error(engine: &MatchEngine, id: UserId, message: &str) {
    engine.push(
        id,
        ServerMessage::ConnectionError {
            message: message.to_string(),
        },
    );
}

/// `relay(fromId, {roomId, blob})` (spec.md §4.4). The caller
/// (`engine::handlers`) has already checked the per-sender rate limit
/// budget (contract step 4); everything else is validated here in the
/// order the spec lists.
pub fn relay_signal(
    engine: &mut MatchEngine,
    from: UserId,
    room_id: RoomId,
    description: Option<JsonValue>,
    candidate: Option<JsonValue>,
) {
    if room_id.is_empty() {
        // Protocol violation: malformed payload. Silently ignored per
        // spec.md §7 ("Protocol violation... silently ignored with a
        // warn-log; the sender is not disconnected").
        warn!(user = %from, "signal rejected: empty roomId");
        return;
    }

    let sender = match engine.registry.get(from) {
        Some(u) if u.is_matched() => u,
        Some(_) => {
            warn!(user = %from, "signal rejected: sender not matched");
            crate::metrics::RELAY_ERRORS_TOTAL.inc();
            connection_error(engine, from, "you are not currently matched");
            reset_to_waiting(engine, from);
            return;
        }
        None => return,
    };

    let partner_id = match sender.matched_with {
        Some(p) => p,
        None => return,
    };

    let bidirectional_ok = engine
        .registry
        .get(partner_id)
        .map(|p| p.is_matched() && p.matched_with == Some(from))
        .unwrap_or(false);

    if !bidirectional_ok {
        warn!(user = %from, partner = %partner_id, "signal rejected: bidirectional check failed");
        crate::metrics::RELAY_ERRORS_TOTAL.inc();
        connection_error(engine, from, "your partner is no longer reachable");
        // Asymmetry detected: notify and reset both sides (spec.md §4.4).
        if engine.registry.contains(partner_id) {
            connection_error(engine, partner_id, "your partner is no longer reachable");
            reset_to_waiting(engine, partner_id);
        }
        reset_to_waiting(engine, from);
        return;
    }

    if let Some(room) = engine.room_of.get(&from).cloned().and_then(|r| engine.rooms.get_mut(&r)) {
        room.touch();
    }

    engine.push(
        partner_id,
        ServerMessage::Signal {
            room_id,
            description,
            candidate,
        },
    );
}

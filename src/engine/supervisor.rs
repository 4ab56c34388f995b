//! Periodic maintenance tasks (spec.md §4.6): the abandoned-room sweep,
//! stats emission, and idle-game reaping. Each runs on its own
//! `ctx.run_interval` timer owned by `MatchEngine` (see `actor.rs`).

use tracing::{debug, error, info};

use crate::protocol::ServerMessage;

use super::actor::MatchEngine;
use crate::core::room::Room;

/// Whether both of `room`'s participants are still registered and
/// mutually matched to each other. Shared by the sweep and the stats
/// census so "abandoned" means the same thing in both places.
fn room_is_healthy(engine: &MatchEngine, room: &Room) -> bool {
    let (a, b) = room.participants;
    let a_ok = engine
        .registry
        .get(a)
        .map(|u| u.is_matched() && u.matched_with == Some(b))
        .unwrap_or(false);
    let b_ok = engine
        .registry
        .get(b)
        .map(|u| u.is_matched() && u.matched_with == Some(a))
        .unwrap_or(false);
    a_ok && b_ok
}

/// spec.md §4.6.1: any `room_*` entry with fewer than two still-registered,
/// mutually-matched participants is abandoned and must be dropped. Under
/// correct operation `teardown_room` already removes every room as soon as
/// either participant leaves `matched`, so this sweep is a backstop against
/// a missed cleanup path, not the primary removal mechanism (spec.md §5,
/// "abandoned-room sweeper is the ultimate backstop").
pub fn sweep_abandoned_rooms(engine: &mut MatchEngine) {
    let stale: Vec<String> = engine
        .rooms
        .iter()
        .filter(|(_, room)| !room_is_healthy(engine, room))
        .map(|(id, _)| id.clone())
        .collect();

    if stale.is_empty() {
        return;
    }

    for room_id in &stale {
        error!(room = %room_id, "sweeping abandoned room");
        super::session_relay::on_room_closing(engine, room_id, {
            // Either participant id works as the "leaving" side here: both
            // are already inconsistent, so there is no well-defined
            // survivor to protect from a doubled notification.
            engine.rooms.get(room_id).map(|r| r.participants.0).unwrap_or_default()
        });
        engine.teardown_room(room_id);
        crate::metrics::ROOMS_SWEPT_TOTAL.inc();
    }
    crate::metrics::ACTIVE_ROOMS.set(engine.rooms.len() as i64);
}

/// spec.md §4.6.2: CPU/memory/connection-count gauges are kept current
/// incrementally elsewhere; this tick computes the room census (connected
/// users with no room, healthy paired rooms, rooms the sweep would evict,
/// and any other bookkeeping inconsistency) and logs a summary line so
/// operators see activity in the log stream between metrics scrapes.
pub fn emit_stats(engine: &mut MatchEngine) {
    let waiting = engine.queue.size();
    let connected = engine.registry.len();
    let active_games = engine.games.len();

    let (paired_rooms, abandoned): (usize, usize) = engine
        .rooms
        .values()
        .fold((0, 0), |(healthy, stale), room| {
            if room_is_healthy(engine, room) {
                (healthy + 1, stale)
            } else {
                (healthy, stale + 1)
            }
        });
    let user_self_rooms = connected.saturating_sub(engine.room_of.len());
    let other = engine
        .chat_membership
        .values()
        .filter(|room_id| !engine.rooms.contains_key(*room_id))
        .count();

    crate::metrics::ROOM_CENSUS
        .with_label_values(&["user-self-rooms"])
        .set(user_self_rooms as i64);
    crate::metrics::ROOM_CENSUS
        .with_label_values(&["paired-rooms"])
        .set(paired_rooms as i64);
    crate::metrics::ROOM_CENSUS
        .with_label_values(&["abandoned"])
        .set(abandoned as i64);
    crate::metrics::ROOM_CENSUS.with_label_values(&["other"]).set(other as i64);

    debug!(
        connected,
        waiting,
        paired_rooms,
        abandoned,
        user_self_rooms,
        other,
        active_games,
        "supervisor stats tick"
    );
}

/// spec.md §4.6.3: games inactive for more than `game_expiry_ms` are
/// reaped and both players notified with `game-expired`.
pub fn reap_idle_games(engine: &mut MatchEngine) {
    let expiry = std::time::Duration::from_millis(engine.settings.matching.game_expiry_ms);
    let expired: Vec<String> = engine
        .games
        .iter()
        .filter(|(_, g)| g.is_expired(expiry))
        .map(|(id, _)| id.clone())
        .collect();

    for room_id in expired {
        if let Some(game) = engine.games.remove(&room_id) {
            for (player, _) in game.symbols {
                engine.push(player, ServerMessage::GameExpired { room_id: room_id.clone() });
            }
            crate::metrics::GAMES_EXPIRED_TOTAL.inc();
            info!(room = %room_id, "reaped idle game");
        }
    }
    crate::metrics::ACTIVE_GAMES.set(engine.games.len() as i64);
}

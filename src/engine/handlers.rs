use actix::prelude::*;
use tracing::{info, warn};

use crate::core::user::{UserId, UserState};
use crate::protocol::{ClientMessage, ServerMessage};

use super::actor::MatchEngine;
use super::messages::{Connect, Disconnect, Dispatch};
use super::{relay, session_relay};

/// spec.md §4.3.7: previous-match history is only trimmed once a user has
/// been inactive (issued no dispatched command) for this long.
const PREVIOUS_MATCH_AGE_OFF_INACTIVITY: std::time::Duration = std::time::Duration::from_secs(30);

impl Handler<Connect> for MatchEngine {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Context<Self>) {
        self.registry.add(msg.id);
        crate::metrics::CONNECTED_CLIENTS.inc();
        info!(user = %msg.id, ip = %msg.ip, "client connected");
    }
}

impl Handler<Disconnect> for MatchEngine {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Context<Self>) {
        let id = msg.id;
        if let Some(room_id) = self.room_of.get(&id).cloned() {
            session_relay::on_room_closing(self, &room_id, id);
        }
        self.chat_membership.remove(&id);
        self.rate_limiter.remove_user(id);

        let events = self.registry.set_state(id, UserState::Idle, &mut self.queue);
        for event in events {
            if let crate::core::registry::RegistryEvent::PartnerDisconnected { partner, .. } = event {
                self.push(
                    partner,
                    ServerMessage::PeerDisconnected {
                        server_time_ms: Self::server_time_ms(),
                    },
                );
                self.push(partner, ServerMessage::WaitingForPeer);
            }
        }
        if let Some(room_id) = self.room_of.remove(&id) {
            self.teardown_room(&room_id);
        }
        self.registry.remove(id);
        crate::metrics::CONNECTED_CLIENTS.dec();
        crate::metrics::QUEUE_DEPTH.set(self.queue.size() as i64);
        info!(user = %id, "client disconnected");
        self.process_queue();
    }
}

impl Handler<Dispatch> for MatchEngine {
    type Result = ();

    fn handle(&mut self, msg: Dispatch, _ctx: &mut Context<Self>) {
        let from = msg.from;
        if !self.registry.contains(from) {
            return;
        }

        match msg.command {
            ClientMessage::StartSearch => self.handle_start_search(from),
            ClientMessage::Skip => self.handle_skip(from),
            ClientMessage::StopSearch => self.handle_stop_search(from),
            ClientMessage::MatchReady { .. } => { /* client ack only, no effect */ }
            ClientMessage::Signal {
                room_id,
                description,
                candidate,
            } => {
                if self.check_rate_limit(from, "signal") {
                    relay::relay_signal(self, from, room_id, description, candidate);
                }
            }
            ClientMessage::JoinChat { room_id } => {
                if self.check_rate_limit(from, "join-chat") {
                    session_relay::join_chat(self, from, room_id);
                }
            }
            ClientMessage::ChatMessage { room_id, message } => {
                if self.check_rate_limit(from, "chat-message") {
                    session_relay::chat_message(self, from, room_id, message);
                }
            }
            ClientMessage::TypingStart { room_id } => {
                session_relay::typing(self, from, room_id, true);
            }
            ClientMessage::TypingStop { room_id } => {
                session_relay::typing(self, from, room_id, false);
            }
            ClientMessage::GameInvite {
                game,
                settings,
                room_id,
            } => {
                if self.check_rate_limit(from, "game-invite") {
                    session_relay::game_invite(self, from, game, settings, room_id);
                }
            }
            ClientMessage::GameResponse {
                game,
                accepted,
                room_id,
            } => {
                if self.check_rate_limit(from, "game-response") {
                    session_relay::game_response(self, from, game, accepted, room_id);
                }
            }
            ClientMessage::GameAction {
                game,
                action_type,
                data,
                room_id,
            } => {
                if self.check_rate_limit(from, "game-action") {
                    session_relay::game_action(self, from, game, action_type, data, room_id);
                }
            }
            ClientMessage::DebugState => self.handle_debug_state(from),
        }

        if let Some(user) = self.registry.get_mut(from) {
            user.last_active_at = std::time::Instant::now();
        }
    }
}

impl MatchEngine {
    /// spec.md §4.3.7.
    fn handle_start_search(&mut self, id: UserId) {
        let was_matched = self.registry.get(id).map(|u| u.is_matched()).unwrap_or(false);
        if was_matched {
            self.skip_internal(id);
        }

        let should_age_off = self
            .registry
            .get(id)
            .map(|u| u.is_inactive(PREVIOUS_MATCH_AGE_OFF_INACTIVITY))
            .unwrap_or(false);
        if should_age_off {
            if let Some(user) = self.registry.get_mut(id) {
                user.age_off_previous_matches();
            }
        }
        super::matching::recompute_blocked_users(id, &mut self.registry);

        self.registry.set_state(id, UserState::Waiting, &mut self.queue);
        self.push(id, ServerMessage::WaitingForPeer);
        crate::metrics::QUEUE_DEPTH.set(self.queue.size() as i64);
        self.process_queue();
    }

    /// spec.md §4.3.5. Shared by the explicit `skip` command and the
    /// implicit skip `start-search` performs when already matched.
    fn handle_skip(&mut self, id: UserId) {
        let was_matched = self.registry.get(id).map(|u| u.is_matched()).unwrap_or(false);
        if !was_matched {
            return;
        }
        self.skip_internal(id);
        self.registry.set_state(id, UserState::Waiting, &mut self.queue);
        self.push(id, ServerMessage::WaitingForPeer);
        crate::metrics::SKIPS_TOTAL.inc();
        crate::metrics::QUEUE_DEPTH.set(self.queue.size() as i64);
        self.process_queue();
    }

    /// Records the mutual cooldown, tears down the room/game, and drags
    /// the partner back to `waiting`, emitting `peer-skipped` instead of
    /// the generic `peer-disconnected` the registry transition implies.
    fn skip_internal(&mut self, id: UserId) {
        let partner = match self.registry.get(id).and_then(|u| u.matched_with) {
            Some(p) => p,
            None => return,
        };
        let now = std::time::Instant::now();
        if let Some(u) = self.registry.get_mut(id) {
            u.recent_skips.insert(partner, now);
        }
        if let Some(u) = self.registry.get_mut(partner) {
            u.recent_skips.insert(id, now);
        }

        if let Some(room_id) = self.room_of.get(&id).cloned() {
            session_relay::on_room_closing(self, &room_id, id);
            self.teardown_room(&room_id);
        }

        let events = self.registry.set_state(partner, UserState::Waiting, &mut self.queue);
        debug_assert!(
            !events
                .iter()
                .any(|e| matches!(e, crate::core::registry::RegistryEvent::PartnerDisconnected { .. })),
            "partner was already matched with `id`, which is torn down above; set_state must not drag a third party"
        );
        self.push(
            partner,
            ServerMessage::PeerSkipped {
                server_time_ms: Self::server_time_ms(),
            },
        );
        self.push(partner, ServerMessage::WaitingForPeer);
    }

    /// spec.md §4.3.6. Unlike skip, the stopping user is not re-enqueued.
    fn handle_stop_search(&mut self, id: UserId) {
        let was_matched = self.registry.get(id).map(|u| u.is_matched()).unwrap_or(false);
        if was_matched {
            if let Some(room_id) = self.room_of.get(&id).cloned() {
                session_relay::on_room_closing(self, &room_id, id);
                self.teardown_room(&room_id);
            }
        }
        let events = self.registry.set_state(id, UserState::Idle, &mut self.queue);
        for event in events {
            if let crate::core::registry::RegistryEvent::PartnerDisconnected { partner, .. } = event {
                self.push(
                    partner,
                    ServerMessage::PeerDisconnected {
                        server_time_ms: Self::server_time_ms(),
                    },
                );
                self.push(partner, ServerMessage::WaitingForPeer);
            }
        }
        crate::metrics::QUEUE_DEPTH.set(self.queue.size() as i64);
        self.process_queue();
    }

    fn handle_debug_state(&mut self, id: UserId) {
        let info = serde_json::json!({
            "queueDepth": self.queue.size(),
            "activeRooms": self.rooms.len(),
            "activeGames": self.games.len(),
            "connectedClients": self.registry.len(),
            "self": self.registry.get(id).map(|u| serde_json::json!({
                "state": format!("{:?}", u.state),
                "matchedWith": u.matched_with.map(|p| p.to_string()),
                "previousMatches": u.previous_matches.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            })),
        });
        self.push(id, ServerMessage::DebugInfo { info });
    }
}

pub(crate) fn protocol_violation(engine: &MatchEngine, id: UserId, reason: &str) {
    let err = crate::errors::EngineError::ProtocolViolation(reason.to_string());
    warn!(user = %id, reason, "protocol violation");
    crate::metrics::ENGINE_ERRORS_TOTAL.with_label_values(&[err.label()]).inc();
    engine.push(
        id,
        ServerMessage::ConnectionError {
            message: err.client_message(),
        },
    );
}

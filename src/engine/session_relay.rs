//! SessionRelay: chat, game invites, and minimal tic-tac-toe refereeing,
//! all scoped by `roomId` (spec.md §4.5).

use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use crate::core::game::{Game, GameStatus, MoveError, Symbol};
use crate::core::user::UserId;
use crate::protocol::{RoomId, ServerMessage};

use super::actor::MatchEngine;
use super::handlers::protocol_violation;

const REFEREED_GAME: &str = "tic-tac-toe";

/// Resolves the live partner for `from` within `room_id`: the primary path
/// is `matched_with`; if that lookup is unavailable (a race with
/// disconnect), fall back to whichever other participant the room itself
/// still lists (spec.md §4.5, "Game invites" delivery policy).
fn other_in_room(engine: &MatchEngine, from: UserId, room_id: &str) -> Option<UserId> {
    if let Some(partner) = engine.registry.get(from).and_then(|u| u.matched_with) {
        return Some(partner);
    }
    engine.rooms.get(room_id).and_then(|r| r.other(from))
}

/// A room is valid for session traffic from `from` only if `from` is
/// actually a participant of it right now.
fn owns_room(engine: &MatchEngine, from: UserId, room_id: &str) -> bool {
    engine.room_of.get(&from).map(|r| r == room_id).unwrap_or(false)
}

/// spec.md §4.5 "Chat": idempotent per (user, room); joining a different
/// room first leaves the previous one.
pub fn join_chat(engine: &mut MatchEngine, user: UserId, room_id: RoomId) {
    if !owns_room(engine, user, &room_id) {
        protocol_violation(engine, user, "join-chat for a room you are not part of");
        return;
    }
    if engine.chat_membership.get(&user) == Some(&room_id) {
        return; // already joined, idempotent no-op
    }
    engine.chat_membership.insert(user, room_id.clone());
    engine.push(user, ServerMessage::ChatJoined { room_id: room_id.clone() });

    if let Some(partner) = other_in_room(engine, user, &room_id) {
        if engine.chat_membership.get(&partner) == Some(&room_id) {
            // Second participant has now joined; announce the pair is
            // connected (spec.md §4.5, "On second participant join").
            announce_system_message(engine, &room_id, user, partner);
        }
    }
}

fn announce_system_message(engine: &mut MatchEngine, room_id: &str, a: UserId, b: UserId) {
    let text = "You are now connected. Say hello!";
    for recipient in [a, b] {
        engine.push(
            recipient,
            ServerMessage::ChatMessage {
                room_id: room_id.to_string(),
                id: Uuid::new_v4().to_string(),
                sender_id: "system".to_string(),
                content: text.to_string(),
                is_system: Some(true),
            },
        );
    }
}

pub fn chat_message(engine: &mut MatchEngine, from: UserId, room_id: RoomId, message: String) {
    if !owns_room(engine, from, &room_id) {
        protocol_violation(engine, from, "chat-message for a room you are not part of");
        return;
    }
    let partner = match other_in_room(engine, from, &room_id) {
        Some(p) => p,
        None => return,
    };
    if let Some(room) = engine.rooms.get_mut(&room_id) {
        room.touch();
    }
    engine.push(
        partner,
        ServerMessage::ChatMessage {
            room_id,
            id: Uuid::new_v4().to_string(),
            sender_id: from.to_string(),
            content: message,
            is_system: None,
        },
    );
}

pub fn typing(engine: &mut MatchEngine, from: UserId, room_id: RoomId, is_start: bool) {
    if !owns_room(engine, from, &room_id) {
        return;
    }
    let Some(partner) = other_in_room(engine, from, &room_id) else {
        return;
    };
    let msg = if is_start {
        ServerMessage::TypingStart { room_id }
    } else {
        ServerMessage::TypingStop { room_id }
    };
    engine.push(partner, msg);
}

fn resolve_room(engine: &MatchEngine, from: UserId, room_id: Option<RoomId>) -> Option<RoomId> {
    match room_id {
        Some(r) if owns_room(engine, from, &r) => Some(r),
        Some(_) => None,
        None => engine.room_of.get(&from).cloned(),
    }
}

/// spec.md §4.5 "Game invites": delivered only to the other participant,
/// never echoed back to the sender.
pub fn game_invite(
    engine: &mut MatchEngine,
    from: UserId,
    game: String,
    settings: JsonValue,
    room_id: Option<RoomId>,
) {
    let Some(room_id) = resolve_room(engine, from, room_id) else {
        protocol_violation(engine, from, "game-invite outside of an active room");
        return;
    };
    let Some(partner) = other_in_room(engine, from, &room_id) else {
        return;
    };
    engine.push(partner, ServerMessage::GameInvite { room_id, game, settings });
}

pub fn game_response(
    engine: &mut MatchEngine,
    from: UserId,
    game: String,
    accepted: bool,
    room_id: Option<RoomId>,
) {
    let Some(room_id) = resolve_room(engine, from, room_id) else {
        protocol_violation(engine, from, "game-response outside of an active room");
        return;
    };
    let Some(partner) = other_in_room(engine, from, &room_id) else {
        return;
    };
    engine.push(
        partner,
        ServerMessage::GameResponse {
            room_id: room_id.clone(),
            game: game.clone(),
            accepted,
        },
    );

    if accepted && game == REFEREED_GAME {
        match engine.games.get_mut(&room_id) {
            // A completed game already exists for this room: this response
            // is a rematch, so reset it in place rather than reassigning
            // symbols at random (spec.md §4.5, "Reset for rematch").
            Some(existing) if existing.status == GameStatus::Completed => {
                existing.reset_for_rematch();
                let symbols = existing.symbols;
                let current_turn = existing.current_turn;
                for (player, symbol) in symbols {
                    engine.push(
                        player,
                        ServerMessage::GameStarted {
                            room_id: room_id.clone(),
                            symbol: format!("{:?}", symbol),
                            first_turn: symbol == current_turn,
                        },
                    );
                }
            }
            _ => start_game(engine, &room_id, from, partner),
        }
    }
}

/// spec.md §4.5 "Minimal game refereeing": creates the `Game`, randomly
/// assigns X/O, and notifies both players of their symbol and move order.
fn start_game(engine: &mut MatchEngine, room_id: &str, inviter: UserId, responder: UserId) {
    let game = Game::new(room_id.to_string(), inviter, responder, &mut engine.rng);
    for (player, symbol) in game.symbols {
        engine.push(
            player,
            ServerMessage::GameStarted {
                room_id: room_id.to_string(),
                symbol: format!("{:?}", symbol),
                first_turn: symbol == game.current_turn,
            },
        );
    }
    engine.games.insert(room_id.to_string(), game);
    crate::metrics::ACTIVE_GAMES.set(engine.games.len() as i64);
}

/// spec.md §4.5 "game-action": `tic-tac-toe` moves are refereed in-process;
/// every other game name is forwarded verbatim (spec.md §4.5, last line).
pub fn game_action(
    engine: &mut MatchEngine,
    from: UserId,
    game: String,
    action_type: String,
    data: JsonValue,
    room_id: Option<RoomId>,
) {
    let Some(room_id) = resolve_room(engine, from, room_id) else {
        protocol_violation(engine, from, "game-action outside of an active room");
        return;
    };

    if game != REFEREED_GAME {
        if let Some(partner) = other_in_room(engine, from, &room_id) {
            engine.push(
                partner,
                ServerMessage::GameAction {
                    room_id,
                    game,
                    action_type,
                    data,
                },
            );
        }
        return;
    }

    if action_type != "move" {
        return;
    }
    let Some(position) = data.get("position").and_then(JsonValue::as_u64) else {
        warn!(user = %from, "game-action move missing numeric position");
        return;
    };

    apply_move(engine, &room_id, from, position as usize);
}

fn apply_move(engine: &mut MatchEngine, room_id: &str, from: UserId, position: usize) {
    let Some(game) = engine.games.get_mut(room_id) else {
        return;
    };
    match game.apply_move(from, position) {
        Ok(outcome) => {
            let symbol = game.symbol_for(from).expect("validated by apply_move");
            let next_turn = format!("{:?}", game.current_turn);
            let board: Vec<Option<String>> = game
                .board
                .iter()
                .map(|cell| cell.map(|s| format!("{:?}", s)))
                .collect();
            let players: Vec<UserId> = game.symbols.iter().map(|(id, _)| *id).collect();

            for player in &players {
                engine.push(
                    *player,
                    ServerMessage::GameMove {
                        room_id: room_id.to_string(),
                        position,
                        symbol: format!("{:?}", symbol),
                        next_turn: next_turn.clone(),
                    },
                );
            }

            if outcome.status == GameStatus::Completed {
                let winner = outcome.winner.map(|s| format!("{:?}", s));
                for player in &players {
                    engine.push(
                        *player,
                        ServerMessage::GameEnded {
                            room_id: room_id.to_string(),
                            winner: winner.clone(),
                            is_draw: outcome.is_draw,
                            board: board.clone(),
                        },
                    );
                }
                // Kept in `engine.games` rather than removed: a completed
                // game waits here for either a rematch (`game_response`
                // resets it in place) or the idle-game reap to collect it.
            }
        }
        Err(err) => {
            // Protocol violations from an otherwise-valid participant are
            // silently ignored per spec.md §7; the board simply doesn't
            // advance.
            match err {
                MoveError::UnknownPlayer => {
                    protocol_violation(engine, from, "move for a game you are not playing")
                }
                other => warn!(user = %from, room = room_id, error = %other, "rejected move"),
            }
        }
    }
}

/// Ends whatever chat/game state a room had and notifies the participant
/// who is *not* the one leaving (spec.md §4.5 "Cancel / partner
/// disconnect"). Called before the room itself is torn down.
pub fn on_room_closing(engine: &mut MatchEngine, room_id: &str, leaving: UserId) {
    if let Some(game) = engine.games.remove(room_id) {
        if let Some(opponent) = game.opponent_of(leaving) {
            let board: Vec<Option<String>> = game
                .board
                .iter()
                .map(|cell| cell.map(|s| format!("{:?}", s)))
                .collect();
            engine.push(
                opponent,
                ServerMessage::GameEnded {
                    room_id: room_id.to_string(),
                    winner: None,
                    is_draw: false,
                    board,
                },
            );
        }
        crate::metrics::ACTIVE_GAMES.set(engine.games.len() as i64);
    }

    if engine.chat_membership.get(&leaving) == Some(&room_id.to_string()) {
        if let Some(room) = engine.rooms.get(room_id) {
            if let Some(partner) = room.other(leaving) {
                if engine.registry.contains(partner) {
                    engine.push(partner, ServerMessage::ChatUserLeft { room_id: room_id.to_string() });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::room::{Room, RoomIdGenerator};
    use crate::core::user::UserState;
    use crate::transport::registry::ConnectionRegistry;
    use actix::Actor;

    fn engine() -> MatchEngine {
        let settings = std::sync::Arc::new(crate::env::Settings::test_default());
        let connections = ConnectionRegistry::new().start();
        MatchEngine::new(settings, connections)
    }

    fn matched_pair(engine: &mut MatchEngine) -> (UserId, UserId, RoomId) {
        let a = UserId::new_v4();
        let b = UserId::new_v4();
        engine.registry.add(a);
        engine.registry.add(b);
        engine.registry.set_state(a, UserState::Matched, &mut engine.queue);
        engine.registry.set_state(b, UserState::Matched, &mut engine.queue);
        engine.registry.get_mut(a).unwrap().matched_with = Some(b);
        engine.registry.get_mut(b).unwrap().matched_with = Some(a);
        let room_id = RoomIdGenerator::new().next();
        engine.rooms.insert(room_id.clone(), Room::new(room_id.clone(), a, b, a));
        engine.room_of.insert(a, room_id.clone());
        engine.room_of.insert(b, room_id.clone());
        (a, b, room_id)
    }

    #[actix::test]
    async fn join_chat_is_idempotent_and_announces_on_second_join() {
        let mut engine = engine();
        let (a, b, room) = matched_pair(&mut engine);
        join_chat(&mut engine, a, room.clone());
        assert_eq!(engine.chat_membership.get(&a), Some(&room));
        join_chat(&mut engine, a, room.clone());
        assert_eq!(engine.chat_membership.len(), 1);
        join_chat(&mut engine, b, room.clone());
        assert_eq!(engine.chat_membership.len(), 2);
    }

    #[actix::test]
    async fn refereed_game_alternates_turns_and_detects_a_win() {
        let mut engine = engine();
        let (a, b, room) = matched_pair(&mut engine);
        game_response(&mut engine, b, REFEREED_GAME.to_string(), true, Some(room.clone()));
        assert!(engine.games.contains_key(&room));

        let game = engine.games.get(&room).unwrap();
        let (first, second) = if game.symbol_for(a) == Some(game.current_turn) {
            (a, b)
        } else {
            (b, a)
        };

        apply_move(&mut engine, &room, first, 0);
        apply_move(&mut engine, &room, second, 3);
        apply_move(&mut engine, &room, first, 1);
        apply_move(&mut engine, &room, second, 4);
        apply_move(&mut engine, &room, first, 2);

        // The completed game lingers (rather than being removed) so a
        // follow-up `game-response{accepted:true}` can reset it in place.
        let finished = engine.games.get(&room).unwrap();
        assert_eq!(finished.status, GameStatus::Completed);
        assert_eq!(finished.winner, Some(finished.symbol_for(first).unwrap()));
    }

    #[actix::test]
    async fn rematch_resets_completed_game_in_place_instead_of_replacing_it() {
        let mut engine = engine();
        let (a, b, room) = matched_pair(&mut engine);
        game_response(&mut engine, b, REFEREED_GAME.to_string(), true, Some(room.clone()));

        let game = engine.games.get(&room).unwrap();
        let (first, second) = if game.symbol_for(a) == Some(game.current_turn) {
            (a, b)
        } else {
            (b, a)
        };
        apply_move(&mut engine, &room, first, 0);
        apply_move(&mut engine, &room, second, 3);
        apply_move(&mut engine, &room, first, 1);
        apply_move(&mut engine, &room, second, 4);
        apply_move(&mut engine, &room, first, 2);
        assert_eq!(engine.games.get(&room).unwrap().status, GameStatus::Completed);

        let prior_symbol_first = engine.games.get(&room).unwrap().symbol_for(first).unwrap();
        game_response(&mut engine, b, REFEREED_GAME.to_string(), true, Some(room.clone()));

        let rematch = engine.games.get(&room).unwrap();
        assert_eq!(rematch.status, GameStatus::Playing);
        assert_eq!(rematch.current_turn, Symbol::X);
        assert!(rematch.board.iter().all(Option::is_none));
        assert_eq!(rematch.symbol_for(first), Some(prior_symbol_first.other()));
    }

    #[actix::test]
    async fn on_room_closing_ends_active_game_for_opponent() {
        let mut engine = engine();
        let (a, b, room) = matched_pair(&mut engine);
        game_response(&mut engine, b, REFEREED_GAME.to_string(), true, Some(room.clone()));
        assert!(engine.games.contains_key(&room));
        on_room_closing(&mut engine, &room, a);
        assert!(!engine.games.contains_key(&room));
        let _ = b;
    }
}

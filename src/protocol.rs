//! Wire-level typed commands and events (spec.md §6.1). One tagged union
//! per direction, mirroring the teacher's `protocol.rs` `ClientMessage` /
//! `ServerMessage` split; `ServerMessage` is additionally an actix
//! `Message` so the engine can hand one straight to a `Session` actor.

use actix::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub type RoomId = String;

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    StartSearch,
    Skip,
    StopSearch,
    Signal {
        room_id: RoomId,
        #[serde(default)]
        description: Option<JsonValue>,
        #[serde(default)]
        candidate: Option<JsonValue>,
    },
    /// Client acknowledgement of `match-ready`; carries no server effect.
    MatchReady {
        match_id: String,
    },
    JoinChat {
        room_id: RoomId,
    },
    ChatMessage {
        room_id: RoomId,
        message: String,
    },
    TypingStart {
        room_id: RoomId,
    },
    TypingStop {
        room_id: RoomId,
    },
    GameInvite {
        game: String,
        settings: JsonValue,
        #[serde(default)]
        room_id: Option<RoomId>,
    },
    GameResponse {
        game: String,
        accepted: bool,
        #[serde(default)]
        room_id: Option<RoomId>,
    },
    GameAction {
        game: String,
        #[serde(rename = "type")]
        action_type: String,
        data: JsonValue,
        #[serde(default)]
        room_id: Option<RoomId>,
    },
    DebugState,
}

#[derive(Message, Serialize, Debug, Clone)]
#[rtype(result = "()")]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    WaitingForPeer,
    MatchReady {
        room_id: RoomId,
        is_initiator: bool,
        peer_id: String,
        server_time_ms: i64,
    },
    PeerDisconnected {
        server_time_ms: i64,
    },
    PeerSkipped {
        server_time_ms: i64,
    },
    ConnectionError {
        message: String,
    },
    Signal {
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<JsonValue>,
        #[serde(skip_serializing_if = "Option::is_none")]
        candidate: Option<JsonValue>,
    },
    ChatJoined {
        room_id: RoomId,
    },
    ChatMessage {
        room_id: RoomId,
        id: String,
        sender_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_system: Option<bool>,
    },
    ChatUserLeft {
        room_id: RoomId,
    },
    TypingStart {
        room_id: RoomId,
    },
    TypingStop {
        room_id: RoomId,
    },
    GameInvite {
        room_id: RoomId,
        game: String,
        settings: JsonValue,
    },
    GameResponse {
        room_id: RoomId,
        game: String,
        accepted: bool,
    },
    GameAction {
        room_id: RoomId,
        game: String,
        #[serde(rename = "type")]
        action_type: String,
        data: JsonValue,
    },
    GameStarted {
        room_id: RoomId,
        symbol: String,
        first_turn: bool,
    },
    GameMove {
        room_id: RoomId,
        position: usize,
        symbol: String,
        next_turn: String,
    },
    GameEnded {
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<String>,
        is_draw: bool,
        board: Vec<Option<String>>,
    },
    GameExpired {
        room_id: RoomId,
    },
    DebugInfo {
        info: JsonValue,
    },
}

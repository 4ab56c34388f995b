//! End-to-end scenario tests (spec.md §8.2), driving the real `MatchEngine`
//! actor the way a `Session` transport adapter would: `Connect` on join,
//! `Dispatch` per client command, and a `Collector` standing in for each
//! user's websocket to record every `ServerMessage` pushed to them.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix::prelude::*;

use match_server::core::user::UserId;
use match_server::engine::messages::{Connect, Dispatch};
use match_server::engine::MatchEngine;
use match_server::env::Settings;
use match_server::protocol::{ClientMessage, ServerMessage};
use match_server::transport::registry::{ConnectionRegistry, Register};

struct Collector {
    received: Arc<Mutex<Vec<ServerMessage>>>,
}

impl Actor for Collector {
    type Context = Context<Self>;
}

impl Handler<ServerMessage> for Collector {
    type Result = ();
    fn handle(&mut self, msg: ServerMessage, _ctx: &mut Context<Self>) {
        self.received.lock().unwrap().push(msg);
    }
}

struct TestUser {
    id: UserId,
    inbox: Arc<Mutex<Vec<ServerMessage>>>,
}

async fn spawn_user(engine: &Addr<MatchEngine>, connections: &Addr<ConnectionRegistry>) -> TestUser {
    let id = UserId::new_v4();
    let inbox = Arc::new(Mutex::new(Vec::new()));
    let collector = Collector { received: inbox.clone() }.start();
    connections
        .send(Register { id, addr: collector.recipient() })
        .await
        .unwrap();
    engine
        .send(Connect { id, ip: "127.0.0.1".parse::<IpAddr>().unwrap() })
        .await
        .unwrap();
    TestUser { id, inbox }
}

async fn dispatch(engine: &Addr<MatchEngine>, from: UserId, command: ClientMessage) {
    engine.send(Dispatch { from, command }).await.unwrap();
    // Outbound pushes go through ConnectionRegistry's own mailbox
    // (`push` -> `do_send(Forward{..})`), one hop behind the `Dispatch`
    // future resolving; give it a beat to land in the collector.
    tokio::time::sleep(Duration::from_millis(20)).await;
}

fn messages_of(user: &TestUser) -> Vec<ServerMessage> {
    user.inbox.lock().unwrap().clone()
}

/// Returns the most recent `match-ready`, since a user can be matched more
/// than once over the life of a test and only the latest pairing is live.
fn contains_match_ready(msgs: &[ServerMessage]) -> Option<(String, bool, String)> {
    msgs.iter().rev().find_map(|m| match m {
        ServerMessage::MatchReady { room_id, is_initiator, peer_id, .. } => {
            Some((room_id.clone(), *is_initiator, peer_id.clone()))
        }
        _ => None,
    })
}

fn setup() -> (Addr<MatchEngine>, Addr<ConnectionRegistry>) {
    let settings = Arc::new(Settings::test_default());
    let connections = ConnectionRegistry::new().start();
    let engine = MatchEngine::new(settings, connections.clone()).start();
    (engine, connections)
}

/// Scenario 1: two-user happy path.
#[actix::test]
async fn two_user_happy_path() {
    let (engine, connections) = setup();
    let a = spawn_user(&engine, &connections).await;
    let b = spawn_user(&engine, &connections).await;

    dispatch(&engine, a.id, ClientMessage::StartSearch).await;
    dispatch(&engine, b.id, ClientMessage::StartSearch).await;

    let a_msgs = messages_of(&a);
    let b_msgs = messages_of(&b);
    let (room_a, a_is_initiator, a_peer) = contains_match_ready(&a_msgs).expect("A must be matched");
    let (room_b, b_is_initiator, b_peer) = contains_match_ready(&b_msgs).expect("B must be matched");

    assert_eq!(room_a, room_b, "both sides must agree on the room id");
    assert_ne!(a_is_initiator, b_is_initiator, "exactly one side is the initiator");
    assert_eq!(a_peer, b.id.to_string());
    assert_eq!(b_peer, a.id.to_string());

    dispatch(
        &engine,
        a.id,
        ClientMessage::Signal { room_id: room_a.clone(), description: Some(serde_json::json!({"sdp": "offer"})), candidate: None },
    )
    .await;
    let b_signal = messages_of(&b)
        .into_iter()
        .find(|m| matches!(m, ServerMessage::Signal { .. }))
        .expect("B must receive the forwarded signal");
    assert!(matches!(b_signal, ServerMessage::Signal { room_id, .. } if room_id == room_a));

    dispatch(&engine, a.id, ClientMessage::JoinChat { room_id: room_a.clone() }).await;
    dispatch(&engine, b.id, ClientMessage::JoinChat { room_id: room_a.clone() }).await;
    dispatch(&engine, a.id, ClientMessage::ChatMessage { room_id: room_a.clone(), message: "hi".into() }).await;
    dispatch(&engine, b.id, ClientMessage::ChatMessage { room_id: room_a, message: "hey".into() }).await;

    let a_chat_from_b = messages_of(&a)
        .into_iter()
        .any(|m| matches!(m, ServerMessage::ChatMessage { content, .. } if content == "hey"));
    let b_chat_from_a = messages_of(&b)
        .into_iter()
        .any(|m| matches!(m, ServerMessage::ChatMessage { content, .. } if content == "hi"));
    assert!(a_chat_from_b, "A must see B's chat message");
    assert!(b_chat_from_a, "B must see A's chat message");
}

/// Scenario 2: skip, then steady-state (still inside the cooldown window).
#[actix::test]
async fn skip_then_steady_state_within_cooldown() {
    let (engine, connections) = setup();
    let a = spawn_user(&engine, &connections).await;
    let b = spawn_user(&engine, &connections).await;

    dispatch(&engine, a.id, ClientMessage::StartSearch).await;
    dispatch(&engine, b.id, ClientMessage::StartSearch).await;
    assert!(contains_match_ready(&messages_of(&a)).is_some());

    dispatch(&engine, a.id, ClientMessage::Skip).await;

    let b_msgs = messages_of(&b);
    assert!(b_msgs.iter().any(|m| matches!(m, ServerMessage::PeerSkipped { .. })));
    assert!(b_msgs.iter().any(|m| matches!(m, ServerMessage::WaitingForPeer)));

    // Within the default 60s cooldown, a fresh scan must not re-pair them.
    let a_rematch_count = messages_of(&a).iter().filter(|m| matches!(m, ServerMessage::MatchReady { .. })).count();
    let b_rematch_count = messages_of(&b).iter().filter(|m| matches!(m, ServerMessage::MatchReady { .. })).count();
    assert_eq!(a_rematch_count, 1, "A must not be rematched to B inside the cooldown");
    assert_eq!(b_rematch_count, 1, "B must not be rematched to A inside the cooldown");
}

/// Scenario 3: three-user rotation after a stop-search.
#[actix::test]
async fn three_user_rotation_after_stop_search() {
    let (engine, connections) = setup();
    let a = spawn_user(&engine, &connections).await;
    let b = spawn_user(&engine, &connections).await;

    dispatch(&engine, a.id, ClientMessage::StartSearch).await;
    dispatch(&engine, b.id, ClientMessage::StartSearch).await;
    assert!(contains_match_ready(&messages_of(&a)).is_some());

    let c = spawn_user(&engine, &connections).await;
    dispatch(&engine, c.id, ClientMessage::StartSearch).await;
    assert!(
        messages_of(&c).iter().any(|m| matches!(m, ServerMessage::WaitingForPeer)),
        "C must be waiting while A and B are matched"
    );

    dispatch(&engine, b.id, ClientMessage::StopSearch).await;

    let a_msgs = messages_of(&a);
    assert!(a_msgs.iter().any(|m| matches!(m, ServerMessage::PeerDisconnected { .. })));
    assert!(a_msgs.iter().any(|m| matches!(m, ServerMessage::WaitingForPeer)));

    let (_, _, a_peer) = contains_match_ready(&messages_of(&a)).expect("A must be rematched, to C");
    assert_eq!(a_peer, c.id.to_string(), "A's fresh partner must be C, never previously matched");
}

/// Scenario 4: interception attempt — C is stale in the queue with
/// `previousMatches={A}`; once A has moved on to a fresh match with B, D
/// joining must pair with C rather than leaving C stuck behind A and B.
#[actix::test]
async fn interception_attempt_is_rejected() {
    let (engine, connections) = setup();
    let a = spawn_user(&engine, &connections).await;
    let c = spawn_user(&engine, &connections).await;

    // A and C match first, establishing previousMatches={A} for C, then
    // C skips — both return to waiting under a mutual cooldown, so they
    // cannot be silently re-paired with each other below.
    dispatch(&engine, a.id, ClientMessage::StartSearch).await;
    dispatch(&engine, c.id, ClientMessage::StartSearch).await;
    assert!(contains_match_ready(&messages_of(&a)).is_some());
    dispatch(&engine, c.id, ClientMessage::Skip).await;

    // B joins; the cooldown keeps A away from C, so A pairs with B instead.
    let b = spawn_user(&engine, &connections).await;
    dispatch(&engine, b.id, ClientMessage::StartSearch).await;
    let (_, _, a_peer) = contains_match_ready(&messages_of(&a)).expect("A must be rematched, to B");
    assert_eq!(a_peer, b.id.to_string());
    assert!(
        contains_match_ready(&messages_of(&c)).is_none(),
        "C must still be waiting, alone, with A and B now matched to each other"
    );

    // D joins. A and B are no longer in the queue at all; C is the only
    // eligible candidate left, so C and D must be paired.
    let d = spawn_user(&engine, &connections).await;
    dispatch(&engine, d.id, ClientMessage::StartSearch).await;

    let (_, _, c_peer) = contains_match_ready(&messages_of(&c)).expect("C must be matched with D");
    assert_eq!(c_peer, d.id.to_string());
    let (_, _, d_peer) = contains_match_ready(&messages_of(&d)).expect("D must be matched with C");
    assert_eq!(d_peer, c.id.to_string());
}

/// Scenario 5: partner disconnect observed by a subsequent signal attempt.
#[actix::test]
async fn signal_after_partner_disconnect_resets_sender() {
    let (engine, connections) = setup();
    let a = spawn_user(&engine, &connections).await;
    let b = spawn_user(&engine, &connections).await;
    dispatch(&engine, a.id, ClientMessage::StartSearch).await;
    dispatch(&engine, b.id, ClientMessage::StartSearch).await;
    let (room_id, _, _) = contains_match_ready(&messages_of(&a)).expect("A and B must be matched");

    // B's transport disconnects without an explicit `stop-search`.
    engine
        .send(match_server::engine::messages::Disconnect { id: b.id })
        .await
        .unwrap();

    dispatch(&engine, a.id, ClientMessage::Signal { room_id, description: None, candidate: Some(serde_json::json!({"c": 1})) }).await;

    let a_msgs = messages_of(&a);
    assert!(a_msgs.iter().any(|m| matches!(m, ServerMessage::ConnectionError { .. })));
    assert!(a_msgs.iter().any(|m| matches!(m, ServerMessage::WaitingForPeer)));
    assert!(
        !a_msgs.iter().any(|m| matches!(m, ServerMessage::Signal { .. })),
        "no signal should ever be echoed back to the sender"
    );
}

/// Scenario 6: a complete refereed tic-tac-toe game.
#[actix::test]
async fn tic_tac_toe_complete_game_ends_with_a_winner() {
    let (engine, connections) = setup();
    let a = spawn_user(&engine, &connections).await;
    let b = spawn_user(&engine, &connections).await;
    dispatch(&engine, a.id, ClientMessage::StartSearch).await;
    dispatch(&engine, b.id, ClientMessage::StartSearch).await;
    let (room_id, _, _) = contains_match_ready(&messages_of(&a)).expect("A and B must be matched");

    dispatch(
        &engine,
        a.id,
        ClientMessage::GameInvite { game: "tic-tac-toe".into(), settings: serde_json::json!({}), room_id: Some(room_id.clone()) },
    )
    .await;
    dispatch(
        &engine,
        b.id,
        ClientMessage::GameResponse { game: "tic-tac-toe".into(), accepted: true, room_id: Some(room_id.clone()) },
    )
    .await;

    let a_started = messages_of(&a)
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::GameStarted { symbol, first_turn, .. } => Some((symbol, first_turn)),
            _ => None,
        })
        .expect("A must receive game-started");
    let (first, second) = if a_started.1 { (a.id, b.id) } else { (b.id, a.id) };

    let moves = [(first, 0usize), (second, 4), (first, 1), (second, 3), (first, 2)];
    for (player, position) in moves {
        dispatch(
            &engine,
            player,
            ClientMessage::GameAction {
                game: "tic-tac-toe".into(),
                action_type: "move".into(),
                data: serde_json::json!({ "position": position }),
                room_id: Some(room_id.clone()),
            },
        )
        .await;
    }

    let a_ended = messages_of(&a)
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::GameEnded { winner, is_draw, board, .. } => Some((winner, is_draw, board)),
            _ => None,
        })
        .expect("A must receive game-ended");
    assert!(!a_ended.1, "this sequence is a win, not a draw");
    assert!(a_ended.0.is_some(), "a winner must be reported");

    let winner_symbol = a_ended.0.unwrap();
    let expected_board: Vec<Option<String>> = vec![
        Some(winner_symbol.clone()),
        Some(winner_symbol.clone()),
        Some(winner_symbol.clone()),
        a_ended.2[3].clone(),
        a_ended.2[4].clone(),
        None,
        None,
        None,
        None,
    ];
    assert_eq!(a_ended.2, expected_board);
}

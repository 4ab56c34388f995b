use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::core::game::Game;
use crate::core::queue::WaitingQueue;
use crate::core::registry::UserRegistry;
use crate::core::room::{Room, RoomIdGenerator};
use crate::core::user::UserId;
use crate::env::Settings;
use crate::protocol::{RoomId, ServerMessage};
use crate::rate_limit::ActionRateLimiter;
use crate::transport::registry::ConnectionRegistry;

/// Owns every piece of mutable matching/relay/session state and realizes
/// the single-writer discipline spec.md §5 requires: every operation that
/// touches `UserRegistry`, `WaitingQueue`, or room membership goes
/// through this actor's mailbox, so none of them can interleave.
pub struct MatchEngine {
    pub(crate) registry: UserRegistry,
    pub(crate) queue: WaitingQueue,
    pub(crate) rooms: HashMap<RoomId, Room>,
    pub(crate) room_of: HashMap<UserId, RoomId>,
    pub(crate) games: HashMap<RoomId, Game>,
    pub(crate) chat_membership: HashMap<UserId, RoomId>,
    pub(crate) room_ids: RoomIdGenerator,
    pub(crate) rng: SmallRng,
    pub(crate) rate_limiter: ActionRateLimiter,
    pub(crate) settings: Arc<Settings>,
    pub(crate) connections: Addr<ConnectionRegistry>,
}

impl MatchEngine {
    pub fn new(settings: Arc<Settings>, connections: Addr<ConnectionRegistry>) -> Self {
        let rate_limiter =
            ActionRateLimiter::new(settings.rate_limit.window_ms, settings.rate_limit.max_requests);
        Self {
            registry: UserRegistry::new(),
            queue: WaitingQueue::new(),
            rooms: HashMap::new(),
            room_of: HashMap::new(),
            games: HashMap::new(),
            chat_membership: HashMap::new(),
            room_ids: RoomIdGenerator::new(),
            rng: SmallRng::from_entropy(),
            rate_limiter,
            settings,
            connections,
        }
    }

    pub(crate) fn push(&self, to: UserId, msg: ServerMessage) {
        self.connections.do_send(crate::transport::registry::Forward { to, msg });
    }

    /// Wall-clock stamp attached to `match-ready`/`peer-disconnected`/
    /// `peer-skipped` so clients can compute clock skew (SPEC_FULL.md §3).
    pub(crate) fn server_time_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub(crate) fn process_queue(&mut self) {
        let settings = self.settings.matching.clone();
        let mut created = Vec::new();
        {
            let registry = &mut self.registry;
            let queue = &mut self.queue;
            super::matching::process_queue(registry, queue, &settings, |registry, queue, pair| {
                registry.set_state(pair.a, crate::core::user::UserState::Matched, queue);
                registry.set_state(pair.b, crate::core::user::UserState::Matched, queue);
                created.push(pair);
            });
        }
        for pair in created {
            self.finalize_match(pair.a, pair.b);
        }
        if self.queue.size() >= 2 {
            // spec.md §4.3.4 step 5: keep absorbing churn.
        }
    }

    fn finalize_match(&mut self, a: UserId, b: UserId) {
        let (joined_a, joined_b) = match (self.registry.get(a), self.registry.get(b)) {
            (Some(ua), Some(ub)) => (ua.joined_at, ub.joined_at),
            _ => return,
        };
        let initiator = if joined_a <= joined_b { a } else { b };
        let room_id = self.room_ids.next();

        if let Some(ua) = self.registry.get_mut(a) {
            ua.matched_with = Some(b);
            ua.push_previous_match(b);
        }
        if let Some(ub) = self.registry.get_mut(b) {
            ub.matched_with = Some(a);
            ub.push_previous_match(a);
        }

        self.rooms
            .insert(room_id.clone(), Room::new(room_id.clone(), a, b, initiator));
        self.room_of.insert(a, room_id.clone());
        self.room_of.insert(b, room_id.clone());

        crate::metrics::MATCHES_CREATED_TOTAL.inc();
        crate::metrics::QUEUE_DEPTH.set(self.queue.size() as i64);
        crate::metrics::ACTIVE_ROOMS.set(self.rooms.len() as i64);
        crate::metrics::QUEUE_WAIT_SECONDS
            .with_label_values(&["matched"])
            .observe(joined_a.elapsed().as_secs_f64());
        crate::metrics::QUEUE_WAIT_SECONDS
            .with_label_values(&["matched"])
            .observe(joined_b.elapsed().as_secs_f64());

        let server_time_ms = Self::server_time_ms();
        self.push(
            a,
            ServerMessage::MatchReady {
                room_id: room_id.clone(),
                is_initiator: a == initiator,
                peer_id: b.to_string(),
                server_time_ms,
            },
        );
        self.push(
            b,
            ServerMessage::MatchReady {
                room_id,
                is_initiator: b == initiator,
                peer_id: a.to_string(),
                server_time_ms,
            },
        );
    }

    /// Tears down a room and its associated game, if any.
    pub(crate) fn teardown_room(&mut self, room_id: &str) {
        if let Some(room) = self.rooms.remove(room_id) {
            self.room_of.remove(&room.participants.0);
            self.room_of.remove(&room.participants.1);
        }
        self.games.remove(room_id);
        self.chat_membership.retain(|_, r| r != room_id);
    }
}

impl Actor for MatchEngine {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("MatchEngine started");

        let debounce = Duration::from_millis(self.settings.matching.queue_process_debounce_ms);
        ctx.run_interval(debounce, |act, _ctx| {
            act.process_queue();
        });

        let sweep_interval = Duration::from_millis(self.settings.matching.sweep_interval_ms);
        ctx.run_interval(sweep_interval, |act, _ctx| {
            super::supervisor::sweep_abandoned_rooms(act);
        });

        let stats_interval = Duration::from_millis(self.settings.matching.stats_interval_ms);
        ctx.run_interval(stats_interval, |act, _ctx| {
            super::supervisor::emit_stats(act);
        });

        let reap_interval = Duration::from_millis(self.settings.matching.game_expiry_ms.min(60_000));
        ctx.run_interval(reap_interval, |act, _ctx| {
            super::supervisor::reap_idle_games(act);
        });

        let cleanup_interval = Duration::from_secs(300);
        ctx.run_interval(cleanup_interval, |act, _ctx| {
            act.rate_limiter.cleanup(Duration::from_secs(600));
        });
    }
}

impl MatchEngine {
    pub(crate) fn check_rate_limit(&mut self, user: UserId, action: &'static str) -> bool {
        let ok = self.rate_limiter.check(user, action);
        if !ok {
            warn!(%user, action, "rate limit exceeded");
            crate::metrics::RATE_LIMITED_TOTAL.inc();
        }
        ok
    }
}

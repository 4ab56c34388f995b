//! Prometheus metrics, exposed at `GET /metrics` (spec.md §6.2). Grounded
//! on the teacher's `metrics` crate: `lazy_static` globals registered once
//! into a shared `Registry` via `register_custom_metrics`.

use lazy_static::lazy_static;
use prometheus::{opts, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Currently open websocket connections.
    pub static ref CONNECTED_CLIENTS: IntGauge =
        IntGauge::with_opts(opts!("connected_clients", "Current number of open websocket connections")).unwrap();

    /// Users currently sitting in the waiting queue.
    pub static ref QUEUE_DEPTH: IntGauge =
        IntGauge::with_opts(opts!("queue_depth", "Current number of users in the waiting queue")).unwrap();

    /// Matches created since process start.
    pub static ref MATCHES_CREATED_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("matches_created_total", "Total matches created")).unwrap();

    /// `skip` commands processed.
    pub static ref SKIPS_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("skips_total", "Total skip commands processed")).unwrap();

    /// Currently live matched rooms.
    pub static ref ACTIVE_ROOMS: IntGauge =
        IntGauge::with_opts(opts!("active_rooms", "Current number of active matched rooms")).unwrap();

    /// Rooms removed by the abandoned-room sweeper.
    pub static ref ROOMS_SWEPT_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("rooms_swept_total", "Total rooms removed by the abandoned-room sweep")).unwrap();

    /// Tic-tac-toe games tracked by the engine, including completed games
    /// awaiting a rematch or the idle reaper.
    pub static ref ACTIVE_GAMES: IntGauge =
        IntGauge::with_opts(opts!("active_games", "Current number of tracked games")).unwrap();

    /// Games ended by the idle-game reaper rather than reaching completion.
    pub static ref GAMES_EXPIRED_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("games_expired_total", "Total games ended by the idle reaper")).unwrap();

    /// `signal` payloads rejected for failing the bidirectional partner check.
    pub static ref RELAY_ERRORS_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("relay_errors_total", "Total signaling relay payloads rejected")).unwrap();

    /// Commands dropped by the per-(user, action) rate limiter.
    pub static ref RATE_LIMITED_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("rate_limited_total", "Total commands dropped by the rate limiter")).unwrap();

    /// Connections refused for exceeding the per-IP cap.
    pub static ref CONNECTIONS_REFUSED_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("connections_refused_total", "Total connections refused by the per-IP cap")).unwrap();

    /// Time spent in the waiting queue before a match, by outcome.
    pub static ref QUEUE_WAIT_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "queue_wait_seconds",
            "Time users spend waiting before being matched (seconds)",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
        &["outcome"],
    )
    .unwrap();

    /// Internal engine errors emitted, labeled by `EngineError::label()`.
    pub static ref ENGINE_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("engine_errors_total", "Total internal engine errors by kind"),
        &["kind"],
    )
    .unwrap();

    /// Room census (spec.md §4.6.2), partitioned by `category`: connected
    /// users not currently in any room (`user-self-rooms`), healthy
    /// two-party rooms (`paired-rooms`), rooms the sweep would evict
    /// (`abandoned`), and any remaining bookkeeping inconsistency (`other`).
    pub static ref ROOM_CENSUS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("room_census", "Current room count by category"),
        &["category"],
    )
    .unwrap();
}

/// Registers every metric declared above into `registry`. Called once at
/// startup before the `/metrics` handler can be scraped.
pub fn register_custom_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(CONNECTED_CLIENTS.clone()))?;
    registry.register(Box::new(QUEUE_DEPTH.clone()))?;
    registry.register(Box::new(MATCHES_CREATED_TOTAL.clone()))?;
    registry.register(Box::new(SKIPS_TOTAL.clone()))?;
    registry.register(Box::new(ACTIVE_ROOMS.clone()))?;
    registry.register(Box::new(ROOMS_SWEPT_TOTAL.clone()))?;
    registry.register(Box::new(ACTIVE_GAMES.clone()))?;
    registry.register(Box::new(GAMES_EXPIRED_TOTAL.clone()))?;
    registry.register(Box::new(RELAY_ERRORS_TOTAL.clone()))?;
    registry.register(Box::new(RATE_LIMITED_TOTAL.clone()))?;
    registry.register(Box::new(CONNECTIONS_REFUSED_TOTAL.clone()))?;
    registry.register(Box::new(QUEUE_WAIT_SECONDS.clone()))?;
    registry.register(Box::new(ENGINE_ERRORS_TOTAL.clone()))?;
    registry.register(Box::new(ROOM_CENSUS.clone()))?;
    Ok(())
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix::{Actor, System};
use actix_web::{get, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use match_server::{
    engine::MatchEngine,
    env::Settings,
    extract_client_ip,
    metrics,
    rate_limit::ConnectionCapTracker,
    session::Session,
    transport::registry::ConnectionRegistry,
    AppState, LoggerManager,
};

#[get("/")]
async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "message": "video-chat matchmaking & signaling server",
    }))
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "message": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[get("/ready")]
async fn ready() -> HttpResponse {
    HttpResponse::Ok().body("READY")
}

async fn metrics_route(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Some(expected_token) = &state.settings.server.metrics_auth_token {
        let provided = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));
        if provided != Some(expected_token.as_str()) {
            return HttpResponse::Unauthorized().body("Unauthorized: invalid or missing token");
        }
    }

    let metric_families = state.metrics_registry.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("metrics encode error: {}", e));
    }
    HttpResponse::Ok().content_type(encoder.format_type()).body(buffer)
}

/// Binds one `actix-web-actors` WebSocket session per connection, enforcing
/// the per-IP connection cap at admission time (spec.md §4.6).
#[get("/ws/")]
async fn matchmaking_ws_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let client_ip = extract_client_ip(&req).ok_or_else(|| {
        error!("failed to extract client IP, rejecting connection");
        actix_web::error::ErrorBadRequest("unable to determine client IP")
    })?;

    {
        let mut cap = state.conn_cap.lock().unwrap();
        if !cap.try_acquire(client_ip, state.settings.server.per_ip_connection_cap) {
            let err = match_server::errors::EngineError::CapacityExceeded(format!(
                "per-IP connection cap reached for {}",
                client_ip
            ));
            warn!(ip = %client_ip, "connection refused: per-IP cap exceeded");
            metrics::CONNECTIONS_REFUSED_TOTAL.inc();
            metrics::ENGINE_ERRORS_TOTAL.with_label_values(&[err.label()]).inc();
            return Ok(HttpResponse::TooManyRequests().body(err.client_message()));
        }
    }

    let session = Session::new(
        Duration::from_millis(state.settings.matching.connection_timeout_ms / 3),
        Duration::from_millis(state.settings.matching.connection_timeout_ms),
        state.clone(),
        client_ip,
    );

    ws::start(session, &req, stream)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    let settings = Arc::new(Settings::new().expect("failed to load settings"));

    let logger_manager = Arc::new(LoggerManager::setup(&settings));
    info!("logger initialized");

    let shutdown_token = CancellationToken::new();

    let metrics_registry = prometheus::Registry::new();
    metrics::register_custom_metrics(&metrics_registry).expect("failed to register metrics");
    let process_collector = prometheus::process_collector::ProcessCollector::for_self();
    if let Err(e) = metrics_registry.register(Box::new(process_collector)) {
        warn!(error = %e, "failed to register process collector, continuing without it");
    }
    info!("metrics initialized");

    let connections = ConnectionRegistry::new().start();
    let engine = MatchEngine::new(settings.clone(), connections.clone()).start();
    info!("match engine and connection registry started");

    let app_state = AppState {
        settings: settings.clone(),
        engine,
        connections,
        metrics_registry,
        conn_cap: Arc::new(Mutex::new(ConnectionCapTracker::new())),
        logger_manager,
    };

    let bind_address = format!("{}:{}", settings.server.bind_address, settings.server.port);
    info!(%bind_address, "starting HTTP server");

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .service(index)
            .service(health)
            .service(ready)
            .service(matchmaking_ws_route)
            .route("/metrics", web::get().to(metrics_route))
    })
    .bind(&bind_address)?
    .run();

    tokio::select! {
        res = &mut server => {
            error!("server exited unexpectedly");
            return res;
        },
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl+c received, initiating graceful shutdown");
            shutdown_token.cancel();
            System::current().stop();
        },
    }

    info!("waiting for in-flight connections to close");
    server.await?;
    info!("shutdown complete");

    Ok(())
}

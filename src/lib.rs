use std::io;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use actix::Addr;
use tracing::{debug, error, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::engine::MatchEngine;
use crate::env::Settings;
use crate::rate_limit::ConnectionCapTracker;
use crate::transport::registry::ConnectionRegistry;

pub mod core;
pub mod engine;
pub mod env;
pub mod errors;
pub mod metrics;
pub mod protocol;
pub mod rate_limit;
pub mod session;
pub mod transport;

/// Owns the non-blocking file-logger worker thread for the life of the
/// process (spec.md §2 ambient logging stack, grounded on the teacher's
/// `LoggerManager`).
pub struct LoggerManager {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

impl LoggerManager {
    pub fn setup(settings: &Settings) -> Self {
        if let Err(e) = std::fs::create_dir_all(&settings.logging.directory) {
            eprintln!("Failed to create log directory '{}': {}", settings.logging.directory, e);
        }

        let file_appender = RollingFileAppender::new(
            Rotation::DAILY,
            &settings.logging.directory,
            &settings.logging.filename,
        );
        let (non_blocking_file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.server.log_level));

        let console_layer = fmt::layer()
            .with_writer(io::stdout)
            .with_ansi(true)
            .with_thread_ids(true)
            .with_target(false)
            .pretty();

        let file_layer = fmt::layer()
            .with_writer(non_blocking_file_writer)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_target(false)
            .pretty();

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        tracing::info!(
            directory = %settings.logging.directory,
            filename = %settings.logging.filename,
            "logger initialized"
        );

        Self { _guard: guard }
    }
}

/// Shared process state handed to every HTTP/WebSocket handler (spec.md
/// §9, "Implicit singletons become explicitly constructed services owned
/// by a `Server` value").
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub engine: Addr<MatchEngine>,
    pub connections: Addr<ConnectionRegistry>,
    pub metrics_registry: prometheus::Registry,
    pub conn_cap: Arc<Mutex<ConnectionCapTracker>>,
    pub logger_manager: Arc<LoggerManager>,
}

/// Resolves the caller's public IP for the per-IP connection cap
/// (spec.md §4.6, §6.3 `PER_IP_CONN_CAP`), preferring `X-Forwarded-For`
/// and falling back to the raw peer address in debug builds.
pub fn extract_client_ip(req: &actix_web::HttpRequest) -> Option<IpAddr> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            for ip_str in forwarded_str.split(',') {
                if let Ok(ip) = ip_str.trim().parse::<IpAddr>() {
                    if !is_private_or_loopback_ip(&ip) {
                        debug!(%ip, "extracted public client IP from X-Forwarded-For");
                        return Some(ip);
                    }
                }
            }
        }
    }

    let connection_info = req.connection_info();
    if let Some(peer_addr) = connection_info.peer_addr() {
        if let Some(ip_str) = peer_addr.split(':').next() {
            if let Ok(ip) = ip_str.parse::<IpAddr>() {
                if cfg!(debug_assertions) {
                    warn!(%ip, "using direct peer address as client IP in development");
                }
                return Some(ip);
            }
        }
    }

    error!("could not determine client IP from request");
    None
}

fn is_private_or_loopback_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

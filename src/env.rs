use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub server: ServerSettings,
    pub matching: MatchingSettings,
    pub rate_limit: RateLimitSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        println!("Loading configuration for RUN_MODE: {}", &run_mode);

        let s = Config::builder()
            // Load environment-specific file (e.g., development.toml, production.toml)
            .add_source(
                File::with_name(&format!("config/{}", run_mode))
                    .format(FileFormat::Toml)
                    .required(true),
            )
            // Add environment variables (e.g., APP_SERVER__PORT=8000)
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// In-process defaults for unit/property/integration tests, which
    /// never read `config/*.toml` from disk. Not `cfg(test)`-gated since
    /// integration tests under `tests/` link the library's normal build.
    pub fn test_default() -> Self {
        Self {
            logging: LoggingSettings {
                directory: "logs".into(),
                filename: "test.log".into(),
            },
            server: ServerSettings {
                bind_address: "127.0.0.1".into(),
                port: 0,
                log_level: "info".into(),
                metrics_auth_token: None,
                client_url_allowlist: Vec::new(),
                per_ip_connection_cap: 5,
            },
            matching: MatchingSettings {
                connection_timeout_ms: 10_000,
                max_disconnection_duration_ms: 60_000,
                skip_cooldown_ms: 60_000,
                queue_process_debounce_ms: 500,
                sweep_interval_ms: 30_000,
                stats_interval_ms: 5_000,
                game_expiry_ms: 300_000,
            },
            rate_limit: RateLimitSettings {
                window_ms: 1_000,
                max_requests: 20,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    #[serde(default)]
    pub metrics_auth_token: Option<String>,
    /// Allowed `Origin` header values for websocket upgrades; empty means
    /// any origin is accepted (spec.md §6.3 `CLIENT_URL`).
    #[serde(default)]
    pub client_url_allowlist: Vec<String>,
    pub per_ip_connection_cap: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub directory: String,
    pub filename: String,
}

/// Matching/session timing knobs (spec.md §4.2-§4.5, §6.3).
#[derive(Debug, Deserialize, Clone)]
pub struct MatchingSettings {
    pub connection_timeout_ms: u64,
    pub max_disconnection_duration_ms: u64,
    pub skip_cooldown_ms: u64,
    pub queue_process_debounce_ms: u64,
    pub sweep_interval_ms: u64,
    pub stats_interval_ms: u64,
    pub game_expiry_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    pub window_ms: u64,
    pub max_requests: u32,
}

//! Application configuration loaded from environment variables.
//!
//! Configuration follows the twelve-factor app methodology: all configuration
//! is loaded from environment variables with sensible defaults for development.
//!
//! # Environment variables
//!
//! All application-specific variables use the `QAINT_` prefix:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `QAINT_PORT` | 3000 | HTTP server port |
//! | `QAINT_DATABASE_URL` | `sqlite://./data/qaint.db?mode=rwc` | SQLite database path |
//! | `QAINT_WEBHOOK_SECRET` | (none) | HMAC secret for inbound callback signatures |
//! | `QAINT_SIGNATURE_REQUIRED` | false | Reject unsigned callbacks when true |
//! | `QAINT_MAX_CONCURRENT` | 5 | Worker pool size |
//! | `QAINT_TICK_INTERVAL_MS` | 2000 | Coordinator tick interval |
//! | `QAINT_MAX_ATTEMPTS` | 3 | Default retry ceiling |
//! | `QAINT_RETRY_BACKOFF_MS` | 5000 | Base linear retry backoff |
//! | `QAINT_RATE_LIMIT_BUFFER_MS` | 60000 | Fallback rate-limit cool-off |
//! | `QAINT_LEASE_DURATION_MS` | 60000 | Worker lease duration |
//! | `QAINT_OP_TIMEOUT_MS` | 30000 | Per-external-call deadline |
//! | `QAINT_EVENT_RETENTION_DAYS` | 30 | Processed-event pruning horizon |
//!
//! Standard variables (no prefix):
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | `qaint_app=info,tower_http=info` | Tracing filter |

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration as ChronoDuration;
use qaint_queue::QueueConfig;

/// Application configuration loaded from environment variables.
///
/// Use [`AppConfig::from_env()`] to load configuration at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP server port.
    pub port: u16,

    /// SQLite database URL (path for file database, or `sqlite::memory:`).
    pub database_url: String,

    /// HMAC secret used to verify inbound webhook signatures.
    ///
    /// When `None`, the authenticate step lets unsigned callbacks through
    /// unless `signature_required` is set.
    pub webhook_secret: Option<String>,

    /// Reject inbound callbacks that carry no recognized signature header.
    pub signature_required: bool,

    /// Coordinator and worker tunables, forwarded to `qaint_queue::Coordinator`.
    pub queue: QueueConfig,

    /// How long a processed event row is kept before the retention sweep
    /// prunes it.
    pub event_retention: ChronoDuration,
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn parse_bool_env(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => !matches!(raw.to_lowercase().as_str(), "false" | "0" | "no"),
        Err(_) => default,
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing variables use sensible defaults for local development.
    /// Invalid values are logged as warnings and fall back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = QueueConfig::default();

        let queue = QueueConfig {
            max_concurrent: parse_env("QAINT_MAX_CONCURRENT", defaults.max_concurrent),
            tick_interval: ChronoDuration::milliseconds(parse_env(
                "QAINT_TICK_INTERVAL_MS",
                defaults.tick_interval.num_milliseconds(),
            )),
            max_attempts: parse_env("QAINT_MAX_ATTEMPTS", defaults.max_attempts),
            retry_backoff: ChronoDuration::milliseconds(parse_env(
                "QAINT_RETRY_BACKOFF_MS",
                defaults.retry_backoff.num_milliseconds(),
            )),
            rate_limit_buffer: ChronoDuration::milliseconds(parse_env(
                "QAINT_RATE_LIMIT_BUFFER_MS",
                defaults.rate_limit_buffer.num_milliseconds(),
            )),
            lease_duration: ChronoDuration::milliseconds(parse_env(
                "QAINT_LEASE_DURATION_MS",
                defaults.lease_duration.num_milliseconds(),
            )),
            op_timeout: ChronoDuration::milliseconds(parse_env(
                "QAINT_OP_TIMEOUT_MS",
                defaults.op_timeout.num_milliseconds(),
            )),
        };

        Self {
            port: parse_env("QAINT_PORT", 3000),
            database_url: env::var("QAINT_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/qaint.db?mode=rwc".to_string()),
            webhook_secret: env::var("QAINT_WEBHOOK_SECRET").ok(),
            signature_required: parse_bool_env("QAINT_SIGNATURE_REQUIRED", false),
            queue,
            event_retention: ChronoDuration::days(parse_env("QAINT_EVENT_RETENTION_DAYS", 30)),
        }
    }

    /// Get the socket address to bind the HTTP server to.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Get the database path for directory creation.
    ///
    /// Returns `None` for in-memory databases (`:memory:` or URLs starting
    /// with `sqlite::memory:`).
    #[must_use]
    pub fn database_dir(&self) -> Option<PathBuf> {
        if self.database_url == ":memory:" || self.database_url.starts_with("sqlite::memory:") {
            return None;
        }

        let path_str = if let Some(stripped) = self.database_url.strip_prefix("sqlite://") {
            stripped
        } else if let Some(stripped) = self.database_url.strip_prefix("sqlite:") {
            stripped
        } else {
            &self.database_url
        };

        PathBuf::from(path_str).parent().map(PathBuf::from)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "sqlite://./data/qaint.db?mode=rwc".to_string(),
            webhook_secret: None,
            signature_required: false,
            queue: QueueConfig::default(),
            event_retention: ChronoDuration::days(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_url, "sqlite://./data/qaint.db?mode=rwc");
        assert!(config.webhook_secret.is_none());
        assert!(!config.signature_required);
        assert_eq!(config.queue.max_concurrent, 5);
        assert_eq!(config.event_retention, ChronoDuration::days(30));
    }

    #[test]
    fn socket_addr_binding() {
        let config = AppConfig {
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.socket_addr(), SocketAddr::from(([0, 0, 0, 0], 8080)));
    }

    #[test]
    fn database_dir_extraction() {
        let config = AppConfig {
            database_url: "./data/qaint.db".to_string(),
            ..Default::default()
        };
        assert_eq!(config.database_dir(), Some(PathBuf::from("./data")));

        let config = AppConfig {
            database_url: ":memory:".to_string(),
            ..Default::default()
        };
        assert_eq!(config.database_dir(), None);

        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        assert_eq!(config.database_dir(), None);

        let config = AppConfig {
            database_url: "sqlite://./data/app.db".to_string(),
            ..Default::default()
        };
        assert_eq!(config.database_dir(), Some(PathBuf::from("./data")));
    }
}

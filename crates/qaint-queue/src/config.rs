//! Tunables for the coordinator and its workers.
//!
//! Every field has a documented default; callers typically only override
//! the ones their deployment needs and take
//! `Default::default()` for the rest.

use chrono::Duration;

/// Coordinator and worker tunables.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Cap on parallel workers dispatched per tick.
    pub max_concurrent: u32,
    /// How often the coordinator wakes to compute `available` and claim.
    pub tick_interval: Duration,
    /// Default retry ceiling for operations that don't specify one.
    pub max_attempts: i64,
    /// Base linear backoff for a retryable failure: `attempt * this`.
    pub retry_backoff: Duration,
    /// Fallback cool-off when the port's rate-limit error carries no
    /// `retry_after`.
    pub rate_limit_buffer: Duration,
    /// Worker lease duration; bounds crash-recovery latency.
    pub lease_duration: Duration,
    /// Per-external-call deadline.
    pub op_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            tick_interval: Duration::milliseconds(2_000),
            max_attempts: 3,
            retry_backoff: Duration::milliseconds(5_000),
            rate_limit_buffer: Duration::milliseconds(60_000),
            lease_duration: Duration::milliseconds(60_000),
            op_timeout: Duration::milliseconds(30_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_published_design() {
        let config = QueueConfig::default();
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.tick_interval, Duration::milliseconds(2_000));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_backoff, Duration::milliseconds(5_000));
        assert_eq!(config.rate_limit_buffer, Duration::milliseconds(60_000));
        assert_eq!(config.op_timeout, Duration::milliseconds(30_000));
    }
}

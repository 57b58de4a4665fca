//! Outcome classification: rate-limit → retryable → fatal, in that order.

use crate::port::PortError;

/// How a port error should be handled. Whether "retryable" actually gets
/// retried (vs. treated as fatal because attempts are exhausted) is decided
/// by the caller, which has `attempt`/`max_attempts`; this only classifies
/// the error's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    RateLimited,
    Retryable,
    Fatal,
}

const RETRYABLE_CODES: &[&str] = &["NETWORK_ERROR", "ECONNRESET"];

/// Classify a port error in the fixed order the design requires: rate-limit
/// detection is noisy by nature and must win over a generic 5xx/network
/// read, so it is checked first.
#[must_use]
pub fn classify(error: &PortError) -> Classification {
    if is_rate_limited(error) {
        return Classification::RateLimited;
    }
    if is_retryable(error) {
        return Classification::Retryable;
    }
    Classification::Fatal
}

fn is_rate_limited(error: &PortError) -> bool {
    if error.status == Some(429) {
        return true;
    }
    if error
        .code
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case("rate_limited"))
    {
        return true;
    }
    error.message.to_lowercase().contains("rate limit")
}

fn is_retryable(error: &PortError) -> bool {
    if let Some(code) = error.code.as_deref() {
        if RETRYABLE_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)) {
            return true;
        }
    }
    matches!(error.status, Some(status) if (500..600).contains(&status))
}

/// Parse `retry_after` into seconds, falling back to `default_secs` when
/// absent or non-numeric (e.g. an HTTP-date value the port didn't normalize).
#[must_use]
pub fn retry_after_secs(error: &PortError, default_secs: u64) -> u64 {
    error
        .retry_after()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_secs)
}

//! Prometheus metrics infrastructure.
//!
//! Initializes the `metrics` facade with a Prometheus exporter recorder and
//! exposes a handle for rendering the Prometheus text exposition format at
//! the `/metrics` endpoint.
//!
//! # Metric naming conventions
//!
//! All application metrics follow Prometheus naming conventions:
//!
//! - Counters use `_total` suffix (e.g., `http_requests_total`)
//! - Histograms use `_seconds` suffix for units
//! - Labels use snake_case (e.g., `kind`, `reason`)
//!
//! # Architecture
//!
//! The `metrics` crate provides a facade pattern (like `log` or `tracing`):
//! library code emits metrics via macros (`counter!`, `histogram!`), and the
//! recorder installed at startup determines where metrics go. This module
//! installs a Prometheus recorder that accumulates metrics in memory and
//! renders them on demand for the `/metrics` scrape endpoint.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// ---------------------------------------------------------------------------
// Metric name constants
// ---------------------------------------------------------------------------

/// HTTP request counter (labels: method, path, status).
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// HTTP request duration histogram in seconds (labels: method, path).
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Operations enqueued (labels: kind).
pub const OPERATIONS_ENQUEUED_TOTAL: &str = "operations_enqueued_total";

/// Operations that reached `completed` (labels: kind).
pub const OPERATIONS_COMPLETED_TOTAL: &str = "operations_completed_total";

/// Operations that reached `failed` (labels: kind).
pub const OPERATIONS_FAILED_TOTAL: &str = "operations_failed_total";

/// Operations rescheduled after a rate-limit response (labels: kind).
pub const OPERATIONS_RATE_LIMITED_TOTAL: &str = "operations_rate_limited_total";

/// Number of operations claimed per coordinator tick.
pub const CLAIM_BATCH_SIZE: &str = "claim_batch_size";

/// Inbound webhook callbacks received.
pub const EVENTS_RECEIVED_TOTAL: &str = "events_received_total";

/// Inbound webhook callbacks recognized as a duplicate delivery.
pub const EVENTS_DUPLICATE_TOTAL: &str = "events_duplicate_total";

/// Inbound webhook callbacks rejected (labels: reason).
pub const EVENTS_REJECTED_TOTAL: &str = "events_rejected_total";

// ---------------------------------------------------------------------------
// Recorder initialization
// ---------------------------------------------------------------------------

/// Initialize the Prometheus metrics recorder and return a handle for rendering.
///
/// This installs the Prometheus recorder as the global `metrics` recorder.
/// It must be called exactly once during application startup, before any
/// metrics are emitted.
///
/// The returned `PrometheusHandle` is cheaply cloneable and used by the
/// `/metrics` HTTP handler to render the Prometheus text exposition format.
///
/// # Errors
///
/// Returns an error if a global recorder has already been installed or if
/// the builder configuration is invalid.
pub fn init_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // Register descriptions so Prometheus sees HELP/TYPE lines even before
    // any values are recorded.
    describe_metrics();

    Ok(handle)
}

/// Register metric descriptions with the global recorder.
///
/// Descriptions appear as `# HELP` comments in the Prometheus exposition
/// format, making metrics self-documenting for operators. Uses the
/// `metrics::describe_*` macros which operate on the installed global
/// recorder.
fn describe_metrics() {
    metrics::describe_counter!(
        HTTP_REQUESTS_TOTAL,
        metrics::Unit::Count,
        "Total number of HTTP requests handled"
    );

    metrics::describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        OPERATIONS_ENQUEUED_TOTAL,
        metrics::Unit::Count,
        "Total number of operations enqueued"
    );

    metrics::describe_counter!(
        OPERATIONS_COMPLETED_TOTAL,
        metrics::Unit::Count,
        "Total number of operations that reached completed"
    );

    metrics::describe_counter!(
        OPERATIONS_FAILED_TOTAL,
        metrics::Unit::Count,
        "Total number of operations that reached failed"
    );

    metrics::describe_counter!(
        OPERATIONS_RATE_LIMITED_TOTAL,
        metrics::Unit::Count,
        "Total number of operations rescheduled after a rate-limit response"
    );

    metrics::describe_histogram!(
        CLAIM_BATCH_SIZE,
        metrics::Unit::Count,
        "Number of operations claimed per coordinator tick"
    );

    metrics::describe_counter!(
        EVENTS_RECEIVED_TOTAL,
        metrics::Unit::Count,
        "Total number of inbound webhook callbacks received"
    );

    metrics::describe_counter!(
        EVENTS_DUPLICATE_TOTAL,
        metrics::Unit::Count,
        "Total number of inbound webhook callbacks recognized as duplicates"
    );

    metrics::describe_counter!(
        EVENTS_REJECTED_TOTAL,
        metrics::Unit::Count,
        "Total number of inbound webhook callbacks rejected"
    );
}

/// Create a non-global Prometheus handle for testing.
///
/// This builds a recorder without installing it as the global recorder,
/// making it safe to use in tests that run in parallel within the same
/// process. The returned handle can render metrics for the recorder but
/// only captures metrics explicitly registered via the recorder, not
/// metrics emitted via global macros.
///
/// Exposed unconditionally so integration tests in `tests/` can use it.
#[doc(hidden)]
pub fn test_prometheus_handle() -> PrometheusHandle {
    let recorder = PrometheusBuilder::new().build_recorder();
    recorder.handle()
}

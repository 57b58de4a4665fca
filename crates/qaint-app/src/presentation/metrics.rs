//! Prometheus metrics scrape endpoint.
//!
//! Exposes a `GET /metrics` handler that returns the Prometheus text
//! exposition format for scraping by Prometheus or compatible collectors.
//!
//! # Routes
//!
//! - `GET /metrics` - Prometheus text exposition format
//!
//! # Integration
//!
//! Configure Prometheus to scrape this endpoint:
//!
//! ```yaml
//! scrape_configs:
//!   - job_name: qaint-app
//!     static_configs:
//!       - targets: ['127.0.0.1:3000']
//!     scrape_interval: 15s
//! ```

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::instrument;

use crate::state::AppState;

/// Application state subset for the metrics endpoint.
///
/// Contains the Prometheus handle used to render metric values on demand.
#[derive(Clone)]
pub struct MetricsState {
    /// Handle to the Prometheus recorder for rendering exposition format.
    pub prometheus_handle: PrometheusHandle,
}

/// GET /metrics - Prometheus text exposition format.
///
/// Returns all registered metrics in the Prometheus text format with
/// `Content-Type: text/plain; version=0.0.4; charset=utf-8` as required
/// by the Prometheus exposition format specification.
#[instrument(name = "handler.metrics", skip(state))]
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    let body = state.prometheus_handle.render();
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

/// Creates the metrics feature router.
///
/// # Routes
///
/// - `GET /metrics` - Prometheus text exposition format
///
/// Handlers extract `MetricsState` via `FromRef<AppState>`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics_handler))
}

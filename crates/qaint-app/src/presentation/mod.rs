//! Presentation layer: HTTP routes and handlers.
//!
//! This layer handles HTTP concerns only: routing, request parsing, response
//! formatting. Handlers are `async` because HTTP I/O is inherently
//! asynchronous; they call into repository/coordinator/processor methods and
//! translate the result into a response.
//!
//! # What belongs here
//!
//! - HTTP route definitions and handler functions
//! - Request extraction and response shaping
//! - Error response formatting ([`error::AppError`])
//! - Health and metrics endpoints for infrastructure probes
//!
//! # What does NOT belong here
//!
//! - Fingerprinting, classification, or dispatch logic (belongs in the
//!   domain crates: `qaint_mapping`, `qaint_queue`, `qaint_events`)
//! - SQL (belongs in each domain crate's `store` module)

pub mod error;
pub mod health;
pub mod mappings;
pub mod metrics;
pub mod middleware;
pub mod operations;
pub mod webhooks;

pub use error::{AppError, AppErrorKind, ErrorResponse};
pub use health::{HealthChecks, HealthResponse, HealthState, HealthStatus, routes as health_routes};
pub use metrics::{MetricsState, routes as metrics_routes};
pub use middleware::MakeRequestUuidV7;

use axum::Router;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Compose the application router from all feature routers.
///
/// # Middleware stack (outermost first)
///
/// 1. `SetRequestIdLayer` — generates a UUID v7 request ID (or preserves an
///    existing one)
/// 2. `TraceLayer` — creates a tracing span per request with method, URI,
///    and request id
/// 3. `PropagateRequestIdLayer` — copies the request id to the response
///    header
pub fn app_router(state: AppState) -> Router {
    let x_request_id = http::HeaderName::from_static("x-request-id");

    Router::new()
        .merge(health::routes())
        .merge(metrics::routes())
        .merge(webhooks::routes())
        .merge(operations::routes())
        .merge(mappings::routes())
        .with_state(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &http::Request<axum::body::Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http.request",
                    http.request.method = %request.method(),
                    url.path = %request.uri().path(),
                    request_id = %request_id,
                )
            },
        ))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuidV7))
}

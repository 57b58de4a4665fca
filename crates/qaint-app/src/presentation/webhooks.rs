//! Inbound webhook endpoint: the HTTP transport for the inbound event
//! contract that [`EventProcessor`] implements.
//!
//! `POST /webhooks/issue-tracker` hands the raw request body and a
//! lowercased header map straight to [`EventProcessor::process`] — the
//! handler parses nothing beyond what axum needs to extract bytes and
//! headers, since the pipeline itself owns signature verification and
//! payload parsing.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, body::Bytes};
use qaint_events::{EventProcessor, Reason};
use tracing::instrument;

use crate::infrastructure::metrics::EVENTS_REJECTED_TOTAL;
use crate::infrastructure::sink::record_duplicate_event;
use crate::presentation::error::AppError;
use crate::state::AppState;

/// POST /webhooks/issue-tracker
///
/// Response status follows the processor's own outcome: 2xx when
/// `accepted`, 4xx when not and the producer can correct it (bad signature,
/// malformed payload), 5xx reserved for internal-integrity failures that
/// never reach the producer as anything else (the processor itself never
/// fails the producer for an internal error past dedup).
#[instrument(name = "handler.webhooks.issue_tracker", skip(processor, headers, body))]
pub async fn receive(
    State(processor): State<Arc<EventProcessor>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let lowercased: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_lowercase(), v.to_string())))
        .collect();

    let result = processor.process(&body, &lowercased).await?;

    if result.reason == Reason::Duplicate {
        record_duplicate_event();
    }

    let status = if result.accepted {
        StatusCode::OK
    } else {
        match result.reason {
            Reason::InvalidSignature | Reason::MissingSignature | Reason::BadPayload => {
                metrics::counter!(EVENTS_REJECTED_TOTAL, "reason" => result.reason.as_str()).increment(1);
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    };

    Ok((status, Json(result)))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/issue-tracker", post(receive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use qaint_mapping::MappingRepository;
    use qaint_store::{connect, run_migrations};
    use serde_json::json;
    use tower::ServiceExt;

    async fn test_router() -> Router {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let processor = Arc::new(EventProcessor::new(
            qaint_events::EventRepository::new(pool.clone()),
            MappingRepository::new(pool),
            None,
            false,
        ));
        Router::new()
            .route("/webhooks/issue-tracker", post(receive))
            .with_state(processor)
    }

    #[tokio::test]
    async fn unknown_event_kind_is_accepted_and_ignored() {
        let app = test_router().await;
        let body = json!({"event_kind": "comment_added", "subject_id": "1", "subject_key": "QA-1", "timestamp": 1}).to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/issue-tracker")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_with_400() {
        let app = test_router().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/issue-tracker")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

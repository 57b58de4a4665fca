//! Producer-facing operation queue endpoints: `enqueue`, `get`, `cancel`,
//! `stats`.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, extract::FromRef};
use chrono::{DateTime, Utc};
use qaint_queue::{Coordinator, EnqueueRequest, OperationKind, OperationRepository, QueueStats};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::infrastructure::LoggingIssueTrackerPort;
use crate::infrastructure::metrics::OPERATIONS_ENQUEUED_TOTAL;
use crate::presentation::error::AppError;
use crate::state::AppState;

/// State subset for handlers that both write to the operation table and
/// need to wake the coordinator immediately rather than wait out the rest
/// of its tick interval.
#[derive(Clone)]
pub struct QueueState {
    pub operations: OperationRepository,
    pub coordinator: Arc<Coordinator<LoggingIssueTrackerPort>>,
}

impl FromRef<AppState> for QueueState {
    fn from_ref(app_state: &AppState) -> Self {
        QueueState {
            operations: app_state.operations.clone(),
            coordinator: Arc::clone(&app_state.coordinator),
        }
    }
}

/// Request body for `POST /operations`: an operation `kind`, its `payload`,
/// and the optional scheduling/affinity/retry fields `enqueue` accepts.
#[derive(Debug, Deserialize)]
pub struct EnqueueBody {
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub priority: Option<i64>,
    pub affinity_key: Option<String>,
    pub mapping_ref: Option<String>,
    pub max_attempts: Option<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Only meaningful for `kind = "create_issue"`; see
    /// [`qaint_queue::model::EnqueueRequest`].
    pub test_run_id: Option<String>,
    pub test_name: Option<String>,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub operation_id: String,
}

/// POST /operations
#[instrument(name = "handler.operations.enqueue", skip(state, body))]
pub async fn enqueue(
    State(state): State<QueueState>,
    Json(body): Json<EnqueueBody>,
) -> Result<impl IntoResponse, AppError> {
    let kind = OperationKind::parse(&body.kind)
        .ok_or_else(|| AppError::bad_request(format!("unknown operation kind '{}'", body.kind)))?;

    let operation_id = state
        .operations
        .enqueue(EnqueueRequest {
            kind,
            payload: body.payload,
            priority: body.priority,
            affinity_key: body.affinity_key,
            mapping_ref: body.mapping_ref,
            max_attempts: body.max_attempts,
            scheduled_at: body.scheduled_at,
            test_run_id: body.test_run_id,
            test_name: body.test_name,
            fingerprint: body.fingerprint,
        })
        .await?;

    metrics::counter!(OPERATIONS_ENQUEUED_TOTAL, "kind" => kind.as_str()).increment(1);
    state.coordinator.wake();

    Ok(Json(EnqueueResponse { operation_id }))
}

/// GET /operations/:id
#[instrument(name = "handler.operations.get", skip(operations))]
pub async fn get_operation(
    State(operations): State<OperationRepository>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let operation = operations.get(&id).await?.ok_or_else(|| {
        qaint_queue::QueueError::NotFound(id.clone())
    })?;
    Ok(Json(operation))
}

/// POST /operations/:id/cancel
#[instrument(name = "handler.operations.cancel", skip(operations))]
pub async fn cancel_operation(
    State(operations): State<OperationRepository>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let cancelled = operations.cancel(&id).await?;
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

/// GET /operations/stats
#[instrument(name = "handler.operations.stats", skip(operations))]
pub async fn stats(State(operations): State<OperationRepository>) -> Result<Json<QueueStats>, AppError> {
    Ok(Json(operations.stats().await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/operations", post(enqueue))
        .route("/operations/stats", get(stats))
        .route("/operations/{id}", get(get_operation))
        .route("/operations/{id}/cancel", post(cancel_operation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use qaint_mapping::MappingRepository;
    use qaint_queue::QueueConfig;
    use qaint_store::{connect, run_migrations};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn enqueue_rejects_unknown_kind() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let operations = OperationRepository::new(pool.clone());
        let mappings = MappingRepository::new(pool);
        let coordinator = Arc::new(Coordinator::new(
            operations.clone(),
            mappings,
            Arc::new(LoggingIssueTrackerPort),
            QueueConfig::default(),
        ));
        let app = Router::new()
            .route("/operations", post(enqueue))
            .with_state(QueueState { operations, coordinator });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/operations")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"kind": "not_a_kind"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn enqueue_then_get_round_trips() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let operations = OperationRepository::new(pool.clone());
        let mappings = MappingRepository::new(pool);
        let coordinator = Arc::new(Coordinator::new(
            operations.clone(),
            mappings,
            Arc::new(LoggingIssueTrackerPort),
            QueueConfig::default(),
        ));
        let state = QueueState { operations: operations.clone(), coordinator };

        let app = Router::new()
            .route("/operations", post(enqueue))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/operations")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"kind": "create_issue", "payload": {}}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: EnqueueResponse = serde_json::from_slice(&body).unwrap();

        let stored = operations.get(&parsed.operation_id).await.unwrap();
        assert!(stored.is_some());
    }
}

//! Find-or-create lookup over HTTP: the producer's dedupe check before it
//! decides whether to enqueue a `create_issue` operation.

use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Json;
use qaint_mapping::{Mapping, MappingRepository, fingerprint};
use serde::Deserialize;
use tracing::instrument;

use crate::presentation::error::AppError;
use crate::state::AppState;

/// Request body: the caller supplies the failure's identifying fields, not
/// a pre-computed fingerprint, so this endpoint is the single place the
/// fingerprint algorithm runs.
#[derive(Debug, Deserialize)]
pub struct FindOrCreateBody {
    pub test_run_id: String,
    pub test_name: String,
    pub error_message: String,
    #[serde(default)]
    pub selector: Option<String>,
}

/// POST /mappings/find-or-create
///
/// Returns the existing mapping, or `null` — the caller's cue to enqueue
/// a `create_issue` operation carrying the same
/// `(test_run_id, test_name, fingerprint)` triple.
#[instrument(name = "handler.mappings.find_or_create", skip(mappings, body))]
pub async fn find_or_create(
    State(mappings): State<MappingRepository>,
    Json(body): Json<FindOrCreateBody>,
) -> Result<impl IntoResponse, AppError> {
    let fp = fingerprint(&body.test_name, &body.error_message, body.selector.as_deref());
    let existing: Option<Mapping> = mappings.find(&body.test_run_id, &body.test_name, &fp).await?;
    Ok(Json(existing))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/mappings/find-or-create", post(find_or_create))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use qaint_mapping::WorkerDescriptor;
    use qaint_store::{connect, run_migrations};
    use serde_json::json;
    use tower::ServiceExt;

    async fn test_router() -> (Router, MappingRepository) {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let mappings = MappingRepository::new(pool);
        let app = Router::new()
            .route("/mappings/find-or-create", post(find_or_create))
            .with_state(mappings.clone());
        (app, mappings)
    }

    #[tokio::test]
    async fn unknown_fingerprint_returns_null() {
        let (app, _mappings) = test_router().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mappings/find-or-create")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"test_run_id": "r1", "test_name": "login", "error_message": "boom"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"null");
    }

    #[tokio::test]
    async fn existing_fingerprint_returns_the_mapping() {
        let (app, mappings) = test_router().await;
        let fp = fingerprint("login", "boom", None);
        mappings
            .create_from_worker(
                "r1",
                "login",
                &fp,
                WorkerDescriptor {
                    external_issue_key: Some("QA-1".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mappings/find-or-create")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"test_run_id": "r1", "test_name": "login", "error_message": "boom"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["external_issue_key"], "QA-1");
    }
}

//! Application state shared across HTTP handlers.
//!
//! `AppState` is the central state container passed to handlers via axum's
//! `State` extractor. It holds the repositories for the three durable
//! tables plus the event processor and the coordinator's wake/shutdown
//! handles; domain-specific states implement `FromRef<AppState>` so
//! individual handlers only extract what they need.

use std::sync::Arc;

use axum::extract::FromRef;
use metrics_exporter_prometheus::PrometheusHandle;
use qaint_events::EventProcessor;
use qaint_mapping::MappingRepository;
use qaint_queue::{Coordinator, OperationRepository};
use qaint_store::SqlitePool;
use tokio::sync::watch;

use crate::infrastructure::LoggingIssueTrackerPort;
use crate::presentation::health::HealthState;
use crate::presentation::metrics::MetricsState;

/// Central application state container.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub operations: OperationRepository,
    pub mappings: MappingRepository,
    pub events: Arc<EventProcessor>,
    pub coordinator: Arc<Coordinator<LoggingIssueTrackerPort>>,
    pub prometheus_handle: PrometheusHandle,
    /// Flipped to `true` on `SIGINT`/`SIGTERM` to stop the coordinator's
    /// tick loop and the axum listener together.
    pub shutdown: watch::Sender<bool>,
}

impl AppState {
    #[must_use]
    pub fn new(
        db_pool: SqlitePool,
        operations: OperationRepository,
        mappings: MappingRepository,
        events: Arc<EventProcessor>,
        coordinator: Arc<Coordinator<LoggingIssueTrackerPort>>,
        prometheus_handle: PrometheusHandle,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            db_pool,
            operations,
            mappings,
            events,
            coordinator,
            prometheus_handle,
            shutdown,
        }
    }
}

impl FromRef<AppState> for Arc<EventProcessor> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.events)
    }
}

impl FromRef<AppState> for OperationRepository {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.operations.clone()
    }
}

impl FromRef<AppState> for MappingRepository {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.mappings.clone()
    }
}

impl FromRef<AppState> for Arc<Coordinator<LoggingIssueTrackerPort>> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.coordinator)
    }
}

impl FromRef<AppState> for HealthState {
    fn from_ref(app_state: &AppState) -> Self {
        HealthState {
            db_pool: app_state.db_pool.clone(),
        }
    }
}

impl FromRef<AppState> for MetricsState {
    fn from_ref(app_state: &AppState) -> Self {
        MetricsState {
            prometheus_handle: app_state.prometheus_handle.clone(),
        }
    }
}

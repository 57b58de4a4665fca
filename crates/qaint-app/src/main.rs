//! Process entry point: load configuration, connect the store, wire the
//! repositories/processor/coordinator together, and serve the HTTP surface
//! until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use qaint_app::config::AppConfig;
use qaint_app::infrastructure::metrics::init_prometheus_recorder;
use qaint_app::infrastructure::{LoggingIssueTrackerPort, MetricsSink};
use qaint_app::presentation::app_router;
use qaint_app::state::AppState;
use qaint_events::{EventProcessor, EventRepository};
use qaint_mapping::MappingRepository;
use qaint_queue::{Coordinator, OperationRepository};
use qaint_store::{connect, run_migrations};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qaint_app=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    tracing::info!(port = config.port, database_url = %config.database_url, "starting qaint-app");

    if let Some(dir) = config.database_dir() {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::error!(error = %e, path = ?dir, "failed to create database directory");
            std::process::exit(1);
        }
    }

    let pool = match connect(&config.database_url, config.queue.max_concurrent.max(1) + 1).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to database");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(&pool).await {
        tracing::error!(error = %e, "failed to run migrations");
        std::process::exit(1);
    }

    let prometheus_handle = match init_prometheus_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to install prometheus recorder");
            std::process::exit(1);
        }
    };

    let operations = OperationRepository::new(pool.clone());
    let mappings = MappingRepository::new(pool.clone());
    let events_repo = EventRepository::new(pool.clone());

    let metrics_sink = Arc::new(MetricsSink);

    let events = Arc::new(
        EventProcessor::new(
            events_repo,
            mappings.clone(),
            config.webhook_secret.as_ref().map(|s| s.as_bytes().to_vec()),
            config.signature_required,
        )
        .with_sink(metrics_sink.clone()),
    );

    let coordinator = Arc::new(
        Coordinator::new(
            operations.clone(),
            mappings.clone(),
            Arc::new(LoggingIssueTrackerPort),
            config.queue.clone(),
        )
        .with_sink(metrics_sink),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let coordinator_handle = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        let shutdown_rx = shutdown_rx.clone();
        async move { coordinator.run(shutdown_rx).await }
    });

    let maintenance_handle = tokio::spawn(maintenance_loop(
        Arc::clone(&events),
        config.event_retention,
        shutdown_rx.clone(),
    ));

    let state = AppState::new(
        pool,
        operations,
        mappings,
        events,
        coordinator,
        prometheus_handle,
        shutdown_tx.clone(),
    );

    let app = app_router(state);

    let listener = match tokio::net::TcpListener::bind(config.socket_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.socket_addr(), "failed to bind listener");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %config.socket_addr(), "listening");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal(shutdown_tx))
        .await;

    if let Err(e) = serve_result {
        tracing::error!(error = %e, "server error");
    }

    let _ = coordinator_handle.await;
    let _ = maintenance_handle.await;
}

/// Periodically resweep stuck-unprocessed events and prune old processed
/// rows past the configured retention horizon. Runs until `shutdown` fires.
async fn maintenance_loop(
    events: Arc<EventProcessor>,
    event_retention: chrono::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(300));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        if *shutdown.borrow() {
            break;
        }

        let threshold = chrono::Utc::now() - chrono::Duration::minutes(5);
        match events.resweep(threshold).await {
            Ok(n) if n > 0 => tracing::info!(redispatched = n, "resweep redispatched stale events"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "resweep failed"),
        }

        match events.prune(event_retention).await {
            Ok(n) if n > 0 => tracing::info!(pruned = n, "pruned processed events past retention"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "prune failed"),
        }
    }
}

/// Waits for `SIGINT`/`SIGTERM` (or `Ctrl+C` on platforms without Unix
/// signals) and flips the shared shutdown flag so the coordinator's tick
/// loop and the maintenance loop stop alongside the HTTP listener.
async fn wait_for_shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}

//! JobSync Server: local job engine with connector sync.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use jobsync_api::{AppState, build_router};
use jobsync_connector::AdapterRegistry;
use jobsync_core::config::AppConfig;
use jobsync_core::error::AppError;
use jobsync_database::DatabasePool;
use jobsync_realtime::EventBus;
use jobsync_worker::jobs::{ConnectorSyncHandler, NoopHandler, ProcessSpawnHandler};
use jobsync_worker::sync::{LeaseTable, SyncEngine};
use jobsync_worker::{DueScheduler, JobEngine, JobExecutor, SessionStore};

#[tokio::main]
async fn main() {
    let env = std::env::var("JOBSYNC_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting JobSync v{}", env!("CARGO_PKG_VERSION"));

    if !config.auth.is_configured() {
        tracing::warn!("auth.token is empty; every protected request will be rejected");
    }

    // ── Step 1: Data directory ───────────────────────────────────
    tokio::fs::create_dir_all(&config.server.data_dir)
        .await
        .map_err(|e| {
            AppError::internal(format!(
                "Failed to create data dir '{}': {e}",
                config.server.data_dir
            ))
        })?;

    // ── Step 2: Database connection + migrations ─────────────────
    tracing::info!("Connecting to database...");
    let db = Arc::new(DatabasePool::connect(&config.database).await?);
    jobsync_database::migration::run_migrations(db.pool()).await?;
    tracing::info!("Database migrations complete");

    // ── Step 3: Event bus ────────────────────────────────────────
    let bus = Arc::new(EventBus::new(config.realtime.channel_buffer_size));

    // ── Step 4: Connector adapters + sync engine ─────────────────
    let adapters = AdapterRegistry::with_defaults(&config.sync)?;
    let leases = LeaseTable::new(Duration::from_secs(config.sync.lease_ttl_seconds));
    let sync = Arc::new(SyncEngine::new(
        adapters,
        db.pool().clone(),
        leases,
        config.sync.clone(),
    ));

    // ── Step 5: Job handlers ─────────────────────────────────────
    let sessions = Arc::new(SessionStore::new(&config.process));
    let mut executor = JobExecutor::new();
    executor.register(Arc::new(NoopHandler));
    executor.register(Arc::new(ProcessSpawnHandler::new(
        config.process.clone(),
        Arc::clone(&sessions),
    )));
    for handler in ConnectorSyncHandler::all(&sync) {
        executor.register(handler);
    }

    // ── Step 6: Job engine ───────────────────────────────────────
    let engine = JobEngine::new(
        db.pool().clone(),
        Arc::clone(&bus),
        Arc::new(executor),
        &config.worker,
    );
    engine.recover().await?;
    if config.worker.enabled {
        engine.start().await;
    } else {
        tracing::info!("Worker pool disabled; jobs will stay queued");
    }

    // ── Step 7: Due-connector scheduler ──────────────────────────
    let scheduler = if config.scheduler.enabled {
        let scheduler = DueScheduler::new(
            Arc::clone(&engine),
            Arc::clone(&sync),
            db.pool().clone(),
            &config.scheduler,
        );
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Due-connector scheduler disabled");
        None
    };

    // ── Step 8: Build and start HTTP server ──────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let config = Arc::new(config);
    let state = AppState::new(
        Arc::clone(&config),
        Arc::clone(&db),
        bus,
        Arc::clone(&engine),
        sessions,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!("JobSync server listening on {addr}");

    let shutdown = engine.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
            shutdown.cancel();
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    // ── Step 9: Stop background work ─────────────────────────────
    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Scheduler shutdown failed");
        }
    }
    engine.shutdown().await;
    db.close().await;

    tracing::info!("JobSync server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

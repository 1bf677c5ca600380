mod backend;
mod config;
mod db;
mod errors;
mod models;
mod review;
mod routes;
mod state;
mod store;
mod sync;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::backend::{DiaryBackend, PgBackend, RestBackend};
use crate::config::{BackendMode, Config};
use crate::db::{create_pool, run_migrations};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::file::FileStore;
use crate::sync::{scheduler, SyncEngine};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting diary API v{}", env!("CARGO_PKG_VERSION"));

    let backend = build_backend(&config).await?;

    let store = Arc::new(FileStore::open(&config.data_dir)?);
    info!("Local store at {}", config.data_dir.display());

    let engine = Arc::new(SyncEngine::new(
        backend.clone(),
        store,
        config.default_username.clone(),
    ));
    let scheduler = scheduler::spawn(engine.clone(), config.scheduler_config());

    let state = AppState {
        engine,
        backend,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Picks the remote store from configuration; `None` runs the service offline.
async fn build_backend(config: &Config) -> Result<Option<Arc<dyn DiaryBackend>>> {
    match config.backend_mode() {
        BackendMode::Offline => {
            warn!("No diary backend configured, running in offline mode");
            Ok(None)
        }
        BackendMode::Rest { base_url, api_key } => {
            let backend = RestBackend::new(&base_url, &api_key)?;
            info!("REST backend initialized ({base_url})");
            Ok(Some(Arc::new(backend)))
        }
        BackendMode::Postgres { database_url } => {
            let pool = create_pool(&database_url).await?;
            run_migrations(&pool).await?;
            info!("PostgreSQL backend initialized");
            Ok(Some(Arc::new(PgBackend::new(pool))))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

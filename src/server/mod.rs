// src/server/mod.rs

//! HTTP / WebSocket front end.
//!
//! All task endpoints live under the configured `api_prefix`; `/api/health`
//! is always at the root.

pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ConfigFile;
use crate::fs::RealFileSystem;
use crate::orchestrator::Orchestrator;

pub use error::{ApiError, ErrorBody};

/// Extra time on top of the kill grace for a cancelled run to be reaped at
/// shutdown.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(5);

/// Build the full router for `orch`.
pub fn router(orch: Orchestrator, api_prefix: &str) -> Router {
    let api = routes::api_routes();
    let api = if api_prefix.is_empty() {
        api
    } else {
        Router::new().nest(api_prefix, api)
    };

    Router::new()
        .route("/api/health", get(routes::health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(orch)
}

/// Serve until Ctrl-C, then terminate a live verification run.
pub async fn serve(cfg: ConfigFile) -> Result<()> {
    let orch = Orchestrator::new(&cfg, Arc::new(RealFileSystem));
    let app = router(orch.clone(), &cfg.server.api_prefix);

    let listener = TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("binding {}", cfg.bind))?;
    info!(
        addr = %listener.local_addr()?,
        prefix = %cfg.server.api_prefix,
        proof_root = ?cfg.proof_root(),
        "proofrun listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    info!("http server stopped");
    orch.shutdown(cfg.kill_grace() + SHUTDOWN_SLACK).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; shutdown signal disabled");
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C received; shutting down");
}

//! `GET /health` for container platforms.

use std::{net::SocketAddr, sync::Arc};

use {
    axum::{Json, Router, extract::State, routing::get},
    serde::Serialize,
    tokio_util::sync::CancellationToken,
    tracing::info,
};

use crate::{directory::SessionDirectory, error::Result, status::SessionStatus};

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub total: usize,
    pub ready: usize,
    pub sessions: Vec<SessionStatus>,
}

pub fn router(directory: Arc<dyn SessionDirectory>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(directory)
}

async fn health_handler(State(directory): State<Arc<dyn SessionDirectory>>) -> Json<HealthReport> {
    let sessions = directory.statuses().await;
    Json(HealthReport {
        status: "ok",
        total: sessions.len(),
        ready: sessions.iter().filter(|s| s.is_ready).count(),
        sessions,
    })
}

/// Serve the health endpoint on `0.0.0.0:port` until `shutdown` fires.
pub async fn serve(
    port: u16,
    directory: Arc<dyn SessionDirectory>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "health endpoint listening");
    axum::serve(listener, router(directory))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

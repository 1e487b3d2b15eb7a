//! HTTP server setup and routing
//!
//! Routes:
//! - `GET /events` - SSE telemetry stream (`stream.start` / `stream.update` / `stream.end`)
//! - `GET /health` - liveness, version and build identification
//! - `GET /sessions` - active playout sessions
//! - `GET /devices` - output devices as index/name pairs

use crate::error::{Error, Result};
use crate::playback::engine::PlayoutEngine;
use crate::playback::telemetry::BroadcastTransport;
use crate::shutdown::ShutdownSignal;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<PlayoutEngine>,
    pub telemetry: BroadcastTransport,
}

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/sessions", get(super::handlers::list_sessions))
        .route("/devices", get(super::handlers::list_devices))
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API on `bind` until `shutdown` is triggered
pub async fn serve(bind: &str, ctx: AppContext, shutdown: Arc<ShutdownSignal>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| Error::Telemetry(format!("Failed to bind to {}: {}", bind, e)))?;
    info!("Telemetry/API server listening on {}", bind);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move {
            let _ = tokio::task::spawn_blocking(move || shutdown.wait()).await;
        })
        .await
        .map_err(|e| Error::Telemetry(format!("Server error: {}", e)))?;

    info!("Telemetry/API server stopped");
    Ok(())
}

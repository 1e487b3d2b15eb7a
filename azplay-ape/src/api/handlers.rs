//! HTTP request handlers

use crate::api::server::AppContext;
use crate::audio::output::list_devices as enumerate_devices;
use crate::playback::registry::SessionSnapshot;
use axum::{extract::State, http::StatusCode, Json};
use azplay_common::events::DeviceInfo;
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    active_sessions: usize,
    telemetry_subscribers: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    sessions: Vec<SessionSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    current: DeviceInfo,
    devices: Vec<DeviceInfo>,
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "azplay-ape".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        active_sessions: ctx.engine.registry().len(),
        telemetry_subscribers: ctx.telemetry.subscriber_count(),
    })
}

/// GET /sessions - active playout sessions, oldest first
pub async fn list_sessions(State(ctx): State<AppContext>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: ctx.engine.sessions(),
    })
}

/// GET /devices - available output devices
pub async fn list_devices(
    State(ctx): State<AppContext>,
) -> Result<Json<DeviceListResponse>, (StatusCode, Json<StatusResponse>)> {
    let internal = |msg: String| {
        error!("Failed to list audio devices: {}", msg);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StatusResponse {
                status: format!("error: {}", msg),
            }),
        )
    };

    // Host enumeration can block; keep it off the async workers
    let devices = tokio::task::spawn_blocking(enumerate_devices)
        .await
        .map_err(|e| internal(e.to_string()))?
        .map_err(|e| internal(e.to_string()))?;

    info!("Found {} audio devices", devices.len());
    Ok(Json(DeviceListResponse {
        current: ctx.engine.device_info(),
        devices,
    }))
}

//! HTTP API handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audio::DeviceDescriptor;
use crate::discovery::PeerEntry;
use crate::error::Error;
use crate::session::SessionStatus;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn failure<T>(err: &Error) -> ApiResult<T> {
    let status = match err {
        Error::Config(_) => StatusCode::BAD_REQUEST,
        Error::Session(_) => StatusCode::CONFLICT,
        Error::Device(_) | Error::Network(_) | Error::Format(_) | Error::Io(_) => {
            StatusCode::BAD_GATEWAY
        }
    };
    (status, Json(ApiResponse::error(err.to_string())))
}

/// Allowed gain slider range
#[derive(Serialize)]
pub struct GainRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// System status
#[derive(Serialize)]
pub struct SystemStatus {
    pub session: SessionStatus,
    pub peer_count: usize,
    pub gain_range: GainRange,
    pub uptime_seconds: u64,
}

/// Get system status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let audio = state.controller.audio_config();
    let status = SystemStatus {
        session: state.controller.status(),
        peer_count: state.registry.len(),
        gain_range: GainRange {
            min: audio.min_gain,
            max: audio.max_gain,
            step: audio.gain_step,
        },
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    Json(ApiResponse::ok(status))
}

/// Get available capture devices
pub async fn get_devices(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<DeviceDescriptor>> {
    match state.controller.backend().list_input_devices() {
        Ok(devices) => (StatusCode::OK, Json(ApiResponse::ok(devices))),
        Err(e) => failure(&e.into()),
    }
}

/// Get discovered peers in discovery order
pub async fn get_peers(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<PeerEntry>>> {
    Json(ApiResponse::ok(state.registry.entries()))
}

#[derive(Serialize, Deserialize)]
pub struct GainBody {
    pub gain: f64,
}

pub async fn get_gain(State(state): State<Arc<AppState>>) -> Json<ApiResponse<GainBody>> {
    Json(ApiResponse::ok(GainBody {
        gain: state.controller.gain(),
    }))
}

/// Change the gain, live if a session is running
pub async fn set_gain(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GainBody>,
) -> ApiResult<GainBody> {
    match state.controller.set_gain(body.gain) {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok(body))),
        Err(e) => failure(&e.into()),
    }
}

/// Start request: device id and peer host from the pickers
#[derive(Deserialize)]
pub struct StartRequest {
    pub device_id: String,
    pub peer: String,
    pub gain: Option<f64>,
}

#[derive(Serialize)]
pub struct StartResponse {
    pub session_id: uuid::Uuid,
}

/// Start streaming
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartRequest>,
) -> ApiResult<StartResponse> {
    // Opening a device blocks; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || -> crate::Result<uuid::Uuid> {
        let device = state.controller.backend().find_device(&req.device_id)?;
        let peer = state.registry.endpoint_for(&req.peer);
        let gain = req.gain.unwrap_or_else(|| state.controller.gain());
        state.controller.start(&device, &peer, gain)
    })
    .await;

    match result {
        Ok(Ok(session_id)) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(StartResponse { session_id })),
        ),
        Ok(Err(e)) => failure(&e),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// Stop streaming; succeeds when nothing is running too
pub async fn stop_session(State(state): State<Arc<AppState>>) -> Json<ApiResponse<()>> {
    state.controller.stop();
    Json(ApiResponse::ok(()))
}

//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use camsync_coordinator::SessionId;
use camsync_core::DeviceId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn not_found(what: &str) -> axum::response::Response {
    (StatusCode::NOT_FOUND, Json(ApiError::new(format!("{} not found", what)))).into_response()
}

fn parse_session_id(raw: &str) -> Result<SessionId, axum::response::Response> {
    Uuid::parse_str(raw).map(SessionId).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(format!("Invalid session id: {}", raw))),
        )
            .into_response()
    })
}

/// List all sessions with their device nodes
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.sessions().await)
}

/// Last cycle report of a session
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if state.session(id).is_none() {
        return not_found("Session");
    }
    match state.report(id).await {
        Some(report) => Json(report).into_response(),
        None => not_found("Report"),
    }
}

/// Run a cycle immediately
pub async fn trigger_cycle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    info!(session = %id, "Manual cycle requested");
    match state.run_cycle(id).await {
        Some(report) => Json(report).into_response(),
        None => not_found("Session"),
    }
}

/// Observer toggle request body
#[derive(Deserialize)]
pub struct ObserverRequest {
    enabled: bool,
}

#[derive(Serialize)]
struct ObserverResponse {
    device: DeviceId,
    enabled: bool,
}

/// Enable or disable the observer of a device
pub async fn set_observer(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
    Json(req): Json<ObserverRequest>,
) -> impl IntoResponse {
    let device = DeviceId::new(device);
    if !state.observers.set_enabled(&device, req.enabled) {
        return not_found("Observer");
    }
    Json(ObserverResponse {
        device,
        enabled: req.enabled,
    })
    .into_response()
}

//! HTTP control API.
//!
//! Maps the local control surface onto scheduler calls. Mutating routes
//! require the bearer token the daemon writes under its state directory at
//! startup; status, ping, and the full-status query are open to any local
//! caller.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use reboot_window::format_duration;

use crate::scheduler::{RebootScheduler, SchedulerError};
use crate::types::{RebootMethod, RebootStatus, RebootStrategy};

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<RebootScheduler>,
    pub auth: AuthToken,
}

/// Bearer token gating mutating routes.
#[derive(Clone)]
pub struct AuthToken(Arc<String>);

impl AuthToken {
    pub fn new(token: String) -> Self {
        Self(Arc::new(token))
    }

    fn require(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        match provided {
            Some(token) if token == self.0.as_str() => Ok(()),
            _ => Err(ApiError::PermissionDenied),
        }
    }
}

/// Create the control API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/status", get(status))
        .route("/v1/full-status", get(full_status))
        .route("/v1/reboot", post(reboot))
        .route("/v1/cancel", post(cancel))
        .route("/v1/strategy", put(set_strategy))
        .route("/v1/window", put(set_window))
        .route("/v1/active", put(set_active))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Named API errors, one per error the control surface can answer with.
#[derive(Debug)]
pub enum ApiError {
    AlreadyInProgress {
        method: RebootMethod,
        scheduled_at: Option<DateTime<Utc>>,
    },
    NoRebootScheduled,
    RebootDisabled,
    InvalidParameter {
        variable: String,
    },
    ErrorWritingConfig,
    PermissionDenied,
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::AlreadyInProgress {
                method,
                scheduled_at,
            } => Self::AlreadyInProgress {
                method,
                scheduled_at,
            },
            SchedulerError::NoRebootScheduled => Self::NoRebootScheduled,
            SchedulerError::RebootDisabled => Self::RebootDisabled,
            SchedulerError::InvalidParameter { variable } => Self::InvalidParameter {
                variable: variable.to_string(),
            },
            SchedulerError::ConfigWrite(_) => Self::ErrorWritingConfig,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::AlreadyInProgress {
                method,
                scheduled_at,
            } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "AlreadyInProgress",
                    "message": "a reboot is already in progress",
                    "method": method,
                    "scheduled_at": scheduled_at,
                }),
            ),
            Self::NoRebootScheduled => (
                StatusCode::CONFLICT,
                json!({
                    "error": "NoRebootScheduled",
                    "message": "no reboot is scheduled",
                }),
            ),
            Self::RebootDisabled => (
                StatusCode::CONFLICT,
                json!({
                    "error": "RebootDisabled",
                    "message": "reboots are currently disabled",
                }),
            ),
            Self::InvalidParameter { variable } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "InvalidParameter",
                    "message": format!("invalid {variable}"),
                    "variable": variable,
                }),
            ),
            Self::ErrorWritingConfig => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "ErrorWritingConfig",
                    "message": "the change is active but could not be persisted",
                }),
            ),
            Self::PermissionDenied => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": "PermissionDenied",
                    "message": "this operation requires the daemon's API token",
                }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RebootRequest {
    #[serde(default)]
    pub method: Option<RebootMethod>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct RebootResponse {
    pub method: RebootMethod,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetStrategyRequest {
    pub strategy: String,
}

#[derive(Debug, Deserialize)]
pub struct SetWindowRequest {
    pub start: String,
    pub duration: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: RebootStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_method: Option<RebootMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reboot_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct FullStatusResponse {
    pub status: RebootStatus,
    pub strategy: RebootStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_method: Option<RebootMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reboot_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_duration: Option<String>,
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "alive": true }))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let report = state.scheduler.status().await;
    Json(StatusResponse {
        status: report.status,
        requested_method: report.method,
        reboot_time: report.scheduled_at,
    })
}

async fn full_status(State(state): State<AppState>) -> Json<FullStatusResponse> {
    let report = state.scheduler.full_status().await;
    Json(FullStatusResponse {
        status: report.status,
        strategy: report.strategy,
        requested_method: report.method,
        reboot_time: report.scheduled_at,
        window_start: report.window.as_ref().map(|w| w.start.to_string()),
        window_duration: report.window.as_ref().map(|w| format_duration(w.duration)),
    })
}

async fn reboot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RebootRequest>,
) -> Result<Json<RebootResponse>, ApiError> {
    state.auth.require(&headers)?;
    let scheduled = state
        .scheduler
        .request_reboot(request.method.unwrap_or(RebootMethod::Hard), request.force)
        .await?;
    Ok(Json(RebootResponse {
        method: scheduled.method,
        scheduled_at: scheduled.scheduled_at,
    }))
}

async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.auth.require(&headers)?;
    state.scheduler.cancel().await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn set_strategy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SetStrategyRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.auth.require(&headers)?;
    let strategy: RebootStrategy =
        request
            .strategy
            .parse()
            .map_err(|_| ApiError::InvalidParameter {
                variable: "strategy".to_string(),
            })?;
    state.scheduler.set_strategy(strategy).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn set_window(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SetWindowRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.auth.require(&headers)?;
    state
        .scheduler
        .set_window(&request.start, &request.duration)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn set_active(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.auth.require(&headers)?;
    state.scheduler.set_active(request.active).await;
    Ok(Json(SuccessResponse { success: true }))
}

//! Request handlers for API endpoints

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use servoctl_actuator::{BulkReport, MoveOutcome, ServoAngle, ServoError, ServoId};

use crate::models::*;
use crate::AppState;

/// Response type shared by every servo endpoint
pub type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

/// HTTP status for a servo error
pub fn status_for(err: &ServoError) -> StatusCode {
    match err {
        ServoError::NotFound(_) => StatusCode::NOT_FOUND,
        ServoError::Inactive(_) => StatusCode::CONFLICT,
        ServoError::ConfigValidation(_) | ServoError::InvalidAngle(_) => StatusCode::BAD_REQUEST,
        ServoError::HardwareInit { .. } | ServoError::HardwareWrite { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServoError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn failure<T: serde::Serialize>(err: &ServoError) -> ApiResult<T> {
    (status_for(err), Json(ApiResponse::error(ApiError::from(err))))
}

fn ok<T: serde::Serialize>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// 200 when every servo succeeded, 207 Multi-Status otherwise
fn bulk(report: BulkReport, angle: Option<u8>, done: &str) -> ApiResult<BulkResult> {
    if report.is_complete() {
        let message = format!("All servos {done}. Affected servos: {:?}", report.succeeded);
        return ok(BulkResult::from_report(&report, angle, message));
    }
    let message = format!(
        "Partial success. {} servos {done}: {:?}. Errors: {}",
        report.succeeded.len(),
        report.succeeded,
        report.failed.len()
    );
    (
        StatusCode::MULTI_STATUS,
        Json(ApiResponse::partial(BulkResult::from_report(&report, angle, message))),
    )
}

fn moved(servo_id: ServoId, outcome: MoveOutcome, verb: &str) -> ServoResponse {
    match outcome {
        MoveOutcome::Moved { angle } => ServoResponse {
            message: format!("Servo {servo_id} {verb} {angle}°"),
            servo_id: Some(servo_id),
            angle: Some(angle),
        },
        MoveOutcome::Released => ServoResponse {
            message: format!("Servo {servo_id} released (hold mode is release, move skipped)"),
            servo_id: Some(servo_id),
            angle: None,
        },
    }
}

// ============================================================================
// Information
// ============================================================================

/// API information and endpoint listing
#[utoipa::path(
    get,
    path = "/",
    tag = "info",
    responses(
        (status = 200, description = "API information", body = ApiInfo),
    )
)]
pub async fn root_handler() -> Json<ApiInfo> {
    let endpoint = |method, path, description| EndpointInfo {
        method,
        path,
        description,
    };
    Json(ApiInfo {
        message: "Servo Control API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            endpoint("GET", "/api/servos", "List all servos"),
            endpoint("GET", "/api/servos/status", "Status of every servo, keyed servo_<id>"),
            endpoint("GET", "/api/servos/{servo_id}/status", "Status of one servo"),
            endpoint("POST", "/api/servos/{servo_id}/move", "Move one servo"),
            endpoint("POST", "/api/servos/move-all", "Move every servo"),
            endpoint("POST", "/api/servos/{servo_id}/center", "Center one servo"),
            endpoint("POST", "/api/servos/center-all", "Center every servo"),
            endpoint("POST", "/api/servos/{servo_id}/hold", "Attach and hold one servo"),
            endpoint("POST", "/api/servos/{servo_id}/release", "Detach one servo"),
            endpoint("POST", "/api/servos/hold-all", "Attach and hold every servo"),
            endpoint("POST", "/api/servos/release-all", "Detach every servo"),
            endpoint("GET", "/api/config", "Current servo configuration"),
            endpoint("PUT", "/api/config", "Update configuration and re-initialize"),
            endpoint("GET", "/ws", "WebSocket status push and commands"),
            endpoint("GET", "/health", "Health check"),
            endpoint("GET", "/docs", "Swagger UI"),
        ],
    })
}

/// Health check endpoint for monitoring
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthCheck),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthCheck> {
    let status = state.registry.status().await;
    let config = state.registry.config().await;
    Json(HealthCheck {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        servos: status.len(),
        active: status.values().filter(|s| s.is_active).count(),
        hold_mode: config.hold_mode.to_string(),
    })
}

// ============================================================================
// Status
// ============================================================================

/// List every servo, ordered by id
#[utoipa::path(
    get,
    path = "/api/servos",
    tag = "status",
    responses(
        (status = 200, description = "All servos", body = ApiResponse<Vec<ServoStatus>>),
    ),
    security(("api_key" = []))
)]
pub async fn list_servos_handler(State(state): State<AppState>) -> ApiResult<Vec<ServoStatus>> {
    let status = state.registry.status().await;
    ok(status.values().map(ServoStatus::from).collect())
}

/// Status of every servo keyed `servo_<id>`
#[utoipa::path(
    get,
    path = "/api/servos/status",
    tag = "status",
    responses(
        (status = 200, description = "Status map", body = ApiResponse<BTreeMap<String, ServoStatus>>),
    ),
    security(("api_key" = []))
)]
pub async fn all_status_handler(
    State(state): State<AppState>,
) -> ApiResult<BTreeMap<String, ServoStatus>> {
    let status = state.registry.status().await;
    ok(status
        .iter()
        .map(|(id, servo)| (format!("servo_{id}"), ServoStatus::from(servo)))
        .collect())
}

/// Status of one servo
#[utoipa::path(
    get,
    path = "/api/servos/{servo_id}/status",
    tag = "status",
    params(("servo_id" = u32, Path, description = "Servo id")),
    responses(
        (status = 200, description = "Servo status", body = ApiResponse<ServoStatus>),
        (status = 404, description = "Unknown servo", body = ApiResponse<()>),
    ),
    security(("api_key" = []))
)]
pub async fn servo_status_handler(
    State(state): State<AppState>,
    Path(servo_id): Path<ServoId>,
) -> ApiResult<ServoStatus> {
    match state.registry.status_of(servo_id).await {
        Ok(servo) => ok(ServoStatus::from(&servo)),
        Err(err) => failure(&err),
    }
}

// ============================================================================
// Motion
// ============================================================================

/// Move one servo
#[utoipa::path(
    post,
    path = "/api/servos/{servo_id}/move",
    tag = "motion",
    params(("servo_id" = u32, Path, description = "Servo id")),
    request_body = MoveRequest,
    responses(
        (status = 200, description = "Servo moved", body = ApiResponse<ServoResponse>),
        (status = 400, description = "Angle out of range", body = ApiResponse<()>),
        (status = 404, description = "Unknown servo", body = ApiResponse<()>),
        (status = 409, description = "Servo inactive", body = ApiResponse<()>),
        (status = 500, description = "Hardware fault", body = ApiResponse<()>),
    ),
    security(("api_key" = []))
)]
pub async fn move_servo_handler(
    State(state): State<AppState>,
    Path(servo_id): Path<ServoId>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<ServoResponse> {
    let angle = match ServoAngle::new(req.angle) {
        Ok(angle) => angle,
        Err(err) => return failure(&err),
    };
    match state
        .registry
        .move_one(servo_id, i32::from(angle.degrees()))
        .await
    {
        Ok(outcome) => ok(moved(servo_id, outcome, "moved to")),
        Err(err) => failure(&err),
    }
}

/// Move every servo to the same angle
#[utoipa::path(
    post,
    path = "/api/servos/move-all",
    tag = "motion",
    request_body = MoveRequest,
    responses(
        (status = 200, description = "All servos moved", body = ApiResponse<BulkResult>),
        (status = 207, description = "Some servos failed", body = ApiResponse<BulkResult>),
        (status = 400, description = "Angle out of range", body = ApiResponse<()>),
    ),
    security(("api_key" = []))
)]
pub async fn move_all_handler(
    State(state): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<BulkResult> {
    let angle = match ServoAngle::new(req.angle) {
        Ok(angle) => angle,
        Err(err) => return failure(&err),
    };
    let report = state.registry.move_all(i32::from(angle.degrees())).await;
    bulk(report, Some(angle.degrees()), &format!("moved to {angle}"))
}

/// Move one servo to 90°
#[utoipa::path(
    post,
    path = "/api/servos/{servo_id}/center",
    tag = "motion",
    params(("servo_id" = u32, Path, description = "Servo id")),
    responses(
        (status = 200, description = "Servo centered", body = ApiResponse<ServoResponse>),
        (status = 404, description = "Unknown servo", body = ApiResponse<()>),
        (status = 409, description = "Servo inactive", body = ApiResponse<()>),
    ),
    security(("api_key" = []))
)]
pub async fn center_servo_handler(
    State(state): State<AppState>,
    Path(servo_id): Path<ServoId>,
) -> ApiResult<ServoResponse> {
    match state.registry.center_one(servo_id).await {
        Ok(outcome) => ok(moved(servo_id, outcome, "centered at")),
        Err(err) => failure(&err),
    }
}

/// Move every servo to 90°
#[utoipa::path(
    post,
    path = "/api/servos/center-all",
    tag = "motion",
    responses(
        (status = 200, description = "All servos centered", body = ApiResponse<BulkResult>),
        (status = 207, description = "Some servos failed", body = ApiResponse<BulkResult>),
    ),
    security(("api_key" = []))
)]
pub async fn center_all_handler(State(state): State<AppState>) -> ApiResult<BulkResult> {
    let report = state.registry.center_all().await;
    let center = ServoAngle::center();
    bulk(report, Some(center.degrees()), &format!("centered at {center}"))
}

// ============================================================================
// Hold / release
// ============================================================================

/// Attach one servo and hold its position
#[utoipa::path(
    post,
    path = "/api/servos/{servo_id}/hold",
    tag = "hold",
    params(("servo_id" = u32, Path, description = "Servo id")),
    responses(
        (status = 200, description = "Servo holding", body = ApiResponse<ServoResponse>),
        (status = 404, description = "Unknown servo", body = ApiResponse<()>),
        (status = 409, description = "Servo inactive", body = ApiResponse<()>),
    ),
    security(("api_key" = []))
)]
pub async fn hold_servo_handler(
    State(state): State<AppState>,
    Path(servo_id): Path<ServoId>,
) -> ApiResult<ServoResponse> {
    match state.registry.hold_one(servo_id).await {
        Ok(()) => ok(ServoResponse {
            message: format!("Servo {servo_id} holding position"),
            servo_id: Some(servo_id),
            angle: None,
        }),
        Err(err) => failure(&err),
    }
}

/// Detach one servo
#[utoipa::path(
    post,
    path = "/api/servos/{servo_id}/release",
    tag = "hold",
    params(("servo_id" = u32, Path, description = "Servo id")),
    responses(
        (status = 200, description = "Servo released", body = ApiResponse<ServoResponse>),
        (status = 404, description = "Unknown servo", body = ApiResponse<()>),
        (status = 409, description = "Servo inactive", body = ApiResponse<()>),
    ),
    security(("api_key" = []))
)]
pub async fn release_servo_handler(
    State(state): State<AppState>,
    Path(servo_id): Path<ServoId>,
) -> ApiResult<ServoResponse> {
    match state.registry.release_one(servo_id).await {
        Ok(()) => ok(ServoResponse {
            message: format!("Servo {servo_id} released"),
            servo_id: Some(servo_id),
            angle: None,
        }),
        Err(err) => failure(&err),
    }
}

/// Attach and hold every servo
#[utoipa::path(
    post,
    path = "/api/servos/hold-all",
    tag = "hold",
    responses(
        (status = 200, description = "All servos holding", body = ApiResponse<BulkResult>),
        (status = 207, description = "Some servos failed", body = ApiResponse<BulkResult>),
    ),
    security(("api_key" = []))
)]
pub async fn hold_all_handler(State(state): State<AppState>) -> ApiResult<BulkResult> {
    bulk(state.registry.hold_all().await, None, "holding")
}

/// Detach every servo
#[utoipa::path(
    post,
    path = "/api/servos/release-all",
    tag = "hold",
    responses(
        (status = 200, description = "All servos released", body = ApiResponse<BulkResult>),
        (status = 207, description = "Some servos failed", body = ApiResponse<BulkResult>),
    ),
    security(("api_key" = []))
)]
pub async fn release_all_handler(State(state): State<AppState>) -> ApiResult<BulkResult> {
    bulk(state.registry.release_all().await, None, "released")
}

// ============================================================================
// Configuration
// ============================================================================

/// Current servo configuration
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    responses(
        (status = 200, description = "Active configuration", body = ApiResponse<ServoConfigView>),
    ),
    security(("api_key" = []))
)]
pub async fn get_config_handler(State(state): State<AppState>) -> ApiResult<ServoConfigView> {
    ok(ServoConfigView::from(&state.registry.config().await))
}

/// Update configuration; every servo is re-initialized with the result
#[utoipa::path(
    put,
    path = "/api/config",
    tag = "config",
    request_body = ConfigUpdateRequest,
    responses(
        (status = 200, description = "Configuration applied", body = ApiResponse<ServoConfigView>),
        (status = 400, description = "Invalid configuration, nothing changed", body = ApiResponse<()>),
    ),
    security(("api_key" = []))
)]
pub async fn update_config_handler(
    State(state): State<AppState>,
    Json(req): Json<ConfigUpdateRequest>,
) -> ApiResult<ServoConfigView> {
    match state.registry.update_config(req.into()).await {
        Ok(config) => {
            tracing::info!(hold_mode = %config.hold_mode, "configuration updated via API");
            ok(ServoConfigView::from(&config))
        }
        Err(err) => failure(&err),
    }
}

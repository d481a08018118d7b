//! Route configuration for the servo API

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, ws, AppState};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))

        // Status endpoints
        .route("/api/servos", get(handlers::list_servos_handler))
        .route("/api/servos/status", get(handlers::all_status_handler))
        .route("/api/servos/:servo_id/status", get(handlers::servo_status_handler))

        // Motion endpoints
        .route("/api/servos/:servo_id/move", post(handlers::move_servo_handler))
        .route("/api/servos/move-all", post(handlers::move_all_handler))
        .route("/api/servos/:servo_id/center", post(handlers::center_servo_handler))
        .route("/api/servos/center-all", post(handlers::center_all_handler))

        // Hold / release endpoints
        .route("/api/servos/:servo_id/hold", post(handlers::hold_servo_handler))
        .route("/api/servos/:servo_id/release", post(handlers::release_servo_handler))
        .route("/api/servos/hold-all", post(handlers::hold_all_handler))
        .route("/api/servos/release-all", post(handlers::release_all_handler))

        // Configuration
        .route(
            "/api/config",
            get(handlers::get_config_handler).put(handlers::update_config_handler),
        )

        // Push channel
        .route("/ws", get(ws::ws_handler))

        // Health check
        .route("/health", get(handlers::health_handler))
        .with_state(state)
}

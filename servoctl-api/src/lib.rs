//! Servo Control REST + WebSocket API
//!
//! Exposes a [`ServoRegistry`] over HTTP and a WebSocket push channel.
//!
//! ## Features
//! - API Key Authentication (optional, via X-API-Key header)
//! - Rate Limiting (configurable requests per second)
//! - OpenAPI/Swagger documentation at /docs
//! - Status snapshots pushed to every `/ws` client after each mutation
//!
//! ## Environment Variables
//! - `SERVOCTL_API_HOST`: Host to bind to (default: 0.0.0.0)
//! - `SERVOCTL_API_PORT`: Port to listen on (default: 8004)
//! - `SERVOCTL_PINS`: Comma-separated BCM GPIO pins (default: 13,6,19,26)
//! - `SERVOCTL_API_KEYS`: Comma-separated list of valid API keys (empty = no auth)
//! - `SERVOCTL_API_RATE_LIMIT`: Requests per second (default: 10)
//! - `SERVOCTL_API_RATE_BURST`: Burst size (default: 20)
//! - `SERVOCTL_API_RATE_ENABLED`: Enable rate limiting (default: true)

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod ws;

use std::sync::Arc;

use axum::{middleware as axum_middleware, Router};
use servoctl_actuator::ServoRegistry;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use middleware::{auth_middleware, rate_limit_middleware, ApiKeyConfig, RateLimitConfig};
use openapi::ApiDoc;

/// Request bodies are tiny JSON documents
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: ServoRegistry,
}

impl AppState {
    pub fn new(registry: ServoRegistry) -> Self {
        Self { registry }
    }
}

/// Cross-cutting layers applied around the API routes
#[derive(Clone, Debug, Default)]
pub struct AppOptions {
    pub auth: ApiKeyConfig,
    pub rate_limit: RateLimitConfig,
    /// Allow any origin
    pub cors: bool,
}

impl AppOptions {
    /// Auth and rate limits from `SERVOCTL_API_*` environment variables
    pub fn from_env() -> Self {
        Self {
            auth: ApiKeyConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            cors: false,
        }
    }
}

/// Build the full application: routes, Swagger UI and middleware stack
pub fn build_app(state: AppState, options: AppOptions) -> Router {
    let mut app = routes::create_router(state);

    // Add Swagger UI
    app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // Add rate limiting middleware
    let limiter = options.rate_limit.create_limiter();
    app = app.layer(axum_middleware::from_fn_with_state(
        (limiter, options.rate_limit.clone()),
        rate_limit_middleware,
    ));

    // Add authentication middleware
    app = app.layer(axum_middleware::from_fn_with_state(
        Arc::new(options.auth),
        auth_middleware,
    ));

    app = app.layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    if options.cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http())
}

//! Middleware for authentication and rate limiting

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

use crate::models::{ApiError, ApiResponse};

/// Paths that never require a key or count against the rate limit
fn is_public(path: &str) -> bool {
    path == "/" || path == "/health" || path.starts_with("/docs") || path.starts_with("/api-docs")
}

// ============================================================================
// API Key Authentication
// ============================================================================

/// API key configuration
#[derive(Clone, Debug, Default)]
pub struct ApiKeyConfig {
    /// Valid API keys (empty = no authentication required)
    pub keys: Vec<String>,
    /// Whether authentication is enabled
    pub enabled: bool,
}

impl ApiKeyConfig {
    /// Create config from `SERVOCTL_API_KEYS` (comma-separated)
    pub fn from_env() -> Self {
        Self::from_keys(&std::env::var("SERVOCTL_API_KEYS").unwrap_or_default())
    }

    pub fn from_keys(keys_str: &str) -> Self {
        let keys: Vec<String> = keys_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            enabled: !keys.is_empty(),
            keys,
        }
    }

    /// Check if a key is valid
    pub fn is_valid(&self, key: &str) -> bool {
        if !self.enabled {
            return true;
        }
        self.keys.iter().any(|k| k == key)
    }
}

fn unauthorized(message: &str, help: &str) -> Response {
    let error = ApiResponse::<()>::error(ApiError::new("UNAUTHORIZED", message).with_help(help));
    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Authentication middleware
pub async fn auth_middleware(
    State(config): State<Arc<ApiKeyConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !config.enabled || is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let api_key = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());

    match api_key {
        Some(key) if config.is_valid(key) => next.run(request).await,
        Some(_) => unauthorized(
            "Invalid API key",
            "Provide a valid API key in the X-API-Key header",
        ),
        None => unauthorized(
            "API key required",
            "Provide an API key in the X-API-Key header",
        ),
    }
}

// ============================================================================
// Rate Limiting
// ============================================================================

/// Rate limiter type alias
pub type AppRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter configuration
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Requests per second
    pub requests_per_second: u32,
    /// Burst size
    pub burst_size: u32,
    /// Whether rate limiting is enabled
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    /// Create config from `SERVOCTL_API_RATE_LIMIT`, `SERVOCTL_API_RATE_BURST`
    /// and `SERVOCTL_API_RATE_ENABLED`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let rps = lookup("SERVOCTL_API_RATE_LIMIT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.requests_per_second);

        let burst = lookup("SERVOCTL_API_RATE_BURST")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.burst_size);

        let enabled = lookup("SERVOCTL_API_RATE_ENABLED")
            .map(|s| s != "false" && s != "0")
            .unwrap_or(defaults.enabled);

        Self {
            requests_per_second: rps,
            burst_size: burst,
            enabled,
        }
    }

    /// Create a rate limiter from this config; zero values are raised to one
    pub fn create_limiter(&self) -> Arc<AppRateLimiter> {
        let rps = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(NonZeroU32::MIN);
        Arc::new(RateLimiter::direct(Quota::per_second(rps).allow_burst(burst)))
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State((limiter, config)): State<(Arc<AppRateLimiter>, RateLimitConfig)>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !config.enabled || is_public(request.uri().path()) {
        return next.run(request).await;
    }

    match limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            let error = ApiResponse::<()>::error(
                ApiError::new("RATE_LIMITED", "Too many requests").with_help(format!(
                    "Rate limit: {} requests/second, burst: {}",
                    config.requests_per_second, config.burst_size
                )),
            );
            (StatusCode::TOO_MANY_REQUESTS, Json(error)).into_response()
        }
    }
}

//! OpenAPI documentation configuration

use utoipa::OpenApi;

use crate::handlers;
use crate::models::*;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Servo Control API",
        version = "2026.1.16",
        description = "REST API for hobby servos on Raspberry Pi GPIO - move, center, hold and release servos, and tune pulse widths, hold policy and smoothing",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html"),
        contact(name = "Silvano Neto", email = "dev@silvanoneto.com")
    ),
    servers(
        (url = "http://localhost:8004", description = "Local server")
    ),
    tags(
        (name = "info", description = "API information"),
        (name = "status", description = "Servo state"),
        (name = "motion", description = "Move and center servos"),
        (name = "hold", description = "Attach or detach servo output"),
        (name = "config", description = "Pulse widths, hold policy and smoothing"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        handlers::root_handler,
        handlers::health_handler,
        handlers::list_servos_handler,
        handlers::all_status_handler,
        handlers::servo_status_handler,
        handlers::move_servo_handler,
        handlers::move_all_handler,
        handlers::center_servo_handler,
        handlers::center_all_handler,
        handlers::hold_servo_handler,
        handlers::release_servo_handler,
        handlers::hold_all_handler,
        handlers::release_all_handler,
        handlers::get_config_handler,
        handlers::update_config_handler,
    ),
    components(
        schemas(
            MoveRequest,
            ConfigUpdateRequest,
            ApiError,
            ServoStatus,
            ServoResponse,
            BulkResult,
            ServoConfigView,
            EndpointInfo,
            ApiInfo,
            HealthCheck,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security addon for API key authentication
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-API-Key"),
                    ),
                ),
            );
        }
    }
}

//! Data models for API requests and responses

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use servoctl_actuator::{
    BulkReport, ConfigUpdate, ServoConfig, ServoError, ServoId, ServoState,
};
use utoipa::ToSchema;

// ============================================================================
// Request Models
// ============================================================================

/// Request body for move endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveRequest {
    /// Target angle in degrees (0-180)
    #[schema(example = 45, minimum = 0, maximum = 180)]
    pub angle: i64,
}

/// Partial configuration change; omitted fields keep their current value.
///
/// Mirrors [`ConfigUpdate`] so the OpenAPI schema stays in this crate and the
/// actuator does not depend on utoipa. `test_config_request_matches_core`
/// keeps the two in step.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdateRequest {
    /// Pulse width at 0° in seconds
    #[serde(default)]
    #[schema(example = 0.0005)]
    pub min_pulse_width: Option<f64>,

    /// Pulse width at 180° in seconds
    #[serde(default)]
    #[schema(example = 0.0025)]
    pub max_pulse_width: Option<f64>,

    /// One of `auto`, `hold`, `release`
    #[serde(default)]
    #[schema(example = "auto")]
    pub hold_mode: Option<String>,

    /// Whether `auto` mode detaches after `hold_time`
    #[serde(default)]
    pub detach_enabled: Option<bool>,

    /// Seconds to hold before auto-detach
    #[serde(default)]
    #[schema(example = 1.0)]
    pub hold_time: Option<f64>,

    /// Step through intermediate angles
    #[serde(default)]
    pub smooth_enabled: Option<bool>,

    /// Number of steps (3-50)
    #[serde(default)]
    #[schema(example = 10)]
    pub smooth_steps: Option<u32>,

    /// Seconds between steps (0.01-0.2)
    #[serde(default)]
    #[schema(example = 0.02)]
    pub smooth_delay: Option<f64>,
}

impl From<ConfigUpdateRequest> for ConfigUpdate {
    fn from(req: ConfigUpdateRequest) -> Self {
        ConfigUpdate {
            min_pulse_width: req.min_pulse_width,
            max_pulse_width: req.max_pulse_width,
            hold_mode: req.hold_mode,
            detach_enabled: req.detach_enabled,
            hold_time: req.hold_time,
            smooth_enabled: req.smooth_enabled,
            smooth_steps: req.smooth_steps,
            smooth_delay: req.smooth_delay,
        }
    }
}

// ============================================================================
// Response Models
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the operation fully succeeded
    pub success: bool,

    /// Response data (present on success and on partial success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Error information (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Data for an operation where some servos failed
    pub fn partial(data: T) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error information in API responses
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ApiError {
    /// Stable error code (e.g., "NOT_FOUND", "INACTIVE")
    #[schema(example = "NOT_FOUND")]
    pub code: String,

    /// Human-readable error message
    #[schema(example = "Servo 7 not found")]
    pub message: String,

    /// Helpful suggestion for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl From<&ServoError> for ApiError {
    fn from(err: &ServoError) -> Self {
        let error = ApiError::new(err.code(), err.to_string());
        match err {
            ServoError::NotFound(_) => error.with_help("List servos with GET /api/servos"),
            ServoError::Inactive(_) => {
                error.with_help("The servo failed hardware initialization; update the config to re-initialize")
            }
            ServoError::InvalidAngle(_) => error.with_help("Use an integer angle between 0 and 180"),
            _ => error,
        }
    }
}

/// Status of one servo
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ServoStatus {
    #[schema(example = 1)]
    pub servo_id: ServoId,

    /// BCM GPIO number
    #[schema(example = 13)]
    pub gpio_pin: u8,

    /// Last commanded angle, null until known
    #[schema(example = 90)]
    pub current_angle: Option<u8>,

    /// False if hardware initialization failed
    pub is_active: bool,

    /// Local time of the last successful move
    #[schema(example = "2026-01-16 08:30:00")]
    pub last_updated: Option<String>,

    /// Whether PWM is currently emitted
    pub attached: bool,
}

impl From<&ServoState> for ServoStatus {
    fn from(state: &ServoState) -> Self {
        Self {
            servo_id: state.servo_id,
            gpio_pin: state.gpio_pin,
            current_angle: state.current_angle,
            is_active: state.is_active,
            last_updated: state.last_updated_display(),
            attached: state.attached,
        }
    }
}

/// Single-servo command result
#[derive(Debug, Serialize, ToSchema)]
pub struct ServoResponse {
    #[schema(example = "Servo 2 moved to 45°")]
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 2)]
    pub servo_id: Option<ServoId>,

    /// Applied angle; absent when the move was skipped in release mode
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 45)]
    pub angle: Option<u8>,
}

/// Result of an operation applied to every servo
#[derive(Debug, Serialize, ToSchema)]
pub struct BulkResult {
    #[schema(example = "All servos moved to 90°. Affected servos: [1, 2, 3]")]
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 90)]
    pub angle: Option<u8>,

    /// Ids that succeeded
    pub succeeded: Vec<ServoId>,

    /// Error message per failed id
    pub errors: BTreeMap<String, String>,
}

impl BulkResult {
    pub fn from_report(report: &BulkReport, angle: Option<u8>, message: String) -> Self {
        Self {
            message,
            angle,
            succeeded: report.succeeded.clone(),
            errors: report
                .failed
                .iter()
                .map(|(id, err)| (id.to_string(), err.to_string()))
                .collect(),
        }
    }
}

/// Active servo configuration
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ServoConfigView {
    #[schema(example = 0.0005)]
    pub min_pulse_width: f64,
    #[schema(example = 0.0025)]
    pub max_pulse_width: f64,
    #[schema(example = "auto")]
    pub hold_mode: String,
    pub detach_enabled: bool,
    #[schema(example = 1.0)]
    pub hold_time: f64,
    pub smooth_enabled: bool,
    #[schema(example = 10)]
    pub smooth_steps: u32,
    #[schema(example = 0.02)]
    pub smooth_delay: f64,
}

impl From<&ServoConfig> for ServoConfigView {
    fn from(config: &ServoConfig) -> Self {
        Self {
            min_pulse_width: config.min_pulse_width,
            max_pulse_width: config.max_pulse_width,
            hold_mode: config.hold_mode.as_str().to_string(),
            detach_enabled: config.detach_enabled,
            hold_time: config.hold_time,
            smooth_enabled: config.smooth_enabled,
            smooth_steps: config.smooth_steps,
            smooth_delay: config.smooth_delay,
        }
    }
}

/// One entry of the endpoint listing
#[derive(Debug, Serialize, ToSchema)]
pub struct EndpointInfo {
    #[schema(example = "POST")]
    pub method: &'static str,
    #[schema(example = "/api/servos/{servo_id}/move")]
    pub path: &'static str,
    pub description: &'static str,
}

/// API information
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiInfo {
    #[schema(example = "Servo Control API")]
    pub message: &'static str,

    #[schema(example = "2026.1.16")]
    pub version: &'static str,

    pub endpoints: Vec<EndpointInfo>,
}

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthCheck {
    /// Service status
    #[schema(example = "healthy")]
    pub status: &'static str,

    /// Service version
    #[schema(example = "2026.1.16")]
    pub version: &'static str,

    /// Configured servos
    #[schema(example = 4)]
    pub servos: usize,

    /// Servos whose hardware initialized
    #[schema(example = 4)]
    pub active: usize,

    /// Current hold mode
    #[schema(example = "auto")]
    pub hold_mode: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_request_matches_core() {
        let body = r#"{
            "min_pulse_width": 0.0006,
            "max_pulse_width": 0.0024,
            "hold_mode": "hold",
            "detach_enabled": false,
            "hold_time": 2.5,
            "smooth_enabled": true,
            "smooth_steps": 12,
            "smooth_delay": 0.05
        }"#;
        let request: ConfigUpdateRequest = serde_json::from_str(body).unwrap();
        let core: ConfigUpdate = serde_json::from_str(body).unwrap();
        assert_eq!(ConfigUpdate::from(request), core);
    }

    #[test]
    fn test_config_request_rejects_unknown_fields() {
        assert!(serde_json::from_str::<ConfigUpdateRequest>(r#"{"speed": 3}"#).is_err());
        assert!(serde_json::from_str::<ConfigUpdate>(r#"{"speed": 3}"#).is_err());
    }
}

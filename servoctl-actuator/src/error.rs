//! Servo layer errors

use thiserror::Error;

use crate::types::ServoId;

pub type ServoResult<T> = Result<T, ServoError>;

/// Errors surfaced by servo operations.
///
/// Every variant maps to a stable [`code`](ServoError::code) so transports can
/// tell "not found" from "hardware fault" from "bad input".
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServoError {
    /// Channel could not be opened; the servo stays inactive until re-initialized
    #[error("Hardware initialization failed on GPIO {gpio}: {reason}")]
    HardwareInit { gpio: u8, reason: String },

    /// Unknown servo id
    #[error("Servo {0} not found")]
    NotFound(ServoId),

    /// Servo failed initialization or was torn down
    #[error("Servo {0} is not active")]
    Inactive(ServoId),

    /// Device raised while writing a pulse
    #[error("Hardware write failed on servo {servo_id}: {reason}")]
    HardwareWrite { servo_id: ServoId, reason: String },

    /// Rejected configuration; nothing was applied
    #[error("Invalid configuration: {0}")]
    ConfigValidation(#[from] ConfigError),

    /// Angle outside 0-180°
    #[error("Angle must be between 0 and 180 degrees, got {0}")]
    InvalidAngle(i64),

    /// The runtime stopped before the operation could finish
    #[error("Servo controller is shutting down")]
    ShuttingDown,
}

impl ServoError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ServoError::HardwareInit { .. } => "HARDWARE_INIT_ERROR",
            ServoError::NotFound(_) => "NOT_FOUND",
            ServoError::Inactive(_) => "INACTIVE",
            ServoError::HardwareWrite { .. } => "HARDWARE_WRITE_ERROR",
            ServoError::ConfigValidation(_) => "CONFIG_VALIDATION_ERROR",
            ServoError::InvalidAngle(_) => "INVALID_ANGLE",
            ServoError::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}

/// Configuration validation failures, one per offending field
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("hold_mode must be one of auto, hold, release (got {0:?})")]
    HoldMode(String),

    #[error("{field} must be within {min}..={max} seconds (got {value})")]
    PulseWidth {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("min_pulse_width ({min}) must be less than max_pulse_width ({max})")]
    InvertedPulseRange { min: f64, max: f64 },

    #[error("hold_time must be greater than 0 and at most {max} seconds (got {value})")]
    HoldTime { value: f64, max: f64 },

    #[error("smooth_steps must be within {min}..={max} (got {value})")]
    SmoothSteps { value: u32, min: u32, max: u32 },

    #[error("smooth_delay must be within {min}..={max} seconds (got {value})")]
    SmoothDelay { value: f64, min: f64, max: f64 },
}

/// Backend-level PWM failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("GPIO {gpio} unavailable: {reason}")]
    Unavailable { gpio: u8, reason: String },

    #[error("PWM output on GPIO {gpio} failed: {reason}")]
    Output { gpio: u8, reason: String },
}

impl DeviceError {
    pub fn gpio(&self) -> u8 {
        match self {
            DeviceError::Unavailable { gpio, .. } | DeviceError::Output { gpio, .. } => *gpio,
        }
    }

    pub(crate) fn into_init_error(self) -> ServoError {
        ServoError::HardwareInit {
            gpio: self.gpio(),
            reason: self.to_string(),
        }
    }

    pub(crate) fn into_write_error(self, servo_id: ServoId) -> ServoError {
        ServoError::HardwareWrite {
            servo_id,
            reason: self.to_string(),
        }
    }
}

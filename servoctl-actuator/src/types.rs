//! Core value types: servo ids, angles, hold modes and the angle-to-value mapping

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ServoError, ServoResult};

/// Logical servo id, assigned from 1 in configuration order
pub type ServoId = u32;

pub const MIN_ANGLE: u8 = 0;
pub const MAX_ANGLE: u8 = 180;
pub const CENTER_ANGLE: u8 = 90;

/// Validated servo angle in degrees (0 to 180)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct ServoAngle(u8);

impl ServoAngle {
    /// Validates an angle coming from outside; out-of-range values are rejected
    pub fn new(angle: i64) -> ServoResult<Self> {
        if !(MIN_ANGLE as i64..=MAX_ANGLE as i64).contains(&angle) {
            return Err(ServoError::InvalidAngle(angle));
        }
        Ok(Self(angle as u8))
    }

    pub const fn center() -> Self {
        Self(CENTER_ANGLE)
    }

    pub const fn degrees(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for ServoAngle {
    type Error = ServoError;

    fn try_from(angle: i64) -> Result<Self, Self::Error> {
        Self::new(angle)
    }
}

impl From<ServoAngle> for u8 {
    fn from(angle: ServoAngle) -> Self {
        angle.0
    }
}

impl fmt::Display for ServoAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

/// Clamps any requested angle into 0-180°
pub fn clamp_angle(angle: i32) -> u8 {
    angle.clamp(MIN_ANGLE as i32, MAX_ANGLE as i32) as u8
}

/// Maps a clamped angle to the normalized actuation value in `[-1.0, 1.0]`.
///
/// 0° → -1.0, 90° → 0.0, 180° → +1.0. Center point and range live here and
/// nowhere else.
pub fn map_angle_to_value(angle: u8) -> f64 {
    (f64::from(angle) - f64::from(CENTER_ANGLE)) / f64::from(CENTER_ANGLE)
}

/// What happens to the PWM signal once a move completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldMode {
    /// Hold briefly, then detach after `hold_time`
    #[default]
    Auto,
    /// Keep emitting PWM indefinitely
    Hold,
    /// Never drive the servo; moves are skipped and the channel stays detached
    Release,
}

impl HoldMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HoldMode::Auto => "auto",
            HoldMode::Hold => "hold",
            HoldMode::Release => "release",
        }
    }
}

impl fmt::Display for HoldMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(HoldMode::Auto),
            "hold" => Ok(HoldMode::Hold),
            "release" => Ok(HoldMode::Release),
            other => Err(ConfigError::HoldMode(other.to_string())),
        }
    }
}

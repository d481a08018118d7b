//! Process-wide servo configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::PulseWidthRange;
use crate::error::ConfigError;
use crate::types::HoldMode;

/// Physically safe pulse-width window (seconds)
pub const PULSE_WIDTH_FLOOR: f64 = 0.0002;
pub const PULSE_WIDTH_CEILING: f64 = 0.003;

pub const MAX_HOLD_TIME: f64 = 3600.0;

pub const SMOOTH_STEPS_MIN: u32 = 3;
pub const SMOOTH_STEPS_MAX: u32 = 50;

pub const SMOOTH_DELAY_MIN: f64 = 0.01;
pub const SMOOTH_DELAY_MAX: f64 = 0.2;

/// Servo configuration shared by every channel.
///
/// Always validated as a unit with [`ServoConfig::validate`] before being
/// applied to a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoConfig {
    /// Pulse width at 0° (seconds)
    pub min_pulse_width: f64,
    /// Pulse width at 180° (seconds)
    pub max_pulse_width: f64,
    pub hold_mode: HoldMode,
    /// Whether `auto` mode detaches after `hold_time`
    pub detach_enabled: bool,
    /// Seconds to keep holding before an automatic detach
    pub hold_time: f64,
    pub smooth_enabled: bool,
    /// Interpolated writes per smoothed move
    pub smooth_steps: u32,
    /// Seconds between smoothed writes
    pub smooth_delay: f64,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            min_pulse_width: 0.0005,
            max_pulse_width: 0.0025,
            hold_mode: HoldMode::Auto,
            detach_enabled: true,
            hold_time: 1.0,
            smooth_enabled: false,
            smooth_steps: 10,
            smooth_delay: 0.02,
        }
    }
}

impl ServoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_pulse_width("min_pulse_width", self.min_pulse_width)?;
        check_pulse_width("max_pulse_width", self.max_pulse_width)?;
        if self.min_pulse_width >= self.max_pulse_width {
            return Err(ConfigError::InvertedPulseRange {
                min: self.min_pulse_width,
                max: self.max_pulse_width,
            });
        }

        if !(self.hold_time.is_finite() && self.hold_time > 0.0 && self.hold_time <= MAX_HOLD_TIME) {
            return Err(ConfigError::HoldTime {
                value: self.hold_time,
                max: MAX_HOLD_TIME,
            });
        }

        if !(SMOOTH_STEPS_MIN..=SMOOTH_STEPS_MAX).contains(&self.smooth_steps) {
            return Err(ConfigError::SmoothSteps {
                value: self.smooth_steps,
                min: SMOOTH_STEPS_MIN,
                max: SMOOTH_STEPS_MAX,
            });
        }

        if !(SMOOTH_DELAY_MIN..=SMOOTH_DELAY_MAX).contains(&self.smooth_delay) {
            return Err(ConfigError::SmoothDelay {
                value: self.smooth_delay,
                min: SMOOTH_DELAY_MIN,
                max: SMOOTH_DELAY_MAX,
            });
        }

        Ok(())
    }

    pub fn pulse_range(&self) -> PulseWidthRange {
        PulseWidthRange::from_secs(self.min_pulse_width, self.max_pulse_width)
    }

    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs_f64(self.hold_time)
    }

    pub fn smooth_delay_duration(&self) -> Duration {
        Duration::from_secs_f64(self.smooth_delay)
    }
}

fn check_pulse_width(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(PULSE_WIDTH_FLOOR..=PULSE_WIDTH_CEILING).contains(&value) {
        return Err(ConfigError::PulseWidth {
            field,
            value,
            min: PULSE_WIDTH_FLOOR,
            max: PULSE_WIDTH_CEILING,
        });
    }
    Ok(())
}

/// Partial configuration change; absent fields keep their current value.
///
/// `hold_mode` stays a string here so an unknown mode surfaces as a
/// [`ConfigError::HoldMode`] instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub min_pulse_width: Option<f64>,
    #[serde(default)]
    pub max_pulse_width: Option<f64>,
    #[serde(default)]
    pub hold_mode: Option<String>,
    #[serde(default)]
    pub detach_enabled: Option<bool>,
    #[serde(default)]
    pub hold_time: Option<f64>,
    #[serde(default)]
    pub smooth_enabled: Option<bool>,
    #[serde(default)]
    pub smooth_steps: Option<u32>,
    #[serde(default)]
    pub smooth_delay: Option<f64>,
}

impl ConfigUpdate {
    /// Merges this update over `base` and validates the result; `base` is never touched
    pub fn apply_to(&self, base: &ServoConfig) -> Result<ServoConfig, ConfigError> {
        let hold_mode = match self.hold_mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => base.hold_mode,
        };

        let merged = ServoConfig {
            min_pulse_width: self.min_pulse_width.unwrap_or(base.min_pulse_width),
            max_pulse_width: self.max_pulse_width.unwrap_or(base.max_pulse_width),
            hold_mode,
            detach_enabled: self.detach_enabled.unwrap_or(base.detach_enabled),
            hold_time: self.hold_time.unwrap_or(base.hold_time),
            smooth_enabled: self.smooth_enabled.unwrap_or(base.smooth_enabled),
            smooth_steps: self.smooth_steps.unwrap_or(base.smooth_steps),
            smooth_delay: self.smooth_delay.unwrap_or(base.smooth_delay),
        };
        merged.validate()?;
        Ok(merged)
    }
}

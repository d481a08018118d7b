//! Observable per-servo state

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

use crate::types::{CENTER_ANGLE, ServoId};

/// Wall-clock format of `last_updated`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServoState {
    pub servo_id: ServoId,
    pub gpio_pin: u8,
    /// None until the first successful move, or if the device never initialized
    pub current_angle: Option<u8>,
    /// False for good once hardware initialization failed
    pub is_active: bool,
    #[serde(serialize_with = "serialize_timestamp")]
    pub last_updated: Option<DateTime<Local>>,
    pub attached: bool,
}

impl ServoState {
    /// State of a freshly created channel, placed at center
    pub fn active(servo_id: ServoId, gpio_pin: u8) -> Self {
        Self {
            servo_id,
            gpio_pin,
            current_angle: Some(CENTER_ANGLE),
            is_active: true,
            last_updated: None,
            attached: false,
        }
    }

    /// State of a channel whose hardware could not be opened
    pub fn inactive(servo_id: ServoId, gpio_pin: u8) -> Self {
        Self {
            servo_id,
            gpio_pin,
            current_angle: None,
            is_active: false,
            last_updated: None,
            attached: false,
        }
    }

    pub fn last_updated_display(&self) -> Option<String> {
        self.last_updated
            .map(|at| at.format(TIMESTAMP_FORMAT).to_string())
    }
}

fn serialize_timestamp<S>(value: &Option<DateTime<Local>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(at) => serializer.collect_str(&at.format(TIMESTAMP_FORMAT)),
        None => serializer.serialize_none(),
    }
}

//! Post-move hold/release decision table
//!
//! | mode      | on move                | after move                                   |
//! |-----------|------------------------|----------------------------------------------|
//! | `release` | skipped, nothing sent  | detach now                                   |
//! | `hold`    | attach, write pulse    | stay attached, pending detach cancelled      |
//! | `auto`    | attach, write pulse    | detach after `hold_time` if detach enabled   |

use std::time::Duration;

use crate::config::ServoConfig;
use crate::types::HoldMode;

/// Action to take once a move has been written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostMove {
    DetachNow,
    StayAttached,
    DetachAfter(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldPolicy {
    mode: HoldMode,
    detach_enabled: bool,
    hold_time: Duration,
}

impl HoldPolicy {
    pub fn new(mode: HoldMode, detach_enabled: bool, hold_time: Duration) -> Self {
        Self {
            mode,
            detach_enabled,
            hold_time,
        }
    }

    pub fn from_config(config: &ServoConfig) -> Self {
        Self::new(config.hold_mode, config.detach_enabled, config.hold_duration())
    }

    pub fn mode(&self) -> HoldMode {
        self.mode
    }

    /// Whether a move attaches and writes at all
    pub fn drives_output(&self) -> bool {
        self.mode != HoldMode::Release
    }

    pub fn after_move(&self) -> PostMove {
        match self.mode {
            HoldMode::Release => PostMove::DetachNow,
            HoldMode::Hold => PostMove::StayAttached,
            HoldMode::Auto if self.detach_enabled => PostMove::DetachAfter(self.hold_time),
            HoldMode::Auto => PostMove::StayAttached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_release_skips_and_detaches() {
        let policy = HoldPolicy::new(HoldMode::Release, true, SECOND);
        assert!(!policy.drives_output());
        assert_eq!(policy.after_move(), PostMove::DetachNow);

        let policy = HoldPolicy::new(HoldMode::Release, false, SECOND);
        assert_eq!(policy.after_move(), PostMove::DetachNow);
    }

    #[test]
    fn test_hold_stays_attached() {
        for detach_enabled in [true, false] {
            let policy = HoldPolicy::new(HoldMode::Hold, detach_enabled, SECOND);
            assert!(policy.drives_output());
            assert_eq!(policy.after_move(), PostMove::StayAttached);
        }
    }

    #[test]
    fn test_auto_arms_timer_only_when_detach_enabled() {
        let policy = HoldPolicy::new(HoldMode::Auto, true, Duration::from_millis(1500));
        assert_eq!(policy.after_move(), PostMove::DetachAfter(Duration::from_millis(1500)));

        let policy = HoldPolicy::new(HoldMode::Auto, false, SECOND);
        assert_eq!(policy.after_move(), PostMove::StayAttached);
    }

    #[test]
    fn test_from_config() {
        let config = ServoConfig {
            hold_time: 2.0,
            ..Default::default()
        };
        let policy = HoldPolicy::from_config(&config);
        assert_eq!(policy.mode(), HoldMode::Auto);
        assert_eq!(policy.after_move(), PostMove::DetachAfter(Duration::from_secs(2)));
    }
}

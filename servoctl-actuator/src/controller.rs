//! Single-servo motion: direct or smoothed moves, hold policy, deferred detach
//!
//! Every operation holds the servo's device lock for its whole duration, from
//! the activity check through the last pulse write and state update. A
//! smoothed sequence is therefore never interleaved with another move on the
//! same servo.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::ServoConfig;
use crate::device::ServoDevice;
use crate::error::{ServoError, ServoResult};
use crate::hold::{HoldPolicy, PostMove};
use crate::scheduler::{DetachScheduler, DetachTicket};
use crate::state::ServoState;
use crate::types::{CENTER_ANGLE, ServoId, clamp_angle, map_angle_to_value};

/// Time given to the motor to reach a directly commanded position
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Result of a move request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// Servo was driven to `angle` (after clamping)
    Moved { angle: u8 },
    /// Release mode: nothing was written and the servo is detached
    Released,
}

/// Intermediate angles of a smoothed move, excluding `start` and ending on `target`
pub fn smooth_path(start: u8, target: u8, steps: u32) -> Vec<u8> {
    let steps = steps.max(1);
    let from = f64::from(start);
    let span = f64::from(target) - from;
    (1..=steps)
        .map(|step| {
            let angle = from + span * f64::from(step) / f64::from(steps);
            clamp_angle(angle.round() as i32)
        })
        .collect()
}

#[derive(Debug)]
struct Channel {
    device: Option<ServoDevice>,
    retired: bool,
}

impl Channel {
    fn device_mut(&mut self, id: ServoId) -> ServoResult<&mut ServoDevice> {
        if self.retired {
            return Err(ServoError::Inactive(id));
        }
        self.device.as_mut().ok_or(ServoError::Inactive(id))
    }

    fn is_attached(&self) -> bool {
        self.device.as_ref().is_some_and(ServoDevice::is_attached)
    }
}

/// Motion controller for one servo
///
/// The published [`ServoState`] lives apart from the device lock and is only
/// written while that lock is held, so readers never wait on a move and never
/// observe an intermediate step.
#[derive(Debug, Clone)]
pub struct MotionController {
    id: ServoId,
    channel: Arc<Mutex<Channel>>,
    state: Arc<parking_lot::Mutex<ServoState>>,
    scheduler: DetachScheduler,
}

impl MotionController {
    /// Wraps an opened device, or records an inactive servo when `device` is None
    pub fn new(id: ServoId, gpio: u8, device: Option<ServoDevice>, scheduler: DetachScheduler) -> Self {
        let state = match device {
            Some(_) => ServoState::active(id, gpio),
            None => ServoState::inactive(id, gpio),
        };
        Self {
            id,
            channel: Arc::new(Mutex::new(Channel {
                device,
                retired: false,
            })),
            state: Arc::new(parking_lot::Mutex::new(state)),
            scheduler,
        }
    }

    pub fn id(&self) -> ServoId {
        self.id
    }

    /// Last completed state; does not wait for an in-flight operation
    pub fn state(&self) -> ServoState {
        self.state.lock().clone()
    }

    /// Moves to `target` (clamped to 0-180°) and applies the hold policy
    pub async fn move_to(&self, target: i32, config: &ServoConfig) -> ServoResult<MoveOutcome> {
        let mut channel = self.channel.lock().await;
        channel.device_mut(self.id)?;
        self.scheduler.cancel(self.id);

        let target = clamp_angle(target);
        let policy = HoldPolicy::from_config(config);

        if !policy.drives_output() {
            self.detach_locked(&mut channel)?;
            debug!(servo_id = self.id, target, "release mode: move skipped");
            return Ok(MoveOutcome::Released);
        }

        let start = self.state.lock().current_angle.unwrap_or(CENTER_ANGLE);
        if let Err(e) = self.drive(&mut channel, start, target, config).await {
            // the output may still be attached; it stays under the configured policy
            self.apply_post_move(&mut channel, policy.after_move());
            return Err(e);
        }

        {
            let mut state = self.state.lock();
            state.current_angle = Some(target);
            state.last_updated = Some(Local::now());
        }
        self.apply_post_move(&mut channel, policy.after_move());
        debug!(servo_id = self.id, from = start, to = target, "moved");

        Ok(MoveOutcome::Moved { angle: target })
    }

    /// Writes the direct or smoothed sequence from `start` to `target`
    async fn drive(
        &self,
        channel: &mut Channel,
        start: u8,
        target: u8,
        config: &ServoConfig,
    ) -> ServoResult<()> {
        if config.smooth_enabled && start.abs_diff(target) > 1 {
            let delay = config.smooth_delay_duration();
            for angle in smooth_path(start, target, config.smooth_steps) {
                self.write_angle(channel, angle)?;
                sleep(delay).await;
            }
        } else {
            self.write_angle(channel, target)?;
            sleep(SETTLE_DELAY).await;
        }
        Ok(())
    }

    /// Attaches and keeps holding the current position; cancels any pending detach
    pub async fn hold(&self) -> ServoResult<()> {
        let mut channel = self.channel.lock().await;
        channel.device_mut(self.id)?;
        self.scheduler.cancel(self.id);

        let angle = self.state.lock().current_angle.unwrap_or(CENTER_ANGLE);
        self.write_angle(&mut channel, angle)?;
        debug!(servo_id = self.id, angle, "holding");
        Ok(())
    }

    /// Detaches now; cancels any pending detach
    pub async fn release(&self) -> ServoResult<()> {
        let mut channel = self.channel.lock().await;
        channel.device_mut(self.id)?;
        self.scheduler.cancel(self.id);
        self.detach_locked(&mut channel)
    }

    /// Startup placement at center, written directly regardless of smoothing.
    ///
    /// Release mode still drives this placement: every servo is pulsed to 90°
    /// and only then detached by the post-move policy, so a switch to
    /// `release` through a config update re-centers before going limp.
    pub(crate) async fn place_initial(&self, config: &ServoConfig) -> ServoResult<()> {
        let mut channel = self.channel.lock().await;
        channel.device_mut(self.id)?;
        self.scheduler.cancel(self.id);

        self.write_angle(&mut channel, CENTER_ANGLE)?;
        sleep(SETTLE_DELAY).await;
        self.state.lock().current_angle = Some(CENTER_ANGLE);
        self.apply_post_move(&mut channel, HoldPolicy::from_config(config).after_move());
        Ok(())
    }

    /// Tears the servo down: cancels its timer, detaches and drops the device.
    /// Later operations fail with `Inactive`. Detach failures are returned but
    /// the device is dropped regardless.
    pub(crate) async fn retire(&self) -> ServoResult<()> {
        let mut channel = self.channel.lock().await;
        self.scheduler.cancel(self.id);
        let result = self.detach_locked(&mut channel);
        channel.device = None;
        channel.retired = true;
        self.state.lock().attached = false;
        result
    }

    /// Marks the servo permanently inactive after a failed startup placement
    pub(crate) async fn deactivate(&self) {
        if let Err(e) = self.retire().await {
            warn!(servo_id = self.id, error = %e, "detach failed while deactivating");
        }
        let mut state = self.state.lock();
        *state = ServoState::inactive(self.id, state.gpio_pin);
    }

    async fn expire_detach(&self, ticket: DetachTicket) {
        let mut channel = self.channel.lock().await;
        if !self.scheduler.is_current(self.id, ticket) || channel.retired {
            debug!(servo_id = self.id, ticket, "stale detach ignored");
            return;
        }
        match self.detach_locked(&mut channel) {
            Ok(()) => debug!(servo_id = self.id, "hold time elapsed, detached"),
            Err(e) => warn!(servo_id = self.id, error = %e, "auto-detach failed"),
        }
    }

    fn write_angle(&self, channel: &mut Channel, angle: u8) -> ServoResult<()> {
        let device = channel.device_mut(self.id)?;
        let result = device
            .attach()
            .and_then(|()| device.write_value(map_angle_to_value(angle)));
        self.state.lock().attached = channel.is_attached();
        result.map_err(|e| {
            error!(servo_id = self.id, angle, error = %e, "pulse write failed");
            e.into_write_error(self.id)
        })
    }

    fn detach_locked(&self, channel: &mut Channel) -> ServoResult<()> {
        let result = match channel.device.as_mut() {
            Some(device) => device.detach(),
            None => Ok(()),
        };
        self.state.lock().attached = channel.is_attached();
        result.map_err(|e| e.into_write_error(self.id))
    }

    fn apply_post_move(&self, channel: &mut Channel, action: PostMove) {
        match action {
            PostMove::StayAttached => {}
            PostMove::DetachNow => {
                if let Err(e) = self.detach_locked(channel) {
                    warn!(servo_id = self.id, error = %e, "detach after move failed");
                }
            }
            PostMove::DetachAfter(delay) => {
                let controller = self.clone();
                self.scheduler.arm(self.id, delay, move |ticket| async move {
                    controller.expire_detach(ticket).await;
                });
            }
        }
    }
}

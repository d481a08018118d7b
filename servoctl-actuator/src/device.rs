//! Physical servo channel
//!
//! [`ServoDevice`] is the only type that touches PWM output. Backends plug in
//! through [`PwmChannel`] and are opened by a [`DeviceFactory`], so a full
//! re-initialization can destroy and recreate every device.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::DeviceError;

/// Standard hobby-servo frame: 20 ms (50 Hz)
pub const PWM_FRAME: Duration = Duration::from_millis(20);

/// Pulse widths emitted at the two ends of travel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseWidthRange {
    pub min: Duration,
    pub max: Duration,
}

impl PulseWidthRange {
    pub fn from_secs(min: f64, max: f64) -> Self {
        Self {
            min: Duration::from_secs_f64(min),
            max: Duration::from_secs_f64(max),
        }
    }

    /// Pulse width for a normalized value; -1.0 → `min`, +1.0 → `max`
    pub fn pulse_for(&self, value: f64) -> Duration {
        let fraction = (value.clamp(-1.0, 1.0) + 1.0) / 2.0;
        self.min + (self.max - self.min).mul_f64(fraction)
    }
}

/// A raw PWM-capable output line
pub trait PwmChannel: Send + fmt::Debug {
    /// BCM GPIO number
    fn gpio(&self) -> u8;

    /// Starts or updates PWM output
    fn set_pulse_width(&mut self, frame: Duration, pulse: Duration) -> Result<(), DeviceError>;

    /// Stops PWM output; the line is left low
    fn disable(&mut self) -> Result<(), DeviceError>;
}

/// Opens PWM channels by GPIO number
pub trait DeviceFactory: Send + Sync + fmt::Debug {
    fn open(&self, gpio: u8) -> Result<Box<dyn PwmChannel>, DeviceError>;
}

/// One servo bound to a GPIO line and a pulse-width range
#[derive(Debug)]
pub struct ServoDevice {
    channel: Box<dyn PwmChannel>,
    range: PulseWidthRange,
    attached: bool,
    last_pulse: Option<Duration>,
}

impl ServoDevice {
    /// Opens `gpio` for PWM output. The device starts detached.
    pub fn create(
        factory: &dyn DeviceFactory,
        gpio: u8,
        range: PulseWidthRange,
    ) -> Result<Self, DeviceError> {
        let channel = factory.open(gpio)?;
        Ok(Self {
            channel,
            range,
            attached: false,
            last_pulse: None,
        })
    }

    pub fn gpio(&self) -> u8 {
        self.channel.gpio()
    }

    pub fn range(&self) -> PulseWidthRange {
        self.range
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// (Re)acquires the channel for output. Re-emits the last pulse, if any.
    pub fn attach(&mut self) -> Result<(), DeviceError> {
        if self.attached {
            return Ok(());
        }
        if let Some(pulse) = self.last_pulse {
            self.channel.set_pulse_width(PWM_FRAME, pulse)?;
        }
        self.attached = true;
        debug!(gpio = self.gpio(), "attached");
        Ok(())
    }

    /// Stops signal emission; removes holding torque and jitter
    pub fn detach(&mut self) -> Result<(), DeviceError> {
        if !self.attached {
            return Ok(());
        }
        self.channel.disable()?;
        self.attached = false;
        debug!(gpio = self.gpio(), "detached");
        Ok(())
    }

    /// Emits the pulse for a normalized value. Ignored while detached.
    pub fn write_value(&mut self, value: f64) -> Result<(), DeviceError> {
        if !self.attached {
            debug!(gpio = self.gpio(), value, "write ignored while detached");
            return Ok(());
        }
        let pulse = self.range.pulse_for(value);
        self.channel.set_pulse_width(PWM_FRAME, pulse)?;
        self.last_pulse = Some(pulse);
        Ok(())
    }
}

/// Hardware factory for this build.
///
/// With `simulate` set, or without the `rpi` feature, a
/// [`SimulatedFactory`](crate::sim::SimulatedFactory) is returned.
pub fn default_factory(simulate: bool) -> Result<Arc<dyn DeviceFactory>, DeviceError> {
    #[cfg(feature = "rpi")]
    if !simulate {
        return Ok(Arc::new(crate::rpi::RppalFactory::new()?));
    }

    #[cfg(not(feature = "rpi"))]
    if !simulate {
        tracing::warn!("built without the `rpi` feature; using simulated servos");
    }

    Ok(Arc::new(crate::sim::SimulatedFactory::new()))
}

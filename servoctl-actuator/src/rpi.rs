//! Raspberry Pi backend: software PWM on any BCM GPIO line via `rppal`

use std::time::Duration;

use rppal::gpio::{Gpio, OutputPin};

use crate::device::{DeviceFactory, PwmChannel};
use crate::error::DeviceError;

#[derive(Debug)]
pub struct RppalFactory {
    gpio: Gpio,
}

impl RppalFactory {
    pub fn new() -> Result<Self, DeviceError> {
        let gpio = Gpio::new().map_err(|e| DeviceError::Unavailable {
            gpio: 0,
            reason: format!("GPIO peripheral: {e}"),
        })?;
        Ok(Self { gpio })
    }
}

impl DeviceFactory for RppalFactory {
    fn open(&self, gpio: u8) -> Result<Box<dyn PwmChannel>, DeviceError> {
        let pin = self
            .gpio
            .get(gpio)
            .map_err(|e| DeviceError::Unavailable {
                gpio,
                reason: e.to_string(),
            })?
            .into_output_low();
        Ok(Box::new(RppalChannel { pin }))
    }
}

#[derive(Debug)]
struct RppalChannel {
    pin: OutputPin,
}

impl RppalChannel {
    fn output_error(&self, e: rppal::gpio::Error) -> DeviceError {
        DeviceError::Output {
            gpio: self.pin.pin(),
            reason: e.to_string(),
        }
    }
}

impl PwmChannel for RppalChannel {
    fn gpio(&self) -> u8 {
        self.pin.pin()
    }

    fn set_pulse_width(&mut self, frame: Duration, pulse: Duration) -> Result<(), DeviceError> {
        self.pin
            .set_pwm(frame, pulse)
            .map_err(|e| self.output_error(e))
    }

    fn disable(&mut self) -> Result<(), DeviceError> {
        self.pin.clear_pwm().map_err(|e| self.output_error(e))?;
        self.pin.set_low();
        Ok(())
    }
}

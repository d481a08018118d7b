//! Simulated PWM backend
//!
//! Records every pulse and disable per GPIO line. Individual lines can be
//! configured to fail on open or on output, which is how hardware faults are
//! exercised without a Raspberry Pi.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::device::{DeviceFactory, PwmChannel};
use crate::error::DeviceError;

/// One recorded output change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Pulse { gpio: u8, pulse: Duration },
    Disabled { gpio: u8 },
}

#[derive(Debug, Default)]
struct Bench {
    failing_opens: HashSet<u8>,
    failing_writes: HashSet<u8>,
    opened: Vec<u8>,
    events: Vec<SimEvent>,
}

/// Factory of simulated channels sharing one event log
#[derive(Debug, Clone, Default)]
pub struct SimulatedFactory {
    bench: Arc<Mutex<Bench>>,
}

impl SimulatedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening `gpio` fails from now on
    pub fn fail_open(self, gpio: u8) -> Self {
        self.bench.lock().failing_opens.insert(gpio);
        self
    }

    /// Output on `gpio` fails from now on
    pub fn fail_writes(self, gpio: u8) -> Self {
        self.break_writes(gpio);
        self
    }

    /// Like [`fail_writes`](Self::fail_writes) on a factory already in use
    pub fn break_writes(&self, gpio: u8) {
        self.bench.lock().failing_writes.insert(gpio);
    }

    /// Restores normal output on `gpio`
    pub fn heal_writes(&self, gpio: u8) {
        self.bench.lock().failing_writes.remove(&gpio);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.bench.lock().events.clone()
    }

    /// Pulse widths emitted on `gpio`, oldest first
    pub fn pulses(&self, gpio: u8) -> Vec<Duration> {
        self.bench
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                SimEvent::Pulse { gpio: g, pulse } if *g == gpio => Some(*pulse),
                _ => None,
            })
            .collect()
    }

    pub fn disable_count(&self, gpio: u8) -> usize {
        self.bench
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, SimEvent::Disabled { gpio: g } if *g == gpio))
            .count()
    }

    /// How many times `gpio` was successfully opened
    pub fn open_count(&self, gpio: u8) -> usize {
        self.bench.lock().opened.iter().filter(|g| **g == gpio).count()
    }

    pub fn clear_events(&self) {
        self.bench.lock().events.clear();
    }
}

impl DeviceFactory for SimulatedFactory {
    fn open(&self, gpio: u8) -> Result<Box<dyn PwmChannel>, DeviceError> {
        let mut bench = self.bench.lock();
        if bench.failing_opens.contains(&gpio) {
            return Err(DeviceError::Unavailable {
                gpio,
                reason: "simulated open failure".into(),
            });
        }
        bench.opened.push(gpio);
        Ok(Box::new(SimulatedChannel {
            gpio,
            bench: Arc::clone(&self.bench),
        }))
    }
}

#[derive(Debug)]
struct SimulatedChannel {
    gpio: u8,
    bench: Arc<Mutex<Bench>>,
}

impl SimulatedChannel {
    fn record(&self, event: SimEvent) -> Result<(), DeviceError> {
        let mut bench = self.bench.lock();
        if bench.failing_writes.contains(&self.gpio) {
            return Err(DeviceError::Output {
                gpio: self.gpio,
                reason: "simulated output failure".into(),
            });
        }
        bench.events.push(event);
        Ok(())
    }
}

impl PwmChannel for SimulatedChannel {
    fn gpio(&self) -> u8 {
        self.gpio
    }

    fn set_pulse_width(&mut self, _frame: Duration, pulse: Duration) -> Result<(), DeviceError> {
        self.record(SimEvent::Pulse { gpio: self.gpio, pulse })
    }

    fn disable(&mut self) -> Result<(), DeviceError> {
        self.record(SimEvent::Disabled { gpio: self.gpio })
    }
}

//! # 🦾 servoctl-actuator — hobby servo motion controller
//!
//! Drives hobby servos on GPIO lines: converts a requested angle (0-180°) into
//! a PWM pulse width, detaches idle servos to silence holding jitter, and
//! optionally steps through intermediate angles for smooth motion.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 ServoRegistry                 │
//! │   config · id → controller · bulk fan-out     │
//! │  ┌──────────────────┐   ┌──────────────────┐  │
//! │  │ MotionController │   │ MotionController │  │
//! │  │ direct/smoothed  │   │       ...        │  │
//! │  └──────────────────┘   └──────────────────┘  │
//! │      ↓ HoldPolicy            ↓                │
//! │  ┌──────────────────────────────────────────┐ │
//! │  │  DetachScheduler (one slot per servo)    │ │
//! │  └──────────────────────────────────────────┘ │
//! └───────────────────────────────────────────────┘
//!          ↓ map_angle_to_value       ↓ snapshots
//!     ServoDevice (PwmChannel)    StatusPublisher
//!          ↓
//!   rppal software PWM  |  simulated bench
//! ```
//!
//! ## Hold modes
//!
//! - `auto`: attach, move, then detach after `hold_time` (if detach is enabled)
//! - `hold`: attach, move, stay attached
//! - `release`: moves are skipped and the servo is detached
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use servoctl_actuator::{ServoConfig, ServoRegistry, SimulatedFactory};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = Arc::new(SimulatedFactory::new());
//! let (servos, report) =
//!     ServoRegistry::start(vec![13, 6], ServoConfig::default(), factory).await?;
//! assert!(report.is_complete());
//!
//! servos.move_one(2, 45).await?;
//! assert_eq!(servos.status_of(2).await?.current_angle, Some(45));
//!
//! servos.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! The simulated backend is always available. The `rpi` feature adds
//! [`RppalFactory`](rpi::RppalFactory), software PWM on any BCM line at 50 Hz.

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod hold;
pub mod publisher;
pub mod registry;
pub mod scheduler;
pub mod sim;
pub mod state;
pub mod types;

#[cfg(feature = "rpi")]
pub mod rpi;

pub use config::{ConfigUpdate, ServoConfig};
pub use controller::{MotionController, MoveOutcome, SETTLE_DELAY};
pub use device::{DeviceFactory, PulseWidthRange, PwmChannel, ServoDevice, default_factory};
pub use error::{ConfigError, DeviceError, ServoError, ServoResult};
pub use hold::{HoldPolicy, PostMove};
pub use publisher::{StatusPublisher, StatusSnapshot};
pub use registry::{BulkReport, ServoRegistry};
pub use scheduler::DetachScheduler;
pub use sim::SimulatedFactory;
pub use state::ServoState;
pub use types::{HoldMode, ServoAngle, ServoId, clamp_angle, map_angle_to_value};

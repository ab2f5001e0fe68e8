#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` control core for a potentiometer-commanded motorized valve."]
#![doc = ""]
#![doc = "The crate turns a raw analog reading into a target opening (0–100 %), ramps an"]
#![doc = "estimated valve position toward it through a two-channel PWM drive, persists the"]
#![doc = "position and calibration in byte-addressed non-volatile memory, and implements a"]
#![doc = "debounced manual force-close trigger. All hardware is reached through traits so the"]
#![doc = "same control logic runs on a board, on a host bench, or under test."]

pub mod boot;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod controller;
pub mod drive;
pub mod error;
pub mod manual_override;
pub mod mapper;
pub mod motion;
pub mod sensor;
pub mod store;

#[cfg(test)]
pub(crate) mod mock;

pub use boot::{DEFAULT_ERASE_WINDOW_MS, ERASE_COMMAND, EraseWindow, EraseWindowStatus};
pub use calibration::{CalibrationBounds, CalibrationWizard, WizardState};
pub use clock::{Clock, Millis};
pub use config::ControlConfig;
pub use controller::{Boot, CalibrationProgress, CycleOutcome, CycleReport, ValveController};
pub use drive::{Channel, ChannelError, Direction, DriveCommand, HBridge, ValveDrive};
pub use error::{CalibrationError, ConfigError, ControlError, StoreError};
pub use manual_override::{OverrideState, OverrideTrigger};
pub use mapper::{Mapping, PositionMapper, TravelDirection, Zone};
pub use motion::{Motion, MotionController, PositionState};
pub use sensor::PositionSensor;
pub use store::{Field, MemoryStorage, PersistentStore, Storage};

/// Largest value a drive channel magnitude can take (8-bit PWM).
pub const MAX_MAGNITUDE: u8 = 255;

/// Fully open valve position in percent.
pub const FULLY_OPEN: u8 = 100;

/// Fully closed valve position in percent.
pub const FULLY_CLOSED: u8 = 0;

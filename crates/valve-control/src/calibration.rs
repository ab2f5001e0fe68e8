//! Calibration bounds and the two-step calibration wizard.
//!
//! The wizard is a plain state machine: it never reads hardware or waits on a
//! console itself. Whoever drives it (the controller on a confirmation event,
//! or a test) feeds it the raw reading taken at the moment the operator
//! confirmed each extreme.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// Raw sensor readings at the fully-closed and fully-open valve positions.
///
/// Always satisfies `0 <= min_raw < max_raw <= sensor_max`; the only way to
/// build one is [`CalibrationBounds::new`]. Deserialization goes through the
/// same checks, against the full `u16` range since the sensor is not known
/// there.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawBounds"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationBounds {
    min_raw: u16,
    max_raw: u16,
}

/// Unchecked serialized form of [`CalibrationBounds`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawBounds {
    min_raw: i32,
    max_raw: i32,
}

#[cfg(feature = "serde")]
impl TryFrom<RawBounds> for CalibrationBounds {
    type Error = CalibrationError;

    fn try_from(raw: RawBounds) -> Result<Self, Self::Error> {
        CalibrationBounds::new(raw.min_raw, raw.max_raw, u16::MAX)
    }
}

impl CalibrationBounds {
    /// Validate a pair of readings.
    ///
    /// The inputs are signed because they usually come straight from the
    /// persistent store, where an erased or corrupted cell can hold anything.
    ///
    /// # Errors
    ///
    /// * [`CalibrationError::NegativeMinimum`] if `min_raw < 0`.
    /// * [`CalibrationError::MaximumOutOfRange`] if `max_raw > sensor_max`.
    /// * [`CalibrationError::EmptyRange`] if `min_raw >= max_raw`.
    pub fn new(min_raw: i32, max_raw: i32, sensor_max: u16) -> Result<Self, CalibrationError> {
        if min_raw < 0 {
            return Err(CalibrationError::NegativeMinimum(min_raw));
        }
        if max_raw > i32::from(sensor_max) {
            return Err(CalibrationError::MaximumOutOfRange {
                max_raw,
                sensor_max,
            });
        }
        if min_raw >= max_raw {
            return Err(CalibrationError::EmptyRange { min_raw, max_raw });
        }
        // Both values are now within 0..=sensor_max.
        Ok(CalibrationBounds {
            min_raw: min_raw as u16,
            max_raw: max_raw as u16,
        })
    }

    /// Reading at the fully-closed end.
    pub fn min_raw(&self) -> u16 {
        self.min_raw
    }

    /// Reading at the fully-open end.
    pub fn max_raw(&self) -> u16 {
        self.max_raw
    }
}

impl fmt::Display for CalibrationBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min_raw, self.max_raw)
    }
}

/// Where the calibration wizard currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardState {
    /// Waiting for the operator to confirm the fully-closed position.
    AwaitingMinConfirm,
    /// Closed end captured; waiting for the fully-open confirmation.
    AwaitingMaxConfirm {
        /// Reading captured at the closed end.
        min_raw: u16,
    },
    /// Both ends captured and validated.
    Done(CalibrationBounds),
}

/// Two-step calibration procedure driven by confirmation events.
#[derive(Debug, Clone)]
pub struct CalibrationWizard {
    sensor_max: u16,
    state: WizardState,
}

impl CalibrationWizard {
    /// Start a new calibration for a sensor whose readings top out at `sensor_max`.
    pub fn new(sensor_max: u16) -> Self {
        CalibrationWizard {
            sensor_max,
            state: WizardState::AwaitingMinConfirm,
        }
    }

    /// Current state.
    pub fn state(&self) -> WizardState {
        self.state
    }

    /// Operator instruction for the current step, or `None` once done.
    pub fn prompt(&self) -> Option<&'static str> {
        match self.state {
            WizardState::AwaitingMinConfirm => {
                Some("Turn the potentiometer fully left (closed), then press Enter.")
            }
            WizardState::AwaitingMaxConfirm { .. } => {
                Some("Turn the potentiometer fully right (open), then press Enter.")
            }
            WizardState::Done(_) => None,
        }
    }

    /// Validated bounds, once the wizard has finished.
    pub fn bounds(&self) -> Option<CalibrationBounds> {
        match self.state {
            WizardState::Done(bounds) => Some(bounds),
            _ => None,
        }
    }

    /// Go back to the first step, discarding anything captured so far.
    pub fn restart(&mut self) {
        self.state = WizardState::AwaitingMinConfirm;
    }

    /// Feed the reading taken when the operator confirmed the current step.
    ///
    /// # Errors
    ///
    /// If the second reading does not form valid bounds with the first, the
    /// wizard restarts from the closed-end step and the validation error is
    /// returned. Confirming after completion yields
    /// [`CalibrationError::AlreadyComplete`].
    pub fn confirm(&mut self, raw: u16) -> Result<WizardState, CalibrationError> {
        self.state = match self.state {
            WizardState::AwaitingMinConfirm => WizardState::AwaitingMaxConfirm { min_raw: raw },
            WizardState::AwaitingMaxConfirm { min_raw } => {
                match CalibrationBounds::new(i32::from(min_raw), i32::from(raw), self.sensor_max) {
                    Ok(bounds) => WizardState::Done(bounds),
                    Err(e) => {
                        self.restart();
                        return Err(e);
                    }
                }
            }
            WizardState::Done(_) => return Err(CalibrationError::AlreadyComplete),
        };
        Ok(self.state)
    }
}

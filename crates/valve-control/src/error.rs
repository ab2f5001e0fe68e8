//! Error types for the valve control core.
//!
//! Hardware faults are logged where they happen and folded into
//! [`ControlError`]; the remaining enums describe invalid data coming from
//! configuration, calibration or the persistent store.

use core::fmt;

/// Errors raised while validating a [`crate::ControlConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The raw sensor range is empty.
    InvalidSensorRange(&'static str),
    /// The active control band is not a proper sub-range of 0–100.
    InvalidActiveBand(&'static str),
    /// The proportional drive band is inverted or out of range.
    InvalidDriveBand(&'static str),
    /// The per-cycle ramp step cannot move the valve.
    InvalidRampStep(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidSensorRange(msg) => write!(f, "Invalid sensor range: {}", msg),
            ConfigError::InvalidActiveBand(msg) => write!(f, "Invalid active band: {}", msg),
            ConfigError::InvalidDriveBand(msg) => write!(f, "Invalid drive band: {}", msg),
            ConfigError::InvalidRampStep(msg) => write!(f, "Invalid ramp step: {}", msg),
        }
    }
}

impl core::error::Error for ConfigError {}

/// Errors describing calibration bounds that cannot be used for control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// The closed-end reading is negative.
    NegativeMinimum(i32),
    /// The open-end reading exceeds the sensor's native maximum.
    MaximumOutOfRange {
        /// Captured open-end reading.
        max_raw: i32,
        /// Largest reading the sensor can produce.
        sensor_max: u16,
    },
    /// The closed-end reading is not strictly below the open-end reading.
    EmptyRange {
        /// Captured closed-end reading.
        min_raw: i32,
        /// Captured open-end reading.
        max_raw: i32,
    },
    /// A confirmation arrived after the wizard already finished.
    AlreadyComplete,
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::NegativeMinimum(min) => {
                write!(f, "Calibration minimum {} is negative", min)
            }
            CalibrationError::MaximumOutOfRange { max_raw, sensor_max } => write!(
                f,
                "Calibration maximum {} exceeds sensor maximum {}",
                max_raw, sensor_max
            ),
            CalibrationError::EmptyRange { min_raw, max_raw } => write!(
                f,
                "Calibration minimum {} must be below maximum {}",
                min_raw, max_raw
            ),
            CalibrationError::AlreadyComplete => write!(f, "Calibration already complete"),
        }
    }
}

impl core::error::Error for CalibrationError {}

/// Errors raised by [`crate::PersistentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The access would run past the end of the device.
    OutOfRange {
        /// First byte of the access.
        offset: usize,
        /// Length of the access in bytes.
        len: usize,
        /// Size of the device in bytes.
        capacity: usize,
    },
    /// The underlying device reported a failure.
    Device(&'static str),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::OutOfRange {
                offset,
                len,
                capacity,
            } => write!(
                f,
                "Store access out of range: {} bytes at offset {} (capacity {})",
                len, offset, capacity
            ),
            StoreError::Device(msg) => write!(f, "Store device failure: {}", msg),
        }
    }
}

impl core::error::Error for StoreError {}

/// Umbrella error for [`crate::ValveController`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// The position sensor could not be read.
    Sensor,
    /// The drive output rejected a command.
    Drive,
    /// The override trigger could not be read.
    Input,
    /// Reading or writing persistent state failed.
    Store(StoreError),
    /// Calibration data was rejected.
    Calibration(CalibrationError),
    /// The controller tunables are inconsistent.
    Config(ConfigError),
    /// Positional control was requested before valid bounds were loaded.
    NotCalibrated,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::Sensor => write!(f, "Position sensor read failed"),
            ControlError::Drive => write!(f, "Drive output command failed"),
            ControlError::Input => write!(f, "Override trigger read failed"),
            ControlError::Store(e) => write!(f, "{}", e),
            ControlError::Calibration(e) => write!(f, "{}", e),
            ControlError::Config(e) => write!(f, "{}", e),
            ControlError::NotCalibrated => write!(f, "Controller has no valid calibration"),
        }
    }
}

impl core::error::Error for ControlError {}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        ControlError::Store(err)
    }
}

impl From<CalibrationError> for ControlError {
    fn from(err: CalibrationError) -> Self {
        ControlError::Calibration(err)
    }
}

impl From<ConfigError> for ControlError {
    fn from(err: ConfigError) -> Self {
        ControlError::Config(err)
    }
}

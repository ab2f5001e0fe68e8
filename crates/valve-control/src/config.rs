//! Controller tunables.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::FULLY_OPEN;

/// Tunables for the control loop.
///
/// [`ControlConfig::default`] carries the reference behavior: a 10-bit sensor,
/// a 20–80 % active band, a ±2 % dead band, 5 % ramp steps, a 50–150
/// proportional drive band, a 500 ms idle shut-off and a 2 s / 5 s manual
/// override.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlConfig {
    /// Largest raw reading the position sensor can produce.
    pub sensor_max: u16,
    /// Normalized position below which the target is forced to fully closed.
    pub active_band_low: u8,
    /// Normalized position above which the target is forced to fully open.
    pub active_band_high: u8,
    /// Position error (percent) tolerated without corrective drive.
    pub dead_band: u8,
    /// Largest change of the position estimate per control cycle (percent).
    pub ramp_step: u8,
    /// Drive magnitude for the smallest position error.
    pub min_drive: u8,
    /// Drive magnitude for a full-travel position error.
    pub max_drive: u8,
    /// Time without a qualifying move before both channels are released.
    pub idle_timeout_ms: u64,
    /// Pause after each actuation step.
    pub settle_ms: u32,
    /// Interval between the two reads that confirm an override press.
    pub debounce_ms: u32,
    /// Polling interval while waiting for the override trigger to be released.
    pub release_poll_ms: u32,
    /// How long the close channel is held at full magnitude on override.
    pub override_dwell_ms: u32,
    /// How long sensor-driven control stays suspended after an override.
    pub override_suppression_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            sensor_max: 1023,
            active_band_low: 20,
            active_band_high: 80,
            dead_band: 2,
            ramp_step: 5,
            min_drive: 50,
            max_drive: 150,
            idle_timeout_ms: 500,
            settle_ms: 100,
            debounce_ms: 50,
            release_poll_ms: 10,
            override_dwell_ms: 2_000,
            override_suppression_ms: 5_000,
        }
    }
}

impl ControlConfig {
    /// Check that the tunables describe a usable controller.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found: an empty sensor range, an
    /// active band that is inverted or leaves 0–100, an inverted or zero
    /// drive band, or a zero ramp step.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensor_max == 0 {
            return Err(ConfigError::InvalidSensorRange("sensor_max must be positive"));
        }
        if self.active_band_low >= self.active_band_high {
            return Err(ConfigError::InvalidActiveBand(
                "active_band_low must be below active_band_high",
            ));
        }
        if self.active_band_high > FULLY_OPEN {
            return Err(ConfigError::InvalidActiveBand(
                "active_band_high must not exceed 100",
            ));
        }
        if self.min_drive == 0 || self.min_drive > self.max_drive {
            return Err(ConfigError::InvalidDriveBand(
                "min_drive must be positive and not above max_drive",
            ));
        }
        if self.ramp_step == 0 {
            return Err(ConfigError::InvalidRampStep("ramp_step must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(ControlConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_inverted_active_band_rejected() {
        let config = ControlConfig {
            active_band_low: 80,
            active_band_high: 20,
            ..ControlConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidActiveBand(_))
        ));
    }

    #[test]
    fn test_active_band_above_hundred_rejected() {
        let config = ControlConfig {
            active_band_high: 120,
            ..ControlConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidActiveBand(_))
        ));
    }

    #[test]
    fn test_drive_band_checks() {
        let inverted = ControlConfig {
            min_drive: 200,
            max_drive: 100,
            ..ControlConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvalidDriveBand(_))
        ));

        let zero = ControlConfig {
            min_drive: 0,
            ..ControlConfig::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::InvalidDriveBand(_))));
    }

    #[test]
    fn test_zero_ramp_and_sensor_rejected() {
        let no_ramp = ControlConfig {
            ramp_step: 0,
            ..ControlConfig::default()
        };
        assert_eq!(
            no_ramp.validate(),
            Err(ConfigError::InvalidRampStep("ramp_step must be positive"))
        );

        let no_sensor = ControlConfig {
            sensor_max: 0,
            ..ControlConfig::default()
        };
        assert!(matches!(
            no_sensor.validate(),
            Err(ConfigError::InvalidSensorRange(_))
        ));
    }
}

//! Analog position sensor interface.

use core::fmt::Debug;

/// Source of raw position readings (the command potentiometer).
///
/// Readings are in the sensor's native units, `0..=ControlConfig::sensor_max`.
/// Values outside the calibrated range are tolerated downstream.
pub trait PositionSensor {
    /// Error reported by the ADC.
    type Error: Debug;

    /// Take one raw sample.
    fn read_raw(&mut self) -> Result<u16, Self::Error>;
}

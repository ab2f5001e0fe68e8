//! Raw reading → normalized position → target position.
//!
//! Mapping happens in two stages. [`normalize`] interpolates the raw reading
//! across the calibrated bounds and clamps to 0–100. [`PositionMapper::shape`]
//! then applies the three-zone policy: the middle band is stretched over the
//! full travel, and anything beyond either edge of the band commands the
//! matching extreme.

use crate::calibration::CalibrationBounds;
use crate::config::ControlConfig;
use crate::{FULLY_CLOSED, FULLY_OPEN};

/// Integer linear re-map of `x` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// Division truncates toward zero and the result is not clamped, so inputs
/// outside the source range extrapolate. `in_min` must differ from `in_max`.
pub fn map_range(x: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Normalize a raw reading to 0–100 across `bounds`, clamping out-of-range input.
pub fn normalize(raw: u16, bounds: &CalibrationBounds) -> u8 {
    let position = map_range(
        i32::from(raw),
        i32::from(bounds.min_raw()),
        i32::from(bounds.max_raw()),
        i32::from(FULLY_CLOSED),
        i32::from(FULLY_OPEN),
    );
    position.clamp(i32::from(FULLY_CLOSED), i32::from(FULLY_OPEN)) as u8
}

/// Which way the potentiometer moved since the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelDirection {
    /// Reading went up (turning toward open).
    Increasing,
    /// Reading went down (turning toward closed).
    Decreasing,
    /// Reading unchanged.
    Steady,
}

impl TravelDirection {
    /// Compare two consecutive raw samples.
    pub fn between(previous: u16, current: u16) -> Self {
        if current > previous {
            TravelDirection::Increasing
        } else if current < previous {
            TravelDirection::Decreasing
        } else {
            TravelDirection::Steady
        }
    }
}

/// Region of the normalized travel a reading falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Below the active band; the target is fully closed.
    FailClosed,
    /// Inside the active band; the target follows the reading.
    Active,
    /// Above the active band; the target is fully open.
    FailOpen,
}

/// Everything derived from one raw sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// The raw sample.
    pub raw: u16,
    /// Sample normalized across the calibration bounds (0–100).
    pub position: u8,
    /// Zone the normalized sample falls in.
    pub zone: Zone,
    /// Potentiometer travel since the previous sample.
    pub travel: TravelDirection,
    /// Target valve position (0–100).
    pub target: u8,
}

/// Applies the active-band / edge-zone policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionMapper {
    band_low: u8,
    band_high: u8,
}

impl PositionMapper {
    /// Build a mapper from the active band in `config`.
    ///
    /// The band is assumed to have passed [`ControlConfig::validate`].
    pub fn new(config: &ControlConfig) -> Self {
        PositionMapper {
            band_low: config.active_band_low,
            band_high: config.active_band_high,
        }
    }

    /// Zone of a normalized position. Both band edges belong to the active band.
    pub fn zone(&self, position: u8) -> Zone {
        if position < self.band_low {
            Zone::FailClosed
        } else if position > self.band_high {
            Zone::FailOpen
        } else {
            Zone::Active
        }
    }

    /// Target for a normalized position.
    ///
    /// Travel direction plays no part here: a reading in the closed zone
    /// yields 0 whether the knob is turning toward or away from it, and
    /// likewise 100 in the open zone. Direction only matters for the drive
    /// magnitude (see [`crate::motion`]).
    pub fn shape(&self, position: u8) -> u8 {
        match self.zone(position) {
            Zone::FailClosed => FULLY_CLOSED,
            Zone::FailOpen => FULLY_OPEN,
            Zone::Active => map_range(
                i32::from(position),
                i32::from(self.band_low),
                i32::from(self.band_high),
                i32::from(FULLY_CLOSED),
                i32::from(FULLY_OPEN),
            )
            .clamp(i32::from(FULLY_CLOSED), i32::from(FULLY_OPEN)) as u8,
        }
    }

    /// Map one raw sample, given the previous one for travel direction.
    pub fn map(&self, raw: u16, previous_raw: u16, bounds: &CalibrationBounds) -> Mapping {
        let position = normalize(raw, bounds);
        Mapping {
            raw,
            position,
            zone: self.zone(position),
            travel: TravelDirection::between(previous_raw, raw),
            target: self.shape(position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(min: i32, max: i32) -> CalibrationBounds {
        CalibrationBounds::new(min, max, 1023).unwrap()
    }

    fn mapper() -> PositionMapper {
        PositionMapper::new(&ControlConfig::default())
    }

    #[test]
    fn test_map_range_truncates_toward_zero() {
        assert_eq!(map_range(50, 20, 80, 0, 100), 50);
        assert_eq!(map_range(21, 20, 80, 0, 100), 1); // 100 / 60 = 1.67
        assert_eq!(map_range(99, 100, 900, 0, 100), 0); // -100 / 800 truncates to 0
        assert_eq!(map_range(0, 100, 900, 0, 100), -12);
    }

    #[test]
    fn test_normalize_midpoint() {
        assert_eq!(normalize(500, &bounds(100, 900)), 50);
        assert_eq!(mapper().shape(50), 50);
    }

    #[test]
    fn test_normalize_clamps_outside_bounds() {
        let b = bounds(100, 900);
        assert_eq!(normalize(0, &b), 0);
        assert_eq!(normalize(99, &b), 0);
        assert_eq!(normalize(901, &b), 100);
        assert_eq!(normalize(1023, &b), 100);
        assert_eq!(normalize(u16::MAX, &b), 100);
    }

    #[test]
    fn test_normalize_exact_ends() {
        let b = bounds(100, 900);
        assert_eq!(normalize(100, &b), 0);
        assert_eq!(normalize(900, &b), 100);
    }

    #[test]
    fn test_mapping_monotonic_over_full_sensor_range() {
        let m = mapper();
        for b in [bounds(100, 900), bounds(0, 1023), bounds(511, 512), bounds(3, 40)] {
            let mut last_position = 0;
            let mut last_target = 0;
            for raw in 0..=1023u16 {
                let mapping = m.map(raw, raw, &b);
                assert!(mapping.position <= 100);
                assert!(mapping.target <= 100);
                assert!(mapping.position >= last_position, "position dipped at raw {}", raw);
                assert!(mapping.target >= last_target, "target dipped at raw {}", raw);
                last_position = mapping.position;
                last_target = mapping.target;
            }
        }
    }

    #[test]
    fn test_zones_at_band_edges() {
        let m = mapper();
        assert_eq!(m.zone(19), Zone::FailClosed);
        assert_eq!(m.zone(20), Zone::Active);
        assert_eq!(m.zone(80), Zone::Active);
        assert_eq!(m.zone(81), Zone::FailOpen);
        assert_eq!(m.shape(20), 0);
        assert_eq!(m.shape(80), 100);
        assert_eq!(m.shape(0), 0);
        assert_eq!(m.shape(100), 100);
    }

    #[test]
    fn test_closed_zone_targets_zero_in_both_directions() {
        let m = mapper();
        let b = bounds(0, 100);
        let opening = m.map(15, 10, &b);
        let closing = m.map(15, 20, &b);
        assert_eq!(opening.position, 15);
        assert_eq!(opening.travel, TravelDirection::Increasing);
        assert_eq!(closing.travel, TravelDirection::Decreasing);
        assert_eq!(opening.target, 0);
        assert_eq!(closing.target, 0);
        assert_eq!(opening.zone, Zone::FailClosed);
    }

    #[test]
    fn test_open_zone_targets_hundred_in_both_directions() {
        let m = mapper();
        let b = bounds(0, 100);
        let opening = m.map(85, 80, &b);
        let closing = m.map(85, 90, &b);
        assert_eq!(opening.target, 100);
        assert_eq!(closing.target, 100);
        assert_eq!(closing.zone, Zone::FailOpen);
    }

    #[test]
    fn test_travel_direction() {
        assert_eq!(TravelDirection::between(10, 11), TravelDirection::Increasing);
        assert_eq!(TravelDirection::between(11, 10), TravelDirection::Decreasing);
        assert_eq!(TravelDirection::between(10, 10), TravelDirection::Steady);
    }

    #[test]
    fn test_custom_band() {
        let config = ControlConfig {
            active_band_low: 10,
            active_band_high: 90,
            ..ControlConfig::default()
        };
        let m = PositionMapper::new(&config);
        assert_eq!(m.shape(15), 6); // (5 * 100) / 80
        assert_eq!(m.shape(50), 50);
        assert_eq!(m.shape(95), 100);
    }
}

//! Position estimate, move decisions and drive magnitudes.
//!
//! There is no feedback from the valve itself. `current` is an estimate that
//! advances by at most one ramp step per cycle toward the target, and the
//! drive is energized in the same direction while it does.

use tracing::debug;

use crate::clock::Millis;
use crate::config::ControlConfig;
use crate::drive::{Direction, DriveCommand};
use crate::mapper::{Mapping, TravelDirection, Zone, map_range};
use crate::{FULLY_CLOSED, FULLY_OPEN, MAX_MAGNITUDE};

/// Estimated and desired valve position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionState {
    /// Best estimate of the valve opening (0–100). Persisted on every move.
    pub current: u8,
    /// Target derived from the latest sample (0–100).
    pub target: u8,
    /// Latest raw sample, used to tell travel direction on the next one.
    pub last_raw: u16,
    /// When the last qualifying move happened.
    pub last_move_at: Millis,
}

/// One actuation step decided by [`MotionController::plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Motion {
    /// Direction to drive.
    pub direction: Direction,
    /// Drive magnitude (0–255).
    pub magnitude: u8,
    /// Position estimate before the step.
    pub from: u8,
    /// Position estimate after the step.
    pub to: u8,
}

impl Motion {
    /// Drive command for this step.
    pub fn command(&self) -> DriveCommand {
        DriveCommand::new(self.direction, self.magnitude)
    }
}

/// Move `current` toward `target` by at most `step`, never past it.
pub fn step_toward(current: u8, target: u8, step: u8) -> u8 {
    if target > current {
        current.saturating_add(step).min(target)
    } else {
        current.saturating_sub(step).max(target)
    }
}

/// Decides when and how hard to drive the valve.
#[derive(Debug, Clone)]
pub struct MotionController {
    config: ControlConfig,
    state: PositionState,
}

impl MotionController {
    /// Start from a known position estimate (usually the persisted one).
    pub fn new(config: &ControlConfig, current: u8, now: Millis) -> Self {
        let current = current.min(FULLY_OPEN);
        MotionController {
            config: *config,
            state: PositionState {
                current,
                target: current,
                last_raw: 0,
                last_move_at: now,
            },
        }
    }

    /// Current state.
    pub fn state(&self) -> &PositionState {
        &self.state
    }

    /// Overwrite the position estimate (override snap, calibration reset, boot load).
    pub fn force_position(&mut self, position: u8) {
        self.state.current = position.min(FULLY_OPEN);
    }

    /// Whether `target` warrants corrective drive from the current estimate.
    ///
    /// Errors within the dead band are ignored, except that an extreme target
    /// is always pursued until the estimate sits exactly on it.
    pub fn needs_move(&self, target: u8) -> bool {
        let current = self.state.current;
        current.abs_diff(target) > self.config.dead_band
            || (target == FULLY_CLOSED && current > FULLY_CLOSED)
            || (target == FULLY_OPEN && current < FULLY_OPEN)
    }

    /// Proportional magnitude for a position error of `error` percent.
    pub fn proportional_magnitude(&self, error: u8) -> u8 {
        map_range(
            i32::from(error.min(FULLY_OPEN)),
            i32::from(FULLY_CLOSED),
            i32::from(FULLY_OPEN),
            i32::from(self.config.min_drive),
            i32::from(self.config.max_drive),
        )
        .clamp(0, i32::from(MAX_MAGNITUDE)) as u8
    }

    /// Take a new sample into account and decide this cycle's step.
    ///
    /// Returns `None` when the target is within the dead band. Otherwise the
    /// estimate has already been advanced and the returned [`Motion`] says how
    /// to drive the valve while it follows.
    pub fn plan(&mut self, mapping: &Mapping, now: Millis) -> Option<Motion> {
        self.state.target = mapping.target;
        self.state.last_raw = mapping.raw;

        let target = mapping.target;
        let from = self.state.current;
        if !self.needs_move(target) {
            return None;
        }
        self.state.last_move_at = now;

        let (direction, magnitude) = if target > from {
            let magnitude = if mapping.zone == Zone::FailOpen
                && mapping.travel == TravelDirection::Increasing
            {
                MAX_MAGNITUDE
            } else {
                self.proportional_magnitude(target - from)
            };
            (Direction::Open, magnitude)
        } else {
            let magnitude = if mapping.zone == Zone::FailClosed
                && mapping.travel == TravelDirection::Decreasing
            {
                MAX_MAGNITUDE
            } else {
                self.proportional_magnitude(from - target)
            };
            (Direction::Close, magnitude)
        };

        let mut to = step_toward(from, target, self.config.ramp_step);
        // Travel limits are always reached exactly.
        if target == FULLY_CLOSED {
            to = FULLY_CLOSED;
        } else if target == FULLY_OPEN {
            to = FULLY_OPEN;
        }
        self.state.current = to;

        debug!(from, to, target, magnitude, direction = ?direction, "valve step");
        Some(Motion {
            direction,
            magnitude,
            from,
            to,
        })
    }

    /// Whether the idle window has passed since the last qualifying move.
    pub fn idle_expired(&self, now: Millis) -> bool {
        now.saturating_sub(self.state.last_move_at) > self.config.idle_timeout_ms
    }
}

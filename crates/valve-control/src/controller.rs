//! The valve controller: boot, calibration and the per-cycle control step.
//!
//! [`ValveController`] owns every collaborator (sensor, drive, override
//! button, storage, clock) and all control state. It never spawns, sleeps
//! between cycles or reads a console; the caller paces [`ValveController::run_cycle`]
//! and feeds calibration confirmations, so the same object runs on a board,
//! on the host bench and in tests.

use core::fmt;

use embedded_hal::digital::InputPin;
use tracing::{debug, error, info, warn};

use crate::calibration::{CalibrationBounds, CalibrationWizard, WizardState};
use crate::clock::Clock;
use crate::config::ControlConfig;
use crate::drive::{Direction, DriveCommand, ValveDrive};
use crate::error::{CalibrationError, ControlError};
use crate::manual_override::{OverrideState, OverrideTrigger};
use crate::mapper::PositionMapper;
use crate::motion::{Motion, MotionController, PositionState};
use crate::sensor::PositionSensor;
use crate::store::{PersistentStore, Storage};
use crate::{FULLY_CLOSED, MAX_MAGNITUDE};

/// What [`ValveController::load`] found in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boot {
    /// Valid bounds were loaded; control can start.
    Ready(CalibrationBounds),
    /// The stored bounds are unusable and calibration must run first.
    NeedsCalibration(CalibrationError),
}

/// Result of one calibration confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationProgress {
    /// The closed-end reading was captured.
    Captured(u16),
    /// Both ends captured, validated and persisted.
    Complete(CalibrationBounds),
    /// The captured pair was invalid; the wizard is back at the first step.
    Rejected(CalibrationError),
}

/// What a control cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The valve was driven one step.
    Moved(Motion),
    /// The target is within the dead band.
    Holding,
    /// Sensor-driven control is suspended after a manual override.
    Suppressed,
    /// A manual override ran during this cycle.
    Overridden,
}

/// Status record produced by every control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// What the cycle did.
    pub outcome: CycleOutcome,
    /// Latest raw sample (the previous one when the sensor was not read).
    pub raw: u16,
    /// Bounds in use.
    pub bounds: CalibrationBounds,
    /// Current target (0–100).
    pub target: u8,
    /// Position estimate after the cycle (0–100).
    pub current: u8,
    /// Drive command in force after the cycle.
    pub command: DriveCommand,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "raw: {} - min: {} - max: {} - target: {}% - current: {}%",
            self.raw,
            self.bounds.min_raw(),
            self.bounds.max_raw(),
            self.target,
            self.current
        )
    }
}

/// Single-loop position controller for one motorized valve.
pub struct ValveController<S, D, P, M, C> {
    config: ControlConfig,
    mapper: PositionMapper,
    motion: MotionController,
    override_state: OverrideState,
    sensor: S,
    drive: D,
    trigger: OverrideTrigger<P>,
    store: PersistentStore<M>,
    clock: C,
    bounds: Option<CalibrationBounds>,
    command: DriveCommand,
}

impl<S, D, P, M, C> ValveController<S, D, P, M, C>
where
    S: PositionSensor,
    D: ValveDrive,
    P: InputPin,
    M: Storage,
    C: Clock,
{
    /// Assemble a controller and put the drive in a known idle state.
    ///
    /// Nothing is read from the store yet; call [`ValveController::load`]
    /// (after any factory reset) before running cycles.
    pub fn new(
        config: ControlConfig,
        sensor: S,
        drive: D,
        pin: P,
        storage: M,
        clock: C,
    ) -> Result<Self, ControlError> {
        config.validate()?;
        let now = clock.now();
        let mut controller = ValveController {
            mapper: PositionMapper::new(&config),
            motion: MotionController::new(&config, FULLY_CLOSED, now),
            override_state: OverrideState::default(),
            sensor,
            drive,
            trigger: OverrideTrigger::new(pin),
            store: PersistentStore::new(storage),
            clock,
            bounds: None,
            command: DriveCommand::IDLE,
            config,
        };
        controller.apply(DriveCommand::IDLE)?;
        Ok(controller)
    }

    /// Tunables in use.
    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Position estimate and target.
    pub fn state(&self) -> &PositionState {
        self.motion.state()
    }

    /// Active calibration, if any.
    pub fn bounds(&self) -> Option<CalibrationBounds> {
        self.bounds
    }

    /// Manual override bookkeeping.
    pub fn override_state(&self) -> &OverrideState {
        &self.override_state
    }

    /// Last command sent to the drive.
    pub fn drive_command(&self) -> DriveCommand {
        self.command
    }

    /// The persistent store.
    pub fn store(&self) -> &PersistentStore<M> {
        &self.store
    }

    /// The controller's clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Zero the whole store and forget the active calibration.
    pub fn erase_store(&mut self) -> Result<(), ControlError> {
        warn!("erasing persistent storage");
        self.store.erase()?;
        self.bounds = None;
        Ok(())
    }

    /// Load calibration and the last position from the store.
    ///
    /// Invalid bounds are not an error: they are reported as
    /// [`Boot::NeedsCalibration`] and the controller refuses to run cycles
    /// until a calibration completes.
    pub fn load(&mut self) -> Result<Boot, ControlError> {
        let (min_raw, max_raw) = self.store.read_bounds()?;
        let position = self.store.load_position()?;
        self.motion = MotionController::new(&self.config, position, self.clock.now());

        match CalibrationBounds::new(min_raw, max_raw, self.config.sensor_max) {
            Ok(bounds) => {
                info!(%bounds, position, "loaded calibration");
                self.bounds = Some(bounds);
                Ok(Boot::Ready(bounds))
            }
            Err(e) => {
                warn!(min_raw, max_raw, reason = %e, "stored calibration invalid");
                self.bounds = None;
                Ok(Boot::NeedsCalibration(e))
            }
        }
    }

    /// A fresh wizard sized for this controller's sensor.
    pub fn calibration_wizard(&self) -> CalibrationWizard {
        CalibrationWizard::new(self.config.sensor_max)
    }

    /// Handle one operator confirmation: sample the sensor and advance `wizard`.
    ///
    /// When the second step completes, the bounds are persisted and the
    /// position is reset to fully closed.
    pub fn confirm_calibration_step(
        &mut self,
        wizard: &mut CalibrationWizard,
    ) -> Result<CalibrationProgress, ControlError> {
        let raw = self.read_sensor()?;
        match wizard.confirm(raw) {
            Ok(WizardState::Done(bounds)) => {
                self.commit_calibration(bounds)?;
                Ok(CalibrationProgress::Complete(bounds))
            }
            Ok(_) => {
                info!(raw, "captured closed-end reading");
                Ok(CalibrationProgress::Captured(raw))
            }
            Err(CalibrationError::AlreadyComplete) => {
                Err(ControlError::Calibration(CalibrationError::AlreadyComplete))
            }
            Err(e) => {
                warn!(raw, reason = %e, "calibration rejected, starting over");
                Ok(CalibrationProgress::Rejected(e))
            }
        }
    }

    /// Persist `bounds`, reset the stored position to 0 and start using them.
    pub fn commit_calibration(&mut self, bounds: CalibrationBounds) -> Result<(), ControlError> {
        self.store.save_bounds(&bounds)?;
        self.store.save_position(FULLY_CLOSED)?;
        self.motion = MotionController::new(&self.config, FULLY_CLOSED, self.clock.now());
        self.bounds = Some(bounds);
        info!(%bounds, "calibration saved");
        Ok(())
    }

    /// Run one control cycle.
    ///
    /// Checks the override button first. Unless an override is suppressing
    /// sensor-driven control, the sensor is sampled, mapped to a target and the
    /// valve driven one step toward it. The idle shut-off runs last in every
    /// case.
    pub fn run_cycle(&mut self) -> Result<CycleReport, ControlError> {
        let bounds = self.bounds.ok_or(ControlError::NotCalibrated)?;

        let pressed = self
            .trigger
            .confirm_press(&mut self.clock, self.config.debounce_ms)
            .map_err(|e| {
                error!(error = ?e, "override input read failed");
                ControlError::Input
            })?;
        if pressed {
            self.force_close()?;
        }

        let mut outcome = if pressed {
            CycleOutcome::Overridden
        } else {
            CycleOutcome::Holding
        };

        let now = self.clock.now();
        if self
            .override_state
            .suppresses(now, self.config.override_suppression_ms)
        {
            if !pressed {
                outcome = CycleOutcome::Suppressed;
            }
        } else {
            let raw = self.read_sensor()?;
            let mapping = self.mapper.map(raw, self.motion.state().last_raw, &bounds);
            // The estimate only advances once the drive has taken the step.
            let mut planner = self.motion.clone();
            match planner.plan(&mapping, now) {
                Some(motion) => {
                    self.apply(motion.command())?;
                    self.motion = planner;
                    self.clock.delay_ms(self.config.settle_ms);
                    self.store.save_position(motion.to)?;
                    outcome = CycleOutcome::Moved(motion);
                }
                None => self.motion = planner,
            }
        }

        let now = self.clock.now();
        if self.motion.idle_expired(now) && !self.command.is_idle() {
            debug!(now, "idle timeout, releasing drive");
            self.apply(DriveCommand::IDLE)?;
        }

        let state = self.motion.state();
        Ok(CycleReport {
            outcome,
            raw: state.last_raw,
            bounds,
            target: state.target,
            current: state.current,
            command: self.command,
        })
    }

    /// Drive fully closed at full power, then wait for the button to be let go.
    fn force_close(&mut self) -> Result<(), ControlError> {
        let now = self.clock.now();
        warn!(now, "manual override, forcing valve closed");
        self.override_state.activate(now);

        self.apply(DriveCommand::new(Direction::Close, MAX_MAGNITUDE))?;
        self.clock.delay_ms(self.config.override_dwell_ms);
        self.apply(DriveCommand::IDLE)?;

        self.motion.force_position(FULLY_CLOSED);
        self.store.save_position(FULLY_CLOSED)?;

        self.trigger
            .wait_for_release(&mut self.clock, self.config.release_poll_ms)
            .map_err(|e| {
                error!(error = ?e, "override input read failed");
                ControlError::Input
            })?;
        info!("override released");
        Ok(())
    }

    fn read_sensor(&mut self) -> Result<u16, ControlError> {
        let raw = self.sensor.read_raw().map_err(|e| {
            error!(error = ?e, "position sensor read failed");
            ControlError::Sensor
        })?;
        Ok(raw.min(self.config.sensor_max))
    }

    fn apply(&mut self, command: DriveCommand) -> Result<(), ControlError> {
        self.drive.apply(command).map_err(|e| {
            error!(error = ?e, %command, "drive command failed");
            ControlError::Drive
        })?;
        self.command = command;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FakeClock, FakePin, FakeSensor, RecordingDrive};
    use crate::store::{Field, MemoryStorage};

    type TestController =
        ValveController<FakeSensor, RecordingDrive, FakePin, MemoryStorage<64>, FakeClock>;

    struct Rig {
        clock: FakeClock,
        sensor: FakeSensor,
        drive: RecordingDrive,
        pin: FakePin,
        ctrl: TestController,
    }

    fn calibrated_storage(min: i32, max: i32, position: u8) -> MemoryStorage<64> {
        let mut store = PersistentStore::new(MemoryStorage::new());
        store
            .save_bounds(&CalibrationBounds::new(min, max, 1023).unwrap())
            .unwrap();
        store.save_position(position).unwrap();
        store.into_inner()
    }

    fn rig_with(storage: MemoryStorage<64>, raw: u16) -> Rig {
        let clock = FakeClock::new();
        let sensor = FakeSensor::new(raw);
        let drive = RecordingDrive::new(clock.clone());
        let pin = FakePin::new(clock.clone());
        let ctrl = ValveController::new(
            ControlConfig::default(),
            sensor.clone(),
            drive.clone(),
            pin.clone(),
            storage,
            clock.clone(),
        )
        .unwrap();
        drive.clear();
        Rig {
            clock,
            sensor,
            drive,
            pin,
            ctrl,
        }
    }

    /// Calibrated 0..1000 with `position` stored, sensor reading `raw`.
    fn rig(raw: u16, position: u8) -> Rig {
        let mut rig = rig_with(calibrated_storage(0, 1000, position), raw);
        assert!(matches!(rig.ctrl.load().unwrap(), Boot::Ready(_)));
        rig
    }

    fn stored(ctrl: &TestController, field: Field) -> i32 {
        PersistentStore::new(ctrl.store().storage().clone())
            .get(field)
            .unwrap()
    }

    #[test]
    fn test_new_idles_drive_and_rejects_bad_config() {
        let clock = FakeClock::new();
        let drive = RecordingDrive::new(clock.clone());
        let ctrl = ValveController::new(
            ControlConfig::default(),
            FakeSensor::new(0),
            drive.clone(),
            FakePin::new(clock.clone()),
            MemoryStorage::<64>::new(),
            clock.clone(),
        )
        .unwrap();
        assert_eq!(drive.take(), vec![(0, DriveCommand::IDLE)]);
        assert!(ctrl.drive_command().is_idle());

        let bad = ControlConfig {
            ramp_step: 0,
            ..ControlConfig::default()
        };
        let result = ValveController::new(
            bad,
            FakeSensor::new(0),
            drive,
            FakePin::new(clock.clone()),
            MemoryStorage::<64>::new(),
            clock,
        );
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn test_uncalibrated_controller_refuses_to_run() {
        let mut rig = rig_with(MemoryStorage::new(), 500);
        assert_eq!(
            rig.ctrl.load().unwrap(),
            Boot::NeedsCalibration(CalibrationError::NegativeMinimum(-1))
        );
        assert_eq!(rig.ctrl.run_cycle(), Err(ControlError::NotCalibrated));
        assert!(rig.drive.take().is_empty());
    }

    #[test]
    fn test_calibration_persists_bounds_and_resets_position() {
        let mut storage = PersistentStore::new(MemoryStorage::<64>::new());
        storage.save_position(70).unwrap();
        let mut rig = rig_with(storage.into_inner(), 120);
        assert!(matches!(rig.ctrl.load().unwrap(), Boot::NeedsCalibration(_)));
        assert_eq!(rig.ctrl.state().current, 70);

        let mut wizard = rig.ctrl.calibration_wizard();
        assert_eq!(
            rig.ctrl.confirm_calibration_step(&mut wizard),
            Ok(CalibrationProgress::Captured(120))
        );
        rig.sensor.set(900);
        let expected = CalibrationBounds::new(120, 900, 1023).unwrap();
        assert_eq!(
            rig.ctrl.confirm_calibration_step(&mut wizard),
            Ok(CalibrationProgress::Complete(expected))
        );

        assert_eq!(rig.ctrl.bounds(), Some(expected));
        assert_eq!(rig.ctrl.state().current, 0);
        assert_eq!(stored(&rig.ctrl, Field::MinCalibration), 120);
        assert_eq!(stored(&rig.ctrl, Field::MaxCalibration), 900);
        assert_eq!(stored(&rig.ctrl, Field::Position), 0);

        assert_eq!(
            rig.ctrl.confirm_calibration_step(&mut wizard),
            Err(ControlError::Calibration(CalibrationError::AlreadyComplete))
        );
    }

    #[test]
    fn test_calibration_rejects_inverted_pair() {
        let mut rig = rig_with(MemoryStorage::new(), 900);
        rig.ctrl.load().unwrap();
        let mut wizard = rig.ctrl.calibration_wizard();
        rig.ctrl.confirm_calibration_step(&mut wizard).unwrap();
        rig.sensor.set(100);
        assert_eq!(
            rig.ctrl.confirm_calibration_step(&mut wizard),
            Ok(CalibrationProgress::Rejected(CalibrationError::EmptyRange {
                min_raw: 900,
                max_raw: 100
            }))
        );
        assert_eq!(wizard.state(), WizardState::AwaitingMinConfirm);
        assert_eq!(rig.ctrl.bounds(), None);
    }

    #[test]
    fn test_erase_forgets_calibration() {
        let mut rig = rig(500, 50);
        rig.ctrl.erase_store().unwrap();
        assert_eq!(rig.ctrl.bounds(), None);
        assert_eq!(rig.ctrl.run_cycle(), Err(ControlError::NotCalibrated));
        assert!(rig.ctrl.store().storage().bytes().iter().all(|b| *b == 0));
        assert_eq!(
            rig.ctrl.load().unwrap(),
            Boot::NeedsCalibration(CalibrationError::EmptyRange {
                min_raw: 0,
                max_raw: 0
            })
        );
    }

    #[test]
    fn test_cycle_at_target_is_idempotent() {
        let mut rig = rig(500, 50);
        let writes = rig.ctrl.store().storage().write_count();
        for _ in 0..20 {
            let report = rig.ctrl.run_cycle().unwrap();
            assert_eq!(report.outcome, CycleOutcome::Holding);
            assert_eq!((report.target, report.current), (50, 50));
            rig.clock.advance(50);
        }
        assert!(rig.drive.take().is_empty());
        assert_eq!(rig.ctrl.store().storage().write_count(), writes);
    }

    #[test]
    fn test_move_persists_and_reports() {
        let mut rig = rig(560, 50);
        let report = rig.ctrl.run_cycle().unwrap();
        let CycleOutcome::Moved(motion) = report.outcome else {
            panic!("expected a move, got {:?}", report.outcome);
        };
        assert_eq!(motion.direction, Direction::Open);
        assert_eq!((motion.from, motion.to, motion.magnitude), (50, 55, 60));
        assert_eq!(report.target, 60);
        assert_eq!(stored(&rig.ctrl, Field::Position), 55);
        // Settle pause after driving.
        assert_eq!(rig.clock.now(), 100);
        assert_eq!(
            report.to_string(),
            "raw: 560 - min: 0 - max: 1000 - target: 60% - current: 55%"
        );
    }

    #[test]
    fn test_failed_drive_leaves_estimate_untouched() {
        let mut rig = rig(560, 50);
        rig.drive.set_failing(true);
        assert_eq!(rig.ctrl.run_cycle(), Err(ControlError::Drive));
        assert_eq!(rig.ctrl.state().current, 50);
        assert_eq!(rig.ctrl.state().last_move_at, 0);
        assert_eq!(stored(&rig.ctrl, Field::Position), 50);

        rig.drive.set_failing(false);
        rig.clock.advance(50);
        let report = rig.ctrl.run_cycle().unwrap();
        assert!(matches!(report.outcome, CycleOutcome::Moved(_)));
        assert_eq!(report.current, 55);
        assert_eq!(rig.ctrl.state().last_move_at, 50);
        assert_eq!(stored(&rig.ctrl, Field::Position), 55);
    }

    #[test]
    fn test_idle_timeout_releases_drive_once() {
        let mut rig = rig(560, 50);
        rig.ctrl.run_cycle().unwrap();
        rig.sensor.set(530);

        while rig.clock.now() < 1_000 {
            rig.clock.advance(50);
            let report = rig.ctrl.run_cycle().unwrap();
            assert_eq!(report.target, 55);
            assert_eq!(report.current, 55);
        }

        assert_eq!(
            rig.drive.take(),
            vec![
                (0, DriveCommand::new(Direction::Open, 60)),
                (550, DriveCommand::IDLE),
            ]
        );
        assert!(rig.ctrl.drive_command().is_idle());
    }

    #[test]
    fn test_extremes_reached_exactly() {
        let mut rig = rig(0, 37);
        let report = rig.ctrl.run_cycle().unwrap();
        assert_eq!((report.target, report.current), (0, 0));
        assert_eq!(stored(&rig.ctrl, Field::Position), 0);
        rig.clock.advance(50);
        assert_eq!(rig.ctrl.run_cycle().unwrap().outcome, CycleOutcome::Holding);

        rig.sensor.set(1000);
        rig.clock.advance(50);
        let report = rig.ctrl.run_cycle().unwrap();
        let CycleOutcome::Moved(motion) = report.outcome else {
            panic!("expected a move, got {:?}", report.outcome);
        };
        assert_eq!(motion.magnitude, MAX_MAGNITUDE);
        assert_eq!(report.current, 100);
        assert_eq!(stored(&rig.ctrl, Field::Position), 100);
    }

    #[test]
    fn test_override_forces_close_and_suppresses_control() {
        // 680 normalizes to 68, which the active band stretches to 80.
        let mut rig = rig(680, 60);
        rig.pin.press_for(300);

        let report = rig.ctrl.run_cycle().unwrap();
        assert_eq!(report.outcome, CycleOutcome::Overridden);
        assert_eq!(report.current, 0);
        assert_eq!(
            rig.drive.take(),
            vec![
                (50, DriveCommand::new(Direction::Close, MAX_MAGNITUDE)),
                (2_050, DriveCommand::IDLE),
            ]
        );
        assert_eq!(stored(&rig.ctrl, Field::Position), 0);
        assert_eq!(rig.ctrl.override_state().activated_at, 50);

        while rig.clock.now() + 50 < 5_050 {
            rig.clock.advance(50);
            let report = rig.ctrl.run_cycle().unwrap();
            assert_eq!(report.outcome, CycleOutcome::Suppressed);
            assert_eq!(report.current, 0);
        }
        assert!(rig.drive.take().is_empty());

        rig.clock.advance(50);
        let report = rig.ctrl.run_cycle().unwrap();
        assert_eq!(report.target, 80);
        assert!(matches!(report.outcome, CycleOutcome::Moved(_)));
        assert_eq!(
            rig.drive.take(),
            vec![(5_050, DriveCommand::new(Direction::Open, 130))]
        );
        assert!(!rig.ctrl.override_state().active);
    }

    #[test]
    fn test_bounce_does_not_trigger_override() {
        let mut rig = rig(500, 50);
        rig.pin.press_for(10);
        let report = rig.ctrl.run_cycle().unwrap();
        assert_eq!(report.outcome, CycleOutcome::Holding);
        assert!(!rig.ctrl.override_state().active);
        assert!(rig.drive.take().is_empty());
    }
}

//! Test doubles shared by the unit tests.

use core::convert::Infallible;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin};

use crate::clock::{Clock, Millis};
use crate::drive::{DriveCommand, ValveDrive};
use crate::sensor::PositionSensor;

/// Clock that only moves when something delays on it.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    nanos: Rc<Cell<u64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: Millis) {
        self.nanos.set(self.nanos.get() + ms * 1_000_000);
    }
}

impl DelayNs for FakeClock {
    fn delay_ns(&mut self, ns: u32) {
        self.nanos.set(self.nanos.get() + u64::from(ns));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(Millis::from(ms));
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Millis {
        self.nanos.get() / 1_000_000
    }
}

/// Button that reads pressed until a deadline on the shared clock.
#[derive(Debug, Clone)]
pub struct FakePin {
    clock: FakeClock,
    pressed_until: Rc<Cell<Millis>>,
}

impl FakePin {
    pub fn new(clock: FakeClock) -> Self {
        FakePin {
            clock,
            pressed_until: Rc::new(Cell::new(0)),
        }
    }

    /// Hold the button for `ms` from now.
    pub fn press_for(&self, ms: Millis) {
        self.pressed_until.set(self.clock.now() + ms);
    }
}

impl ErrorType for FakePin {
    type Error = Infallible;
}

impl InputPin for FakePin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.is_low().map(|low| !low)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.clock.now() < self.pressed_until.get())
    }
}

/// Potentiometer whose reading is set from the test.
#[derive(Debug, Clone, Default)]
pub struct FakeSensor {
    raw: Rc<Cell<u16>>,
}

impl FakeSensor {
    pub fn new(raw: u16) -> Self {
        FakeSensor {
            raw: Rc::new(Cell::new(raw)),
        }
    }

    pub fn set(&self, raw: u16) {
        self.raw.set(raw);
    }
}

impl PositionSensor for FakeSensor {
    type Error = Infallible;

    fn read_raw(&mut self) -> Result<u16, Self::Error> {
        Ok(self.raw.get())
    }
}

/// Drive that records every command with the time it was applied.
#[derive(Debug, Clone)]
pub struct RecordingDrive {
    clock: FakeClock,
    log: Rc<RefCell<Vec<(Millis, DriveCommand)>>>,
    failing: Rc<Cell<bool>>,
}

/// Output stage fault reported by [`RecordingDrive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveFault;

impl RecordingDrive {
    pub fn new(clock: FakeClock) -> Self {
        RecordingDrive {
            clock,
            log: Rc::new(RefCell::new(Vec::new())),
            failing: Rc::new(Cell::new(false)),
        }
    }

    /// Reject every command until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    /// Drain the recorded commands.
    pub fn take(&self) -> Vec<(Millis, DriveCommand)> {
        self.log.borrow_mut().drain(..).collect()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}

impl ValveDrive for RecordingDrive {
    type Error = DriveFault;

    fn apply(&mut self, command: DriveCommand) -> Result<(), Self::Error> {
        if self.failing.get() {
            return Err(DriveFault);
        }
        self.log.borrow_mut().push((self.clock.now(), command));
        Ok(())
    }
}

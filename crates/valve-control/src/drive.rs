//! Two-channel PWM drive for the valve motor.
//!
//! The H-bridge has one PWM input per direction. Energizing both at once
//! shorts the bridge, so the API never exposes the channels separately:
//! callers hand over a [`Direction`] and a magnitude and get a
//! [`DriveCommand`] in which at most one channel is nonzero.

use core::fmt::{self, Debug};

use embedded_hal::pwm::{Error as _, ErrorKind, SetDutyCycle};

use crate::MAX_MAGNITUDE;

/// Direction of valve travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Drive toward fully open.
    Open,
    /// Drive toward fully closed.
    Close,
    /// Both channels off; the motor coasts.
    Idle,
}

/// Magnitudes applied to the open and close channels.
///
/// Built only from a [`Direction`], so at most one magnitude is nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveCommand {
    open_magnitude: u8,
    close_magnitude: u8,
}

impl DriveCommand {
    /// Both channels off.
    pub const IDLE: DriveCommand = DriveCommand {
        open_magnitude: 0,
        close_magnitude: 0,
    };

    /// Command `magnitude` (0–255) in `direction`. The magnitude is ignored for [`Direction::Idle`].
    pub const fn new(direction: Direction, magnitude: u8) -> Self {
        match direction {
            Direction::Open => DriveCommand {
                open_magnitude: magnitude,
                close_magnitude: 0,
            },
            Direction::Close => DriveCommand {
                open_magnitude: 0,
                close_magnitude: magnitude,
            },
            Direction::Idle => DriveCommand::IDLE,
        }
    }

    /// Magnitude on the open channel.
    pub fn open_magnitude(&self) -> u8 {
        self.open_magnitude
    }

    /// Magnitude on the close channel.
    pub fn close_magnitude(&self) -> u8 {
        self.close_magnitude
    }

    /// Effective direction. A zero-magnitude command is idle.
    pub fn direction(&self) -> Direction {
        if self.open_magnitude > 0 {
            Direction::Open
        } else if self.close_magnitude > 0 {
            Direction::Close
        } else {
            Direction::Idle
        }
    }

    /// Magnitude on whichever channel is active.
    pub fn magnitude(&self) -> u8 {
        self.open_magnitude.max(self.close_magnitude)
    }

    /// Whether both channels are off.
    pub fn is_idle(&self) -> bool {
        self.direction() == Direction::Idle
    }
}

impl fmt::Display for DriveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "open {} / close {}", self.open_magnitude, self.close_magnitude)
    }
}

/// Core trait for the valve actuator.
pub trait ValveDrive {
    /// Error reported by the output stage.
    type Error: Debug;

    /// Apply a command to the hardware.
    fn apply(&mut self, command: DriveCommand) -> Result<(), Self::Error>;

    /// Drive in `direction` at `magnitude`, returning the command that was applied.
    fn set_drive(&mut self, direction: Direction, magnitude: u8) -> Result<DriveCommand, Self::Error> {
        let command = DriveCommand::new(direction, magnitude);
        self.apply(command)?;
        Ok(command)
    }
}

/// H-bridge PWM input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Input that drives the valve open (RPWM on a BTS7960).
    Open,
    /// Input that drives the valve closed (LPWM on a BTS7960).
    Close,
}

/// A PWM channel rejected a duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelError {
    /// Channel that failed.
    pub channel: Channel,
    /// What went wrong.
    pub kind: ErrorKind,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} channel: {:?}", self.channel, self.kind)
    }
}

impl core::error::Error for ChannelError {}

/// [`ValveDrive`] over two `embedded-hal` PWM channels.
///
/// Magnitudes 0–255 are scaled onto each channel's duty range. On every
/// command the channel that must be off is written first, so a direction
/// reversal never has both inputs high, even for one write.
pub struct HBridge<O, C> {
    open: O,
    close: C,
    command: DriveCommand,
}

impl<O, C> HBridge<O, C>
where
    O: SetDutyCycle,
    C: SetDutyCycle,
{
    /// Take ownership of both channels and switch them off.
    pub fn new(open: O, close: C) -> Result<Self, ChannelError> {
        let mut bridge = HBridge {
            open,
            close,
            command: DriveCommand::IDLE,
        };
        bridge.apply(DriveCommand::IDLE)?;
        Ok(bridge)
    }

    /// Last command applied.
    pub fn command(&self) -> DriveCommand {
        self.command
    }

    /// Give the channels back.
    pub fn release(self) -> (O, C) {
        (self.open, self.close)
    }

    fn write_open(&mut self, magnitude: u8) -> Result<(), ChannelError> {
        self.open
            .set_duty_cycle_fraction(u16::from(magnitude), u16::from(MAX_MAGNITUDE))
            .map_err(|e| ChannelError {
                channel: Channel::Open,
                kind: e.kind(),
            })
    }

    fn write_close(&mut self, magnitude: u8) -> Result<(), ChannelError> {
        self.close
            .set_duty_cycle_fraction(u16::from(magnitude), u16::from(MAX_MAGNITUDE))
            .map_err(|e| ChannelError {
                channel: Channel::Close,
                kind: e.kind(),
            })
    }
}

impl<O, C> ValveDrive for HBridge<O, C>
where
    O: SetDutyCycle,
    C: SetDutyCycle,
{
    type Error = ChannelError;

    fn apply(&mut self, command: DriveCommand) -> Result<(), Self::Error> {
        match command.direction() {
            Direction::Open => {
                self.write_close(0)?;
                self.write_open(command.open_magnitude())?;
            }
            Direction::Close => {
                self.write_open(0)?;
                self.write_close(command.close_magnitude())?;
            }
            Direction::Idle => {
                self.write_open(0)?;
                self.write_close(0)?;
            }
        }
        self.command = command;
        Ok(())
    }
}

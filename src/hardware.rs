//! Host stand-ins for the board peripherals.

use std::convert::Infallible;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use spin_sleep::SpinSleeper;
use tracing::{debug, info, warn};
use valve_control::{Channel, Clock, Millis, PositionSensor, Storage};

use crate::blackboard::Blackboard;

/// Monotonic clock since bench start; delays spin-sleep.
#[derive(Debug, Clone)]
pub struct HostClock {
    origin: Instant,
    sleeper: SpinSleeper,
}

impl HostClock {
    pub fn new() -> Self {
        HostClock {
            origin: Instant::now(),
            sleeper: SpinSleeper::new(1_000),
        }
    }
}

impl DelayNs for HostClock {
    fn delay_ns(&mut self, ns: u32) {
        self.sleeper.sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.sleeper.sleep(Duration::from_millis(u64::from(ms)));
    }
}

impl Clock for HostClock {
    fn now(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

/// Reads the simulated knob off the blackboard.
pub struct SimSensor {
    bb: Blackboard,
}

impl SimSensor {
    pub fn new(bb: Blackboard) -> Self {
        SimSensor { bb }
    }
}

impl PositionSensor for SimSensor {
    type Error = Infallible;

    fn read_raw(&mut self) -> Result<u16, Self::Error> {
        Ok(self.bb.read().knob_raw)
    }
}

/// Override button; reads low while `press` is in effect.
pub struct SimButton {
    bb: Blackboard,
}

impl SimButton {
    pub fn new(bb: Blackboard) -> Self {
        SimButton { bb }
    }
}

impl digital::ErrorType for SimButton {
    type Error = Infallible;
}

impl InputPin for SimButton {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.bb.read().button_pressed)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.bb.read().button_pressed)
    }
}

/// One 8-bit PWM output of the H-bridge, mirrored onto the blackboard.
pub struct SimPwmChannel {
    bb: Blackboard,
    channel: Channel,
}

impl SimPwmChannel {
    pub fn new(bb: Blackboard, channel: Channel) -> Self {
        SimPwmChannel { bb, channel }
    }
}

impl pwm::ErrorType for SimPwmChannel {
    type Error = Infallible;
}

impl SetDutyCycle for SimPwmChannel {
    fn max_duty_cycle(&self) -> u16 {
        255
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let mut g = self.bb.write();
        let slot = match self.channel {
            Channel::Open => &mut g.open_duty,
            Channel::Close => &mut g.close_duty,
        };
        if *slot != duty {
            debug!(channel = ?self.channel, duty, "pwm duty");
        }
        *slot = duty;
        Ok(())
    }
}

/// EEPROM emulated by a fixed-size image file.
///
/// The whole image is kept in memory; every write goes straight through to
/// the file and is synced before returning.
pub struct FileEeprom {
    path: PathBuf,
    file: File,
    image: Vec<u8>,
}

impl FileEeprom {
    /// Open `path`, creating a factory-fresh (all `0xFF`) image of `size` bytes if needed.
    pub fn open(path: impl AsRef<Path>, size: usize) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("opening EEPROM image {}", path.display()))?;

        let mut image = Vec::with_capacity(size);
        file.read_to_end(&mut image)
            .with_context(|| format!("reading EEPROM image {}", path.display()))?;

        if image.len() != size {
            if image.is_empty() {
                info!(path = %path.display(), size, "creating blank EEPROM image");
            } else {
                warn!(
                    path = %path.display(),
                    found = image.len(),
                    size,
                    "EEPROM image has the wrong size, resizing"
                );
            }
            image.resize(size, 0xFF);
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&image)?;
            file.sync_data()
                .with_context(|| format!("writing EEPROM image {}", path.display()))?;
        }

        Ok(FileEeprom { path, file, image })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn range(&self, offset: usize, len: usize) -> io::Result<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.image.len() => Ok(offset..end),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} bytes at offset {} overruns {}-byte EEPROM",
                    len,
                    offset,
                    self.image.len()
                ),
            )),
        }
    }
}

impl Storage for FileEeprom {
    type Error = io::Error;

    fn capacity(&self) -> usize {
        self.image.len()
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.image[range]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, data.len())?;
        self.image[range].copy_from_slice(data);
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(data)?;
        self.file.sync_data()
    }
}

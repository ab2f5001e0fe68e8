//! Byte-addressed non-volatile storage for position and calibration.
//!
//! Layout, one little-endian `i32` per field:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | last known position (0–100) |
//! | 4 | calibrated minimum reading |
//! | 8 | calibrated maximum reading |
//!
//! The store does not checksum anything. A corrupted cell shows up as
//! invalid calibration at boot, or as an out-of-range position that is
//! clamped on load.

use core::fmt::Debug;

use tracing::{error, warn};

use crate::calibration::CalibrationBounds;
use crate::error::StoreError;
use crate::{FULLY_CLOSED, FULLY_OPEN};

/// Raw non-volatile memory, addressed by byte.
pub trait Storage {
    /// Error reported by the device.
    type Error: Debug;

    /// Size of the device in bytes.
    fn capacity(&self) -> usize;

    /// Fill `buf` from `offset`.
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `data` at `offset`. Returns once the bytes are committed.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error>;
}

/// Persisted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Last known valve position.
    Position,
    /// Reading at the fully-closed end.
    MinCalibration,
    /// Reading at the fully-open end.
    MaxCalibration,
}

impl Field {
    /// Width of every field in bytes.
    pub const WIDTH: usize = 4;

    /// Byte offset of the field.
    pub const fn offset(self) -> usize {
        match self {
            Field::Position => 0,
            Field::MinCalibration => 4,
            Field::MaxCalibration => 8,
        }
    }
}

/// Typed access to the fixed layout on top of a [`Storage`] device.
pub struct PersistentStore<S> {
    storage: S,
}

impl<S: Storage> PersistentStore<S> {
    /// Wrap a storage device.
    pub fn new(storage: S) -> Self {
        PersistentStore { storage }
    }

    /// The underlying device.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Give the device back.
    pub fn into_inner(self) -> S {
        self.storage
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), StoreError> {
        let capacity = self.storage.capacity();
        match offset.checked_add(len) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(StoreError::OutOfRange {
                offset,
                len,
                capacity,
            }),
        }
    }

    /// Read one field.
    pub fn get(&mut self, field: Field) -> Result<i32, StoreError> {
        let offset = field.offset();
        self.check_range(offset, Field::WIDTH)?;
        let mut bytes = [0u8; Field::WIDTH];
        self.storage.read(offset, &mut bytes).map_err(|e| {
            error!(error = ?e, field = ?field, "storage read failed");
            StoreError::Device("read failed")
        })?;
        Ok(i32::from_le_bytes(bytes))
    }

    /// Write one field.
    pub fn put(&mut self, field: Field, value: i32) -> Result<(), StoreError> {
        let offset = field.offset();
        self.check_range(offset, Field::WIDTH)?;
        self.storage
            .write(offset, &value.to_le_bytes())
            .map_err(|e| {
                error!(error = ?e, field = ?field, "storage write failed");
                StoreError::Device("write failed")
            })
    }

    /// Write zero to every byte of the device (factory reset).
    pub fn erase(&mut self) -> Result<(), StoreError> {
        const CHUNK: [u8; 32] = [0; 32];
        let capacity = self.storage.capacity();
        let mut offset = 0;
        while offset < capacity {
            let len = CHUNK.len().min(capacity - offset);
            self.storage.write(offset, &CHUNK[..len]).map_err(|e| {
                error!(error = ?e, offset, "storage erase failed");
                StoreError::Device("erase failed")
            })?;
            offset += len;
        }
        Ok(())
    }

    /// Stored position, clamped into 0–100.
    pub fn load_position(&mut self) -> Result<u8, StoreError> {
        let stored = self.get(Field::Position)?;
        let position = stored.clamp(i32::from(FULLY_CLOSED), i32::from(FULLY_OPEN));
        if position != stored {
            warn!(stored, position, "stored position out of range, clamping");
        }
        Ok(position as u8)
    }

    /// Persist the position estimate.
    pub fn save_position(&mut self, position: u8) -> Result<(), StoreError> {
        self.put(Field::Position, i32::from(position))
    }

    /// Stored `(min, max)` calibration readings, unvalidated.
    pub fn read_bounds(&mut self) -> Result<(i32, i32), StoreError> {
        Ok((self.get(Field::MinCalibration)?, self.get(Field::MaxCalibration)?))
    }

    /// Persist calibration bounds.
    pub fn save_bounds(&mut self, bounds: &CalibrationBounds) -> Result<(), StoreError> {
        self.put(Field::MinCalibration, i32::from(bounds.min_raw()))?;
        self.put(Field::MaxCalibration, i32::from(bounds.max_raw()))
    }
}

/// RAM-backed [`Storage`] of `N` bytes.
///
/// Starts in the factory state of an unprogrammed EEPROM (all `0xFF`) and
/// counts writes, which makes it handy for checking persistence behavior.
#[derive(Debug, Clone)]
pub struct MemoryStorage<const N: usize> {
    bytes: [u8; N],
    writes: usize,
}

impl<const N: usize> MemoryStorage<N> {
    /// Fresh device, every byte `0xFF`.
    pub fn new() -> Self {
        MemoryStorage {
            bytes: [0xFF; N],
            writes: 0,
        }
    }

    /// Raw contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of write calls so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl<const N: usize> Default for MemoryStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Storage for MemoryStorage<N> {
    type Error = StoreError;

    fn capacity(&self) -> usize {
        N
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        let src = offset
            .checked_add(buf.len())
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(StoreError::OutOfRange {
                offset,
                len: buf.len(),
                capacity: N,
            })?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error> {
        let dst = offset
            .checked_add(data.len())
            .and_then(|end| self.bytes.get_mut(offset..end))
            .ok_or(StoreError::OutOfRange {
                offset,
                len: data.len(),
                capacity: N,
            })?;
        dst.copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}

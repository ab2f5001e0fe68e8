//! Monotonic time and blocking delays.

use embedded_hal::delay::DelayNs;

/// Milliseconds on the controller's monotonic clock.
pub type Millis = u64;

/// A monotonic millisecond clock that can also busy-wait.
///
/// Every timer in the controller (idle shut-off, override suppression, boot
/// erase window) is an elapsed-time comparison against a [`Millis`] stamp
/// taken from this clock. The fixed pauses (debounce, override dwell, move
/// settle) go through the [`DelayNs`] supertrait, so on a board the same
/// object usually wraps the system timer.
pub trait Clock: DelayNs {
    /// Current time.
    fn now(&self) -> Millis;
}

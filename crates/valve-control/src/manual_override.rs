//! Manual force-close trigger.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;

use crate::clock::Millis;

/// Whether a manual override is holding off sensor-driven control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverrideState {
    /// An override happened and its suppression window may still be running.
    pub active: bool,
    /// When the override was confirmed.
    pub activated_at: Millis,
}

impl OverrideState {
    /// Record an override confirmed at `now`.
    pub fn activate(&mut self, now: Millis) {
        self.active = true;
        self.activated_at = now;
    }

    /// Whether sensor-driven control is suspended at `now`.
    ///
    /// The window is measured from activation. Once it has elapsed the state
    /// clears itself and this returns `false`.
    pub fn suppresses(&mut self, now: Millis, window_ms: Millis) -> bool {
        if !self.active {
            return false;
        }
        if now.saturating_sub(self.activated_at) >= window_ms {
            self.active = false;
            return false;
        }
        true
    }
}

/// Active-low push button with a pull-up.
pub struct OverrideTrigger<P> {
    pin: P,
}

impl<P: InputPin> OverrideTrigger<P> {
    /// Wrap the button input.
    pub fn new(pin: P) -> Self {
        OverrideTrigger { pin }
    }

    /// Button currently pressed (pin pulled low).
    pub fn is_asserted(&mut self) -> Result<bool, P::Error> {
        self.pin.is_low()
    }

    /// Double-read debounce: pressed now and still pressed `debounce_ms` later.
    ///
    /// Does not wait when the first read shows the button released.
    pub fn confirm_press<D: DelayNs>(
        &mut self,
        delay: &mut D,
        debounce_ms: u32,
    ) -> Result<bool, P::Error> {
        if !self.is_asserted()? {
            return Ok(false);
        }
        delay.delay_ms(debounce_ms);
        self.is_asserted()
    }

    /// Block until the button is let go, polling every `poll_ms`.
    pub fn wait_for_release<D: DelayNs>(&mut self, delay: &mut D, poll_ms: u32) -> Result<(), P::Error> {
        while self.is_asserted()? {
            delay.delay_ms(poll_ms);
        }
        Ok(())
    }
}

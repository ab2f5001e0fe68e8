//! Boot-time factory reset window.
//!
//! Right after power-up the operator has a short window to type the erase
//! command on the console. The window itself never touches the store; it only
//! reports whether an erase was requested, and the caller performs it.

use tracing::{debug, info};

use crate::clock::Millis;

/// Console line that requests a full store erase.
pub const ERASE_COMMAND: &str = "BE";

/// Default length of the erase window.
pub const DEFAULT_ERASE_WINDOW_MS: Millis = 10_000;

/// Result of polling the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseWindowStatus {
    /// Still waiting for input.
    Open,
    /// The erase command was received in time.
    EraseRequested,
    /// The window ran out without an erase command.
    Expired,
}

/// Accepts [`ERASE_COMMAND`] for a fixed time after boot.
#[derive(Debug, Clone)]
pub struct EraseWindow {
    opened_at: Millis,
    length_ms: Millis,
    status: EraseWindowStatus,
}

impl EraseWindow {
    /// Open a window of `length_ms` starting at `now`.
    pub fn open(now: Millis, length_ms: Millis) -> Self {
        info!(length_ms, "send '{}' to erase persistent storage", ERASE_COMMAND);
        EraseWindow {
            opened_at: now,
            length_ms,
            status: EraseWindowStatus::Open,
        }
    }

    /// Offer one console line. Surrounding whitespace is ignored.
    ///
    /// Lines arriving after the window closed have no effect.
    pub fn feed_line(&mut self, line: &str, now: Millis) -> EraseWindowStatus {
        if self.poll(now) != EraseWindowStatus::Open {
            return self.status;
        }
        if line.trim() == ERASE_COMMAND {
            self.status = EraseWindowStatus::EraseRequested;
        } else {
            debug!(line, "ignoring console line during erase window");
        }
        self.status
    }

    /// Status at `now`.
    pub fn poll(&mut self, now: Millis) -> EraseWindowStatus {
        if self.status == EraseWindowStatus::Open
            && now.saturating_sub(self.opened_at) >= self.length_ms
        {
            self.status = EraseWindowStatus::Expired;
        }
        self.status
    }

    /// Time left before the window closes, zero once it has.
    pub fn remaining(&self, now: Millis) -> Millis {
        if self.status != EraseWindowStatus::Open {
            return 0;
        }
        self.length_ms
            .saturating_sub(now.saturating_sub(self.opened_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_command_requests_erase() {
        let mut window = EraseWindow::open(0, DEFAULT_ERASE_WINDOW_MS);
        assert_eq!(window.feed_line("  BE\r\n", 3_000), EraseWindowStatus::EraseRequested);
        assert_eq!(window.poll(20_000), EraseWindowStatus::EraseRequested);
        assert_eq!(window.remaining(3_000), 0);
    }

    #[test]
    fn test_other_lines_are_ignored() {
        let mut window = EraseWindow::open(0, DEFAULT_ERASE_WINDOW_MS);
        for line in ["be", "B E", "BEE", "", "erase"] {
            assert_eq!(window.feed_line(line, 100), EraseWindowStatus::Open);
        }
        assert_eq!(window.remaining(100), 9_900);
    }

    #[test]
    fn test_window_expires() {
        let mut window = EraseWindow::open(500, DEFAULT_ERASE_WINDOW_MS);
        assert_eq!(window.poll(10_499), EraseWindowStatus::Open);
        assert_eq!(window.poll(10_500), EraseWindowStatus::Expired);
        assert_eq!(window.feed_line("BE", 10_600), EraseWindowStatus::Expired);
    }
}

// Double-tap detection for the hands-free lock
//
// Two presses of the dictation key within the window lock the session.
// The caller supplies the timestamp so the gate's clock is the only clock.

use std::time::Duration;
use tokio::time::Instant;

/// Default time window for double-tap detection (400ms)
pub const DEFAULT_DOUBLE_TAP_WINDOW_MS: u64 = 400;

/// Detects double-tap patterns within a configurable time window
///
/// Usage:
/// ```ignore
/// let mut detector = DoubleTapDetector::with_window(Duration::from_millis(400));
/// detector.on_tap(now);         // First tap - false
/// detector.on_tap(now + 150ms); // Second tap within window - true
/// ```
#[derive(Debug, Clone)]
pub struct DoubleTapDetector {
    /// Time of the last tap (None if no tap recorded)
    last_tap_time: Option<Instant>,
    window: Duration,
}

impl DoubleTapDetector {
    pub fn with_window(window: Duration) -> Self {
        Self {
            last_tap_time: None,
            window,
        }
    }

    /// Record a tap at `now`.
    ///
    /// Returns true if it lands within the window of the previous tap; the
    /// detector then starts a fresh cycle, so a third tap does not re-trigger.
    pub fn on_tap(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_tap_time {
            if now.saturating_duration_since(last) <= self.window {
                self.last_tap_time = None;
                return true;
            }
        }

        self.last_tap_time = Some(now);
        false
    }

    /// Forget the previous tap (e.g. a press/release cycle completed)
    pub fn reset(&mut self) {
        self.last_tap_time = None;
    }

    pub fn last_tap(&self) -> Option<Instant> {
        self.last_tap_time
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for DoubleTapDetector {
    fn default() -> Self {
        Self::with_window(Duration::from_millis(DEFAULT_DOUBLE_TAP_WINDOW_MS))
    }
}

#[cfg(test)]
#[path = "double_tap_test.rs"]
mod tests;

//! The gate's session record.

use crate::hotkey::double_tap::DoubleTapDetector;
use serde::Serialize;
use tokio::time::Instant;

/// Stored gate states. Cooldown is derived, see [`GateSession::state_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateState {
    Idle,
    /// Lightweight UI shown, waiting for the promotion window
    AwaitingPromotion,
    ActivePtt,
    ActiveHandsFree,
    /// Idle, but new presses are ignored until `cooldown_until`
    Cooldown,
}

#[derive(Debug)]
pub struct GateSession {
    /// Bumped on every session start, lock and reset; delayed tasks compare against it
    pub generation: u64,
    pub state: GateState,
    pub key_is_down: bool,
    pub double_tap: DoubleTapDetector,
    pub started_at: Option<Instant>,
    pub ui_shown_at: Option<Instant>,
    pub cooldown_until: Option<Instant>,
    pub hands_free_locked: bool,
    /// Presses before this instant cannot stop a freshly locked session
    pub hands_free_debounce_until: Option<Instant>,
    /// Generation for which the failsafe already cancelled
    pub failsafe_fired_for: Option<u64>,
}

impl GateSession {
    pub fn new(double_tap: DoubleTapDetector) -> Self {
        Self {
            generation: 0,
            state: GateState::Idle,
            key_is_down: false,
            double_tap,
            started_at: None,
            ui_shown_at: None,
            cooldown_until: None,
            hands_free_locked: false,
            hands_free_debounce_until: None,
            failsafe_fired_for: None,
        }
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.state == GateState::Idle && self.cooldown_until.is_some_and(|until| now < until)
    }

    pub fn in_hands_free_debounce(&self, now: Instant) -> bool {
        self.hands_free_debounce_until
            .is_some_and(|until| now < until)
    }

    /// Externally visible state, with cooldown folded in
    pub fn state_at(&self, now: Instant) -> GateState {
        if self.in_cooldown(now) {
            GateState::Cooldown
        } else {
            self.state
        }
    }

    pub fn bump_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub fn last_down_at(&self) -> Option<Instant> {
        self.double_tap.last_tap()
    }

    /// Copy of the session for observers
    pub fn snapshot(&self, now: Instant) -> GateSnapshot {
        GateSnapshot {
            generation: self.generation,
            state: self.state_at(now),
            key_is_down: self.key_is_down,
            hands_free_locked: self.hands_free_locked,
            started_at: self.started_at,
            cooldown_until: self.cooldown_until,
        }
    }
}

/// Read-only copy of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    pub generation: u64,
    pub state: GateState,
    pub key_is_down: bool,
    pub hands_free_locked: bool,
    pub started_at: Option<Instant>,
    pub cooldown_until: Option<Instant>,
}

//! Safety net for "key released but the pipeline never stopped".
//!
//! After a release the gate waits a short grace period, then asks the
//! pipeline whether a stream is still open. Only when nothing legitimate can
//! explain it does the gate force a cancel, at most once per generation.

use super::commands::PipelineStatus;
use super::session::GateSession;
use std::time::Duration;

/// Default grace period between KeyUp and the failsafe check (300ms)
pub const DEFAULT_FAILSAFE_GRACE_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailsafeDecision {
    Cancel,
    Skip(FailsafeSkip),
}

/// Why the failsafe stood down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailsafeSkip {
    AlreadyFired,
    /// A newer session started after the release
    SessionSuperseded,
    KeyDown,
    HandsFree,
    /// Finalize/insert is still running, the normal stop path owns the pipeline
    Processing,
    PipelineStopped,
}

#[derive(Debug, Clone, Copy)]
pub struct FailsafeWatchdog {
    grace: Duration,
}

impl FailsafeWatchdog {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Decide whether to cancel for the release scheduled at `generation`
    pub fn evaluate(
        &self,
        session: &GateSession,
        generation: u64,
        status: PipelineStatus,
    ) -> FailsafeDecision {
        let skip = if session.failsafe_fired_for == Some(generation) {
            Some(FailsafeSkip::AlreadyFired)
        } else if session.generation != generation {
            Some(FailsafeSkip::SessionSuperseded)
        } else if session.key_is_down {
            Some(FailsafeSkip::KeyDown)
        } else if session.hands_free_locked || status.is_hands_free_locked {
            Some(FailsafeSkip::HandsFree)
        } else if status.is_processing {
            Some(FailsafeSkip::Processing)
        } else if !status.is_recording && !status.is_stream_open {
            Some(FailsafeSkip::PipelineStopped)
        } else {
            None
        };

        match skip {
            Some(reason) => FailsafeDecision::Skip(reason),
            None => FailsafeDecision::Cancel,
        }
    }
}

impl Default for FailsafeWatchdog {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_FAILSAFE_GRACE_MS))
    }
}

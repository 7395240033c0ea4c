// Hotkey readiness watchdog
//
// Right after setup, checks once per interval that the hotkey path is alive:
// either a dictation trigger was observed or the caller reports ready.
// Otherwise it refreshes the handler registration, at most `max_attempts`
// times, and then disables itself for good.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_READINESS_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_READINESS_MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_READINESS_INTERVAL_MS),
            max_attempts: DEFAULT_READINESS_MAX_ATTEMPTS,
        }
    }
}

pub type ReadyCheck = Arc<dyn Fn() -> bool + Send + Sync>;
pub type RefreshAction = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug)]
pub struct ReadinessWatchdog {
    config: ReadinessConfig,
    observed: AtomicBool,
    enabled: AtomicBool,
    attempts: AtomicU32,
}

impl ReadinessWatchdog {
    pub fn new(config: ReadinessConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            observed: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            attempts: AtomicU32::new(0),
        })
    }

    /// A hotkey event arrived; the watchdog stands down at its next check
    pub fn note_event(&self) {
        self.observed.store(true, Ordering::SeqCst);
    }

    pub fn has_observed_event(&self) -> bool {
        self.observed.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Spawn the check loop. Returns None once the watchdog has been disabled.
    pub fn start(
        self: &Arc<Self>,
        ready: ReadyCheck,
        refresh: RefreshAction,
    ) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            return None;
        }
        self.attempts.store(0, Ordering::SeqCst);

        let watchdog = Arc::clone(self);
        Some(tokio::spawn(async move {
            while watchdog.attempts() < watchdog.config.max_attempts {
                tokio::time::sleep(watchdog.config.interval).await;
                if !watchdog.is_enabled() {
                    return;
                }
                if watchdog.observed.load(Ordering::SeqCst) || ready() {
                    crate::debug!("Hotkey readiness confirmed");
                    watchdog.disable();
                    return;
                }
                let attempt = watchdog.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                crate::warn!(
                    "No hotkey events within {:?} (attempt #{}), refreshing handlers",
                    watchdog.config.interval,
                    attempt
                );
                refresh();
            }
            watchdog.disable();
        }))
    }

    /// Stop for good, until the process restarts
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

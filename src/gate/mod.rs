// Input gate: turns dictation key presses into recording-intent commands
//
// A press shows the lightweight UI and waits out the promotion window. Held
// past it, the press becomes push-to-talk; released before it, a mis-touch.
// A second press inside the double-tap window locks a hands-free session.
//
// All session state sits behind one mutex. Every delayed action captures the
// generation it was scheduled for and does nothing if the session moved on.

mod channel;
pub mod commands;
pub mod failsafe;
pub mod session;

pub use channel::{GateEvent, GateHandle, GateSender};
pub use commands::{GateCommand, PipelineStatus, RecordingPipeline};
pub use session::{GateSnapshot, GateState};

use crate::hotkey::double_tap::{DoubleTapDetector, DEFAULT_DOUBLE_TAP_WINDOW_MS};
use failsafe::{FailsafeDecision, FailsafeWatchdog, DEFAULT_FAILSAFE_GRACE_MS};
use parking_lot::Mutex;
use session::GateSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_PROMOTION_WINDOW_MS: u64 = 400;
pub const DEFAULT_MINIMUM_VISIBLE_MS: u64 = 400;
pub const DEFAULT_COOLDOWN_MS: u64 = 280;
pub const DEFAULT_HANDS_FREE_DEBOUNCE_MS: u64 = 600;

/// Timing configuration for the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Hold time before a press becomes push-to-talk (zero = immediate hold)
    pub promotion_window: Duration,
    /// Minimum time the lightweight UI stays up before a mis-touch hides it
    pub minimum_visible: Duration,
    pub double_tap_window: Duration,
    /// After a stop, presses are ignored for this long
    pub cooldown: Duration,
    /// After a hands-free lock, presses cannot stop it for this long
    pub hands_free_debounce: Duration,
    pub failsafe_grace: Duration,
}

impl GateConfig {
    /// Push-to-talk starts on press, with no probation or minimum UI time
    pub fn immediate_hold(mut self) -> Self {
        self.promotion_window = Duration::ZERO;
        self.minimum_visible = Duration::ZERO;
        self
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            promotion_window: Duration::from_millis(DEFAULT_PROMOTION_WINDOW_MS),
            minimum_visible: Duration::from_millis(DEFAULT_MINIMUM_VISIBLE_MS),
            double_tap_window: Duration::from_millis(DEFAULT_DOUBLE_TAP_WINDOW_MS),
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            hands_free_debounce: Duration::from_millis(DEFAULT_HANDS_FREE_DEBOUNCE_MS),
            failsafe_grace: Duration::from_millis(DEFAULT_FAILSAFE_GRACE_MS),
        }
    }
}

/// The gate. Cheap to clone; clones share one session.
///
/// Methods spawn timers with `tokio::spawn` and must run inside a Tokio runtime.
#[derive(Clone)]
pub struct InputGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    config: GateConfig,
    pipeline: Arc<dyn RecordingPipeline>,
    session: Mutex<GateSession>,
    /// Pending promotion timer. Aborting it is an optimisation; the generation check decides.
    promotion_task: Mutex<Option<JoinHandle<()>>>,
    failsafe: FailsafeWatchdog,
}

impl InputGate {
    pub fn new(config: GateConfig, pipeline: Arc<dyn RecordingPipeline>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                config,
                pipeline,
                session: Mutex::new(GateSession::new(DoubleTapDetector::with_window(
                    config.double_tap_window,
                ))),
                promotion_task: Mutex::new(None),
                failsafe: FailsafeWatchdog::new(config.failsafe_grace),
            }),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    /// The dictation key went down
    pub fn key_down(&self) {
        self.inner.key_down(Instant::now());
    }

    /// The dictation key came up
    pub fn key_up(&self) {
        self.inner.key_up(Instant::now());
    }

    /// Dedicated hands-free binding: lock when idle, stop when recording
    pub fn toggle_hands_free(&self) {
        self.inner.toggle_hands_free(Instant::now());
    }

    /// Abandon the current session without emitting anything
    pub fn reset(&self) {
        self.inner.reset();
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.inner.session.lock().snapshot(Instant::now())
    }

    pub fn is_hands_free_locked(&self) -> bool {
        self.inner.session.lock().hands_free_locked
    }
}

impl GateInner {
    fn key_down(self: &Arc<Self>, now: Instant) {
        let mut session = self.session.lock();

        if session.in_cooldown(now) {
            crate::debug!("KeyDown ignored: cooldown");
            return;
        }

        match session.state {
            GateState::ActivePtt => {
                crate::debug!("KeyDown ignored: push-to-talk already active");
            }
            GateState::ActiveHandsFree => {
                session.key_is_down = true;
                if session.in_hands_free_debounce(now) {
                    crate::debug!("KeyDown ignored: hands-free lock debounce");
                    return;
                }
                crate::info!("KeyDown during hands-free session: stopping");
                self.stop_recording(&mut session, now);
            }
            GateState::Idle | GateState::Cooldown | GateState::AwaitingPromotion => {
                if session.state == GateState::Idle {
                    let status = self.pipeline.status();
                    if status.is_recording && status.is_hands_free_locked {
                        crate::info!("KeyDown while pipeline holds a locked session: stopping");
                        session.key_is_down = true;
                        self.stop_recording(&mut session, now);
                        return;
                    }
                }

                let is_double_tap = session.double_tap.on_tap(now);
                if is_double_tap && !session.hands_free_locked {
                    session.key_is_down = true;
                    crate::info!("Double-tap detected: locking hands-free");
                    self.lock_hands_free(&mut session, now);
                    return;
                }

                if session.state == GateState::AwaitingPromotion && session.key_is_down {
                    crate::debug!("KeyDown ignored: press already in progress");
                    return;
                }

                session.key_is_down = true;
                self.begin_session(&mut session, now);
            }
        }
    }

    fn key_up(self: &Arc<Self>, now: Instant) {
        let mut session = self.session.lock();

        if !session.key_is_down {
            crate::debug!("KeyUp without matching KeyDown ignored");
            return;
        }
        session.key_is_down = false;
        let generation = session.generation;

        match session.state {
            GateState::ActivePtt => {
                crate::info!("Push-to-talk released: stopping");
                self.stop_recording(&mut session, now);
            }
            GateState::AwaitingPromotion => {
                self.abort_promotion();
                self.schedule_mis_touch_hide(&mut session, now);
            }
            GateState::ActiveHandsFree => {
                crate::debug!("KeyUp during hands-free session: lock continues");
                return;
            }
            GateState::Idle | GateState::Cooldown => {}
        }

        drop(session);
        self.schedule_failsafe(generation);
    }

    fn toggle_hands_free(self: &Arc<Self>, now: Instant) {
        let mut session = self.session.lock();

        if session.in_cooldown(now) {
            crate::debug!("Hands-free toggle ignored: cooldown");
            return;
        }

        match session.state {
            GateState::ActiveHandsFree => {
                if session.in_hands_free_debounce(now) {
                    crate::debug!("Hands-free toggle ignored: lock debounce");
                    return;
                }
                crate::info!("Hands-free toggle: stopping");
                self.stop_recording(&mut session, now);
            }
            GateState::ActivePtt => {
                crate::info!("Hands-free toggle during push-to-talk: stopping");
                self.stop_recording(&mut session, now);
            }
            GateState::Idle | GateState::Cooldown | GateState::AwaitingPromotion => {
                if session.state == GateState::Idle && self.pipeline.status().is_recording {
                    crate::info!("Hands-free toggle while pipeline is recording: stopping");
                    self.stop_recording(&mut session, now);
                    return;
                }
                crate::info!("Hands-free toggle: locking");
                self.lock_hands_free(&mut session, now);
            }
        }
    }

    fn reset(&self) {
        self.abort_promotion();
        let mut session = self.session.lock();
        let generation = session.bump_generation();
        session.state = GateState::Idle;
        session.key_is_down = false;
        session.hands_free_locked = false;
        session.hands_free_debounce_until = None;
        session.started_at = None;
        session.ui_shown_at = None;
        // Tap history survives so a quick second tap still counts as a double-tap
        crate::debug!("Gate reset (generation {})", generation);
    }

    /// Show the UI and start the promotion window for a fresh press
    fn begin_session(self: &Arc<Self>, session: &mut GateSession, now: Instant) {
        self.abort_promotion();
        let generation = session.bump_generation();
        session.state = GateState::AwaitingPromotion;
        session.ui_shown_at = Some(now);
        session.started_at = None;

        crate::info!("Press started (generation {})", generation);
        self.pipeline.dispatch(GateCommand::ShowLightweightUi);

        if self.config.promotion_window.is_zero() {
            self.promote(session, now);
        } else {
            self.schedule_promotion(generation);
        }
    }

    fn schedule_promotion(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        let window = self.config.promotion_window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            inner.promotion_elapsed(generation);
        });
        if let Some(previous) = self.promotion_task.lock().replace(handle) {
            previous.abort();
        }
    }

    fn promotion_elapsed(&self, generation: u64) {
        let now = Instant::now();
        let mut session = self.session.lock();
        if session.generation != generation {
            crate::debug!(
                "Stale promotion for generation {} (current {})",
                generation,
                session.generation
            );
            return;
        }
        if session.state != GateState::AwaitingPromotion || !session.key_is_down {
            crate::debug!("Promotion skipped: press no longer pending");
            return;
        }
        self.promote(&mut session, now);
    }

    fn promote(&self, session: &mut GateSession, now: Instant) {
        session.state = GateState::ActivePtt;
        session.started_at = Some(now);
        session.hands_free_locked = false;
        crate::info!("Push-to-talk started (generation {})", session.generation);
        self.pipeline
            .dispatch(GateCommand::StartRecording { locked: false });
    }

    fn lock_hands_free(&self, session: &mut GateSession, now: Instant) {
        self.abort_promotion();
        let generation = session.bump_generation();
        session.state = GateState::ActiveHandsFree;
        session.hands_free_locked = true;
        session.started_at = Some(now);
        session.hands_free_debounce_until = Some(now + self.config.hands_free_debounce);
        crate::info!("Hands-free session locked (generation {})", generation);
        self.pipeline
            .dispatch(GateCommand::StartRecording { locked: true });
    }

    fn stop_recording(&self, session: &mut GateSession, now: Instant) {
        self.abort_promotion();
        self.pipeline.dispatch(GateCommand::StopRecording);
        session.state = GateState::Idle;
        session.hands_free_locked = false;
        session.hands_free_debounce_until = None;
        session.started_at = None;
        session.ui_shown_at = None;
        session.cooldown_until = Some(now + self.config.cooldown);
        // A completed cycle never pairs with the next press as a double-tap
        session.double_tap.reset();
    }

    fn schedule_mis_touch_hide(self: &Arc<Self>, session: &mut GateSession, now: Instant) {
        let shown_for = session
            .ui_shown_at
            .map(|shown| now.saturating_duration_since(shown))
            .unwrap_or_default();
        let remaining = self.config.minimum_visible.saturating_sub(shown_for);

        if remaining.is_zero() {
            self.hide_mis_touch(session);
            return;
        }

        let inner = Arc::clone(self);
        let generation = session.generation;
        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            inner.mis_touch_elapsed(generation);
        });
    }

    fn mis_touch_elapsed(&self, generation: u64) {
        let mut session = self.session.lock();
        // The press may have raced into push-to-talk or a new session
        if session.generation != generation
            || session.state != GateState::AwaitingPromotion
            || session.key_is_down
        {
            crate::debug!("Mis-touch hide skipped: session moved on");
            return;
        }
        self.hide_mis_touch(&mut session);
    }

    fn hide_mis_touch(&self, session: &mut GateSession) {
        crate::info!("Mis-touch (generation {}): hiding UI", session.generation);
        self.pipeline.dispatch(GateCommand::QuickHideMisTouch);
        session.state = GateState::Idle;
        session.ui_shown_at = None;
    }

    fn schedule_failsafe(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        let grace = self.failsafe.grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            inner.failsafe_elapsed(generation);
        });
    }

    fn failsafe_elapsed(&self, generation: u64) {
        let mut session = self.session.lock();
        let status = self.pipeline.status();
        match self.failsafe.evaluate(&session, generation, status) {
            FailsafeDecision::Cancel => {
                crate::warn!(
                    "Failsafe: pipeline still active {:?} after release (generation {}), cancelling",
                    self.failsafe.grace(),
                    generation
                );
                self.pipeline.dispatch(GateCommand::CancelImmediate);
                session.failsafe_fired_for = Some(generation);
                session.state = GateState::Idle;
                session.ui_shown_at = None;
                session.started_at = None;
            }
            FailsafeDecision::Skip(reason) => {
                crate::debug!("Failsafe skipped: {:?}", reason);
            }
        }
    }

    fn abort_promotion(&self) {
        if let Some(handle) = self.promotion_task.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;

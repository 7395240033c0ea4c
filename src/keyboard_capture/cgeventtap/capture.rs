//! Listen-only key capture built on [`EventTap`].

use super::callback::TapEvent;
use super::tap::{EventTap, TapMode, TapVerdict};
use crate::keyboard_capture::permissions::{
    has_accessibility_permission, should_prompt_for_permission,
};
use crate::keyboard_capture::{CaptureError, KeyEventCallback};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Delivers every keyboard event to a callback without consuming anything
pub struct CGEventTapCapture {
    tap: EventTap,
    /// Cleared when the OS disabled the tap and it could not be re-enabled
    healthy: Arc<AtomicBool>,
}

impl CGEventTapCapture {
    pub fn new() -> Self {
        Self {
            tap: EventTap::new(TapMode::ListenOnly),
            healthy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start capturing keyboard events
    ///
    /// Returns an error if capture is already running or if permission is not granted.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn start(&mut self, callback: KeyEventCallback) -> Result<(), CaptureError> {
        if self.is_running() {
            return Err(CaptureError::AlreadyRunning);
        }
        if self.tap.is_running() {
            crate::info!("Replacing key capture tap the system disabled");
            self.stop()?;
        }

        let has_permission = has_accessibility_permission(should_prompt_for_permission());
        crate::info!("Accessibility permission check: {}", has_permission);
        if !has_permission {
            return Err(CaptureError::PermissionDenied);
        }

        let healthy = self.healthy.clone();
        healthy.store(true, Ordering::SeqCst);
        let result = self.tap.start(Box::new(move |event| {
            match event {
                TapEvent::Key(key_event) => callback(key_event),
                TapEvent::SystemKey { .. } => {}
                TapEvent::Disabled { restored: true } => {}
                TapEvent::Disabled { restored: false } => {
                    crate::error!("Key capture is down until it is restarted");
                    healthy.store(false, Ordering::SeqCst);
                }
            }
            TapVerdict::Pass
        }));
        if result.is_err() {
            self.healthy.store(false, Ordering::SeqCst);
        }
        result.map_err(CaptureError::Backend)
    }

    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.healthy.store(false, Ordering::SeqCst);
        self.tap.stop().map_err(CaptureError::Backend)
    }

    /// False once the system disabled the tap for good
    pub fn is_running(&self) -> bool {
        self.tap.is_running() && self.healthy.load(Ordering::SeqCst)
    }
}

impl Default for CGEventTapCapture {
    fn default() -> Self {
        Self::new()
    }
}

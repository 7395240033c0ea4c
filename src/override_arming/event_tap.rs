//! Intercepting CGEventTap for a reserved key (macOS).

use super::interceptor::{
    InterceptError, InterceptHandlers, InterceptorHandle, PlatformInputInterceptor,
};
use crate::keyboard_capture::cgeventtap::{EventTap, TapEvent, TapMode, TapVerdict};
use crate::keyboard_capture::keycodes::NX_KEYTYPE_DICTATION;
use crate::keyboard_capture::permissions::{
    has_accessibility_permission, should_prompt_for_permission,
};
use crate::keyboard_capture::KeyEventKind;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct Installed {
    handle: InterceptorHandle,
    tap: EventTap,
}

/// Claims one key through an intercepting event tap and swallows it.
///
/// The system dictation media key is swallowed too while installed, so the
/// OS dictation feature cannot start from the same physical key.
pub struct EventTapInterceptor {
    installed: Mutex<Option<Installed>>,
    active: Arc<AtomicBool>,
    next_handle: AtomicU64,
}

impl EventTapInterceptor {
    pub fn new() -> Self {
        Self {
            installed: Mutex::new(None),
            active: Arc::new(AtomicBool::new(false)),
            next_handle: AtomicU64::new(1),
        }
    }
}

impl Default for EventTapInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decide what to do with one tap event for `target_key`
fn route_event(
    target_key: u16,
    event: TapEvent,
    handlers: &InterceptHandlers,
    active: &AtomicBool,
) -> TapVerdict {
    match event {
        TapEvent::Key(key_event) if key_event.key_code == target_key => {
            if !key_event.is_repeat {
                match key_event.kind {
                    KeyEventKind::KeyDown => (handlers.on_down)(),
                    KeyEventKind::KeyUp => {
                        if let Some(ref on_up) = handlers.on_up {
                            on_up();
                        }
                    }
                    KeyEventKind::FlagsChanged => return TapVerdict::Pass,
                }
            }
            TapVerdict::Swallow
        }
        TapEvent::SystemKey { key_code, .. } if key_code == NX_KEYTYPE_DICTATION => {
            crate::trace!("Swallowed system dictation key");
            TapVerdict::Swallow
        }
        TapEvent::Disabled { restored: true } => {
            crate::debug!("Override tap for key {} re-enabled in place", target_key);
            TapVerdict::Pass
        }
        TapEvent::Disabled { restored: false } => {
            if active.swap(false, Ordering::SeqCst) {
                crate::warn!("Override tap for key {} was disabled by the system", target_key);
                if let Some(ref on_stopped) = handlers.on_stopped {
                    on_stopped();
                }
            }
            TapVerdict::Pass
        }
        _ => TapVerdict::Pass,
    }
}

impl PlatformInputInterceptor for EventTapInterceptor {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn install(
        &self,
        target_key: u16,
        handlers: InterceptHandlers,
    ) -> Result<InterceptorHandle, InterceptError> {
        if !has_accessibility_permission(should_prompt_for_permission()) {
            return Err(InterceptError::PermissionDenied);
        }

        let mut installed = self.installed.lock();
        if let Some(mut previous) = installed.take() {
            self.active.store(false, Ordering::SeqCst);
            if let Err(e) = previous.tap.stop() {
                crate::warn!("Failed to stop previous override tap: {}", e);
            }
        }

        let active = self.active.clone();
        let mut tap = EventTap::new(TapMode::Intercept);
        self.active.store(true, Ordering::SeqCst);
        if let Err(e) = tap.start(Box::new(move |event| {
            route_event(target_key, event, &handlers, &active)
        })) {
            self.active.store(false, Ordering::SeqCst);
            return Err(InterceptError::Backend(e));
        }

        let handle = InterceptorHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        *installed = Some(Installed { handle, tap });
        crate::info!("Override tap installed for key {}", target_key);
        Ok(handle)
    }

    #[cfg_attr(coverage_nightly, coverage(off))]
    fn remove(&self, handle: InterceptorHandle) {
        let mut installed = self.installed.lock();
        let is_current = installed.as_ref().is_some_and(|i| i.handle == handle);
        if !is_current {
            crate::debug!("Ignoring removal of stale interceptor handle {:?}", handle);
            return;
        }
        self.active.store(false, Ordering::SeqCst);
        if let Some(mut current) = installed.take() {
            if let Err(e) = current.tap.stop() {
                crate::warn!("Failed to stop override tap: {}", e);
            }
        }
        crate::info!("Override tap removed");
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
            && self
                .installed
                .lock()
                .as_ref()
                .is_some_and(|i| i.tap.is_running())
    }
}

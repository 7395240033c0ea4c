//! CGEventTap lifecycle management.
//!
//! Runs a HID-level event tap on a dedicated CFRunLoop thread and hands every
//! converted event to a single handler. Intercepting taps may swallow events.

use super::callback::{
    convert_event, TapEvent, FLAGS_CHANGED, KEY_DOWN, KEY_UP, NX_SYSDEFINED,
    TAP_DISABLED_BY_TIMEOUT, TAP_DISABLED_BY_USER_INPUT,
};
use core_foundation::base::TCFType;
use core_foundation::mach_port::{CFMachPort, CFMachPortRef};
use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopStop};
use core_graphics::event::{CGEvent, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement};
use foreign_types::ForeignType;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// CGEventMask type for raw FFI
type CGEventMask = u64;

/// How long `start` waits for the tap thread to create the tap
const STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest the callback waits for the state lock when re-enabling
const REENABLE_LOCK_TIMEOUT: Duration = Duration::from_millis(5);

/// Raw callback signature. The event type is taken as u32 because the OS also
/// delivers the tap-disabled pseudo types through it.
type CGEventTapCallBackInternal = unsafe extern "C" fn(
    proxy: *mut c_void,
    event_type: u32,
    event: *mut c_void,
    user_info: *mut c_void,
) -> *mut c_void;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapCreate(
        tap: CGEventTapLocation,
        place: CGEventTapPlacement,
        options: CGEventTapOptions,
        events_of_interest: CGEventMask,
        callback: CGEventTapCallBackInternal,
        user_info: *mut c_void,
    ) -> CFMachPortRef;

    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);

    fn CGEventTapIsEnabled(tap: CFMachPortRef) -> bool;
}

/// Whether the tap only observes or may also swallow events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapMode {
    ListenOnly,
    Intercept,
}

/// Handler decision for a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapVerdict {
    Pass,
    /// Consume the event so no other application (or OS feature) sees it
    Swallow,
}

pub type TapHandler = Box<dyn Fn(TapEvent) -> TapVerdict + Send + 'static>;

/// Mach port of the live tap
#[derive(Clone, Copy)]
struct TapPort(CFMachPortRef);

// SAFETY: only dereferenced from the tap callback, and cleared before the port is released
unsafe impl Send for TapPort {}

/// State shared between the tap thread and its owner
struct TapState {
    handler: Option<TapHandler>,
    run_loop: Option<CFRunLoop>,
    port: Option<TapPort>,
}

/// Handle to one CGEventTap running on its own thread
pub struct EventTap {
    mode: TapMode,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<TapState>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl EventTap {
    pub fn new(mode: TapMode) -> Self {
        Self {
            mode,
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(TapState {
                handler: None,
                run_loop: None,
                port: None,
            })),
            thread_handle: None,
        }
    }

    /// Start the tap and wait until it exists.
    ///
    /// Permission must already have been checked by the caller; a tap the OS
    /// refuses to create is reported here rather than only logged.
    pub fn start(&mut self, handler: TapHandler) -> Result<(), String> {
        if self.running.load(Ordering::SeqCst) {
            return Err("CGEventTap is already running".to_string());
        }

        self.state.lock().handler = Some(handler);
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let state = self.state.clone();
        let mode = self.mode;

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let handle = thread::spawn(move || {
            if let Err(e) = run_event_tap_loop(mode, running.clone(), state, &ready_tx) {
                crate::error!("CGEventTap error: {}", e);
                running.store(false, Ordering::SeqCst);
                let _ = ready_tx.try_send(Err(e));
            }
        });
        self.thread_handle = Some(handle);

        let outcome = match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(outcome) => outcome,
            Err(_) => Err(format!("CGEventTap did not start within {:?}", STARTUP_TIMEOUT)),
        };
        if outcome.is_err() {
            if let Err(e) = self.stop() {
                crate::warn!("Failed to clean up event tap after failed start: {}", e);
            }
        }
        outcome
    }

    /// Stop the tap and join its thread
    pub fn stop(&mut self) -> Result<(), String> {
        if !self.running.load(Ordering::SeqCst) && self.thread_handle.is_none() {
            return Ok(());
        }

        self.running.store(false, Ordering::SeqCst);

        if let Some(ref run_loop) = self.state.lock().run_loop {
            unsafe {
                CFRunLoopStop(run_loop.as_concrete_TypeRef());
            }
        }

        if let Some(handle) = self.thread_handle.take() {
            // Bounded join; the run loop wakes at least once a second
            let timeout = Duration::from_secs(2);
            let start = std::time::Instant::now();
            while !handle.is_finished() && start.elapsed() < timeout {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                handle.join().map_err(|_| "Failed to join event tap thread")?;
            } else {
                crate::warn!("Event tap thread did not stop within {:?}", timeout);
            }
        }

        let mut state = self.state.lock();
        state.handler = None;
        state.run_loop = None;
        state.port = None;

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for EventTap {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Hand an event to the handler without ever blocking the tap callback.
///
/// Blocking here freezes keyboard input system-wide, so a contended lock
/// drops the event instead.
fn dispatch(state: &Mutex<TapState>, event: TapEvent) -> TapVerdict {
    let start = std::time::Instant::now();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        match state.try_lock() {
            Some(guard) => match guard.handler {
                Some(ref handler) => handler(event),
                None => TapVerdict::Pass,
            },
            None => {
                crate::trace!("Skipping tap event - state lock contended");
                TapVerdict::Pass
            }
        }
    }));

    let elapsed = start.elapsed();
    if elapsed.as_millis() > 10 {
        crate::warn!(
            "Event tap handler took {:?} - SLOW! This may cause keyboard freeze",
            elapsed
        );
    }

    result.unwrap_or_else(|e| {
        crate::error!("Event tap handler panicked: {:?}", e);
        TapVerdict::Pass
    })
}

/// Re-enable a tap the OS switched off, then tell the handler how it went
fn recover_disabled_tap(
    state: &Mutex<TapState>,
    reenable: impl FnOnce() -> bool,
) -> TapVerdict {
    let restored = reenable();
    if restored {
        crate::warn!("CGEventTap was disabled by the system; re-enabled");
    } else {
        crate::error!("CGEventTap was disabled by the system and could not be re-enabled");
    }
    dispatch(state, TapEvent::Disabled { restored })
}

/// Returns whether the tap is enabled again
unsafe fn reenable_tap(state: &Mutex<TapState>) -> bool {
    let port = state
        .try_lock_for(REENABLE_LOCK_TIMEOUT)
        .and_then(|guard| guard.port);
    match port {
        Some(TapPort(port)) => {
            CGEventTapEnable(port, true);
            CGEventTapIsEnabled(port)
        }
        None => false,
    }
}

/// Returns the event pointer to pass it on, null to swallow it
unsafe extern "C" fn event_tap_callback(
    _proxy: *mut c_void,
    event_type: u32,
    event_ref: *mut c_void,
    user_info: *mut c_void,
) -> *mut c_void {
    let state = &*(user_info as *const Mutex<TapState>);

    if event_type == TAP_DISABLED_BY_TIMEOUT || event_type == TAP_DISABLED_BY_USER_INPUT {
        recover_disabled_tap(state, || reenable_tap(state));
        return event_ref;
    }
    if event_ref.is_null() {
        return event_ref;
    }

    // Borrowed from the OS: never release it
    let event = ManuallyDrop::new(CGEvent::from_ptr(event_ref as *mut _));
    let verdict = match convert_event(event_type, &event) {
        Some(tap_event) => dispatch(state, tap_event),
        None => TapVerdict::Pass,
    };

    match verdict {
        TapVerdict::Pass => event_ref,
        TapVerdict::Swallow => std::ptr::null_mut(),
    }
}

fn run_event_tap_loop(
    mode: TapMode,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<TapState>>,
    ready: &SyncSender<Result<(), String>>,
) -> Result<(), String> {
    let event_mask: CGEventMask = (1 << KEY_DOWN as u64)
        | (1 << KEY_UP as u64)
        | (1 << FLAGS_CHANGED as u64)
        | (1 << NX_SYSDEFINED as u64);

    let options = match mode {
        TapMode::ListenOnly => CGEventTapOptions::ListenOnly,
        TapMode::Intercept => CGEventTapOptions::Default,
    };

    // The Arc stays alive for the whole loop, so the raw pointer outlives the tap
    let user_info = Arc::as_ptr(&state) as *mut c_void;

    let event_tap_ref = unsafe {
        CGEventTapCreate(
            CGEventTapLocation::HID,
            CGEventTapPlacement::HeadInsertEventTap,
            options,
            event_mask,
            event_tap_callback,
            user_info,
        )
    };

    if event_tap_ref.is_null() {
        return Err(
            "Failed to create CGEventTap. Ensure Accessibility permission is granted.".to_string(),
        );
    }

    let mach_port = unsafe { CFMachPort::wrap_under_create_rule(event_tap_ref) };

    let run_loop_source = mach_port
        .create_runloop_source(0)
        .map_err(|_| "Failed to create run loop source")?;

    let run_loop = CFRunLoop::get_current();
    {
        let mut shared = state.lock();
        shared.run_loop = Some(run_loop.clone());
        shared.port = Some(TapPort(mach_port.as_concrete_TypeRef()));
    }

    run_loop.add_source(&run_loop_source, unsafe { kCFRunLoopDefaultMode });

    unsafe {
        CGEventTapEnable(mach_port.as_concrete_TypeRef(), true);
    }

    crate::info!("CGEventTap started ({:?})", mode);
    let _ = ready.try_send(Ok(()));

    while running.load(Ordering::SeqCst) {
        // Short slices so stop() is observed promptly
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopDefaultMode },
            Duration::from_secs(1),
            false,
        );
    }

    state.lock().port = None;
    unsafe {
        CGEventTapEnable(mach_port.as_concrete_TypeRef(), false);
    }
    run_loop.remove_source(&run_loop_source, unsafe { kCFRunLoopDefaultMode });

    crate::info!("CGEventTap stopped ({:?})", mode);
    Ok(())
}

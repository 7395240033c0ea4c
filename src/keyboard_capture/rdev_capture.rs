// Rdev-based key capture for Windows/Linux
//
// rdev reports plain press/release events. This source maps them onto the
// logical key-code space and synthesizes CGEventFlags-style family and
// device-side bits so the rest of the crate matches bindings the same way on
// every platform. macOS uses CGEventTapCapture instead.

use super::keycodes::{
    ESCAPE_KEY_CODE, FN_KEY_CODE, LEFT_COMMAND_KEY_CODE, LEFT_CONTROL_KEY_CODE,
    LEFT_OPTION_KEY_CODE, LEFT_SHIFT_KEY_CODE, RIGHT_COMMAND_KEY_CODE, RIGHT_CONTROL_KEY_CODE,
    RIGHT_OPTION_KEY_CODE, RIGHT_SHIFT_KEY_CODE, SPACE_KEY_CODE,
};
use super::modifiers::{device_mask_for_code, family_for_code, opposite_side_code};
use super::{CaptureError, KeyEventCallback, RawKeyEvent};
use parking_lot::Mutex;
use rdev::{listen, Event, EventType, Key};
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Map an rdev key onto a logical key code
pub fn map_key(key: Key) -> Option<u16> {
    let code = match key {
        Key::Alt => LEFT_OPTION_KEY_CODE,
        Key::AltGr => RIGHT_OPTION_KEY_CODE,
        Key::ControlLeft => LEFT_CONTROL_KEY_CODE,
        Key::ControlRight => RIGHT_CONTROL_KEY_CODE,
        Key::ShiftLeft => LEFT_SHIFT_KEY_CODE,
        Key::ShiftRight => RIGHT_SHIFT_KEY_CODE,
        Key::MetaLeft => LEFT_COMMAND_KEY_CODE,
        Key::MetaRight => RIGHT_COMMAND_KEY_CODE,
        Key::Function => FN_KEY_CODE,
        Key::Escape => ESCAPE_KEY_CODE,
        Key::Space => SPACE_KEY_CODE,
        Key::Return => 36,
        Key::Tab => 48,
        Key::Backspace => 51,
        Key::Delete => 117,
        Key::Home => 115,
        Key::End => 119,
        Key::PageUp => 116,
        Key::PageDown => 121,
        Key::LeftArrow => 123,
        Key::RightArrow => 124,
        Key::DownArrow => 125,
        Key::UpArrow => 126,
        Key::F1 => 122,
        Key::F2 => 120,
        Key::F3 => 99,
        Key::F4 => 118,
        Key::F5 => 96,
        Key::F6 => 97,
        Key::F7 => 98,
        Key::F8 => 100,
        Key::F9 => 101,
        Key::F10 => 109,
        Key::F11 => 103,
        Key::F12 => 111,
        Key::KeyA => 0,
        Key::KeyS => 1,
        Key::KeyD => 2,
        Key::KeyF => 3,
        Key::KeyH => 4,
        Key::KeyG => 5,
        Key::KeyZ => 6,
        Key::KeyX => 7,
        Key::KeyC => 8,
        Key::KeyV => 9,
        Key::KeyB => 11,
        Key::KeyQ => 12,
        Key::KeyW => 13,
        Key::KeyE => 14,
        Key::KeyR => 15,
        Key::KeyY => 16,
        Key::KeyT => 17,
        Key::KeyO => 31,
        Key::KeyU => 32,
        Key::KeyI => 34,
        Key::KeyP => 35,
        Key::KeyL => 37,
        Key::KeyJ => 38,
        Key::KeyK => 40,
        Key::KeyN => 45,
        Key::KeyM => 46,
        Key::Num1 => 18,
        Key::Num2 => 19,
        Key::Num3 => 20,
        Key::Num4 => 21,
        Key::Num5 => 23,
        Key::Num6 => 22,
        Key::Num7 => 26,
        Key::Num8 => 28,
        Key::Num9 => 25,
        Key::Num0 => 29,
        _ => return None,
    };
    Some(code)
}

/// Per-listener state used to synthesize flags and detect auto-repeat
#[derive(Debug, Default)]
pub struct ListenerState {
    flags: u64,
    held: HashSet<u16>,
}

impl ListenerState {
    /// Translate one rdev event. Returns None for unmapped keys and non-key events.
    pub fn translate(&mut self, event_type: &EventType) -> Option<RawKeyEvent> {
        let (key, pressed) = match event_type {
            EventType::KeyPress(k) => (*k, true),
            EventType::KeyRelease(k) => (*k, false),
            _ => return None,
        };
        let code = map_key(key)?;

        let is_repeat = if pressed {
            !self.held.insert(code)
        } else {
            self.held.remove(&code);
            false
        };

        if family_for_code(code).is_some() {
            if is_repeat {
                return None;
            }
            self.apply_modifier(code, pressed);
            return Some(RawKeyEvent::flags_changed(code, self.flags));
        }

        let event = if pressed {
            RawKeyEvent::key_down(code, self.flags)
        } else {
            RawKeyEvent::key_up(code, self.flags)
        };
        Some(if is_repeat { event.repeated() } else { event })
    }

    fn apply_modifier(&mut self, code: u16, pressed: bool) {
        let Some(family) = family_for_code(code) else {
            return;
        };
        let device_mask = device_mask_for_code(code).unwrap_or(0);

        if pressed {
            self.flags |= family.flag_mask() | device_mask;
            return;
        }

        self.flags &= !device_mask;
        let other_side_down = opposite_side_code(code)
            .and_then(device_mask_for_code)
            .is_some_and(|mask| self.flags & mask != 0);
        if !other_side_down {
            self.flags &= !family.flag_mask();
        }
    }
}

/// Global key capture via rdev
///
/// rdev::listen cannot be cancelled, so the listener thread lives for the
/// rest of the process; stopping detaches the callback.
pub struct RdevCapture {
    callback: Arc<Mutex<Option<KeyEventCallback>>>,
    running: Arc<AtomicBool>,
    listener_handle: Option<JoinHandle<()>>,
}

impl RdevCapture {
    pub fn new() -> Self {
        Self {
            callback: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            listener_handle: None,
        }
    }

    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn start(&mut self, callback: KeyEventCallback) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        *self.callback.lock() = Some(callback);
        self.running.store(true, Ordering::SeqCst);

        if self.listener_handle.is_none() {
            let callback = self.callback.clone();
            let running = self.running.clone();
            let handle = thread::spawn(move || {
                let state = RefCell::new(ListenerState::default());
                let on_event = move |event: Event| {
                    let Some(key_event) = state.borrow_mut().translate(&event.event_type) else {
                        return;
                    };
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }
                    if let Some(ref cb) = *callback.lock() {
                        cb(key_event);
                    }
                };

                // rdev::listen blocks until an error occurs
                if let Err(e) = listen(on_event) {
                    crate::error!("rdev listener error: {:?}", e);
                }
            });
            self.listener_handle = Some(handle);
        }

        crate::info!("rdev key capture started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        *self.callback.lock() = None;
        crate::info!("rdev key capture stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for RdevCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "rdev_capture_test.rs"]
mod tests;

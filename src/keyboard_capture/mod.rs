// Keyboard capture: raw key events from the platform, normalized into
// logical key codes with CGEventFlags-style modifier bits.
//
// macOS uses a listen-only CGEventTap (requires Accessibility permission).
// Windows/Linux use rdev, which synthesizes the same flag layout.

#[cfg(target_os = "macos")]
pub mod cgeventtap;
pub mod keycodes;
pub mod modifiers;
#[cfg(target_os = "macos")]
pub mod permissions;
#[cfg(not(target_os = "macos"))]
pub mod rdev_capture;
pub mod tracker;

use serde::{Deserialize, Serialize};

/// What kind of transition a raw key event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
    /// A modifier key changed; pressed state must be derived from `flags`
    FlagsChanged,
}

/// A key event as delivered by the platform input thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawKeyEvent {
    pub kind: KeyEventKind,
    /// Logical key code (already normalized by the capture source)
    pub key_code: u16,
    /// Modifier flags at the instant of the event, CGEventFlags layout
    pub flags: u64,
    /// Auto-repeat KeyDown generated by the OS while the key is held
    pub is_repeat: bool,
}

impl RawKeyEvent {
    pub fn key_down(key_code: u16, flags: u64) -> Self {
        Self {
            kind: KeyEventKind::KeyDown,
            key_code: keycodes::normalize(key_code),
            flags,
            is_repeat: false,
        }
    }

    pub fn key_up(key_code: u16, flags: u64) -> Self {
        Self {
            kind: KeyEventKind::KeyUp,
            key_code: keycodes::normalize(key_code),
            flags,
            is_repeat: false,
        }
    }

    pub fn flags_changed(key_code: u16, flags: u64) -> Self {
        Self {
            kind: KeyEventKind::FlagsChanged,
            key_code: keycodes::normalize(key_code),
            flags,
            is_repeat: false,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.is_repeat = true;
        self
    }
}

/// Errors raised by a key event source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("Key capture is already running")]
    AlreadyRunning,
    #[error("Accessibility permission required. Please grant permission in System Settings > Privacy & Security > Accessibility, then restart the app.")]
    PermissionDenied,
    #[error("Key capture failed: {0}")]
    Backend(String),
}

/// Callback invoked on the platform input thread for each raw key event
pub type KeyEventCallback = Box<dyn Fn(RawKeyEvent) + Send + 'static>;

/// A global source of raw key events
pub trait KeyEventSource: Send {
    /// Start delivering events to `callback`
    fn start(&mut self, callback: KeyEventCallback) -> Result<(), CaptureError>;

    /// Stop delivering events. A no-op when not running.
    fn stop(&mut self) -> Result<(), CaptureError>;

    fn is_running(&self) -> bool;
}

/// Platform key capture
///
/// Wraps the CGEventTap capture on macOS and the rdev listener elsewhere.
pub struct KeyboardCapture {
    #[cfg(target_os = "macos")]
    capture: cgeventtap::CGEventTapCapture,
    #[cfg(not(target_os = "macos"))]
    capture: rdev_capture::RdevCapture,
}

impl KeyboardCapture {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "macos")]
            capture: cgeventtap::CGEventTapCapture::new(),
            #[cfg(not(target_os = "macos"))]
            capture: rdev_capture::RdevCapture::new(),
        }
    }
}

impl KeyEventSource for KeyboardCapture {
    fn start(&mut self, callback: KeyEventCallback) -> Result<(), CaptureError> {
        self.capture.start(callback)
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.capture.stop()
    }

    fn is_running(&self) -> bool {
        self.capture.is_running()
    }
}

impl Default for KeyboardCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeyboardCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

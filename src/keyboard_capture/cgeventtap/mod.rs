//! CGEventTap plumbing for macOS
//!
//! One tap runner serves both the listen-only key capture and the
//! intercepting tap used by override arming.
//!
//! CGEventTap requires Accessibility permission (System Settings > Privacy & Security > Accessibility)
//!
//! ## Module Organization
//!
//! - `tap`: tap creation, run loop thread and lifecycle
//! - `callback`: CGEvent to [`TapEvent`] conversion
//! - `capture`: listen-only [`CGEventTapCapture`] key source

mod callback;
mod capture;
mod tap;

pub use callback::TapEvent;
pub use capture::CGEventTapCapture;
pub use tap::{EventTap, TapHandler, TapMode, TapVerdict};

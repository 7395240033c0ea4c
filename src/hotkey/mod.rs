// Hotkey bindings, matching and routing into the input gate

pub mod binding;
pub mod double_tap;
pub mod manager;
pub mod monitor;
pub mod readiness;
pub mod router;

pub use binding::{BindingError, ShortcutBinding};
pub use manager::HotkeyManager;
pub use monitor::{BindingMonitor, Trigger};
pub use readiness::{ReadinessConfig, ReadinessWatchdog};
pub use router::{HotkeyRole, HotkeyRouter};

use crate::keyboard_capture::CaptureError;
use crate::override_arming::ArmingError;
use crate::settings::SettingsError;

/// Errors that can occur while setting up or reconfiguring hotkeys
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("key capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Arming(#[from] ArmingError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("invalid {role} shortcut: {source}")]
    InvalidBinding {
        role: HotkeyRole,
        #[source]
        source: BindingError,
    },
}

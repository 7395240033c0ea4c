// Input gating for push-to-talk dictation: hotkey capture, binding matching,
// reserved-key override and the recording state machine.

// Enable coverage attribute on nightly for explicit exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod gate;
pub mod hotkey;
pub mod keyboard_capture;
pub mod override_arming;
pub mod settings;

// Re-export log macros for use throughout the crate
pub use log::{debug, error, info, trace, warn};

pub use gate::{
    GateCommand, GateConfig, GateHandle, GateSender, InputGate, PipelineStatus,
    RecordingPipeline,
};
pub use hotkey::{HotkeyError, HotkeyManager, HotkeyRole, ShortcutBinding};
pub use override_arming::{BindingSource, ChangeOrigin, OverrideArming};
pub use settings::{FileBindingSource, GateSettings};

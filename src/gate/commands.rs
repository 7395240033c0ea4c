//! Commands the gate sends to the recording pipeline, and the state it may query.

use serde::Serialize;

/// One-way recording-intent commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum GateCommand {
    /// Show the minimal recording affordance without starting capture
    ShowLightweightUi,
    /// Begin capture; `locked` for hands-free sessions
    StartRecording { locked: bool },
    /// End capture and proceed to finalize/insert
    StopRecording,
    /// Hard abort, issued only by the failsafe
    CancelImmediate,
    /// Dismiss the UI of a press that never started capture (mis-touch)
    QuickHideMisTouch,
}

/// Pipeline state the gate is allowed to query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub is_recording: bool,
    pub is_hands_free_locked: bool,
    /// Finalize/transcribe/insert work is in flight
    pub is_processing: bool,
    /// The audio stream has not been torn down yet
    pub is_stream_open: bool,
}

/// The external recording pipeline as seen by the gate
///
/// `dispatch` is called while the gate's session lock is held, so
/// implementations must not call back into the gate synchronously.
pub trait RecordingPipeline: Send + Sync {
    fn dispatch(&self, command: GateCommand);

    fn status(&self) -> PipelineStatus;
}

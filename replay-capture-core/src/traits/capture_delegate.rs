use crate::models::error::CaptureError;
use crate::models::flush_result::FlushResult;
use crate::models::state::ControllerState;
use crate::models::status::{RecorderStatus, StreamFault};

/// Event delegate for recorder notifications.
///
/// Methods are called from capture, worker, and control threads.
/// Implementations must not block.
pub trait RecorderDelegate: Send + Sync {
    /// Called when the controller state changes.
    fn on_state_changed(&self, state: ControllerState);

    /// Called when a capture loop gives up on its source.
    fn on_stream_fault(&self, fault: &StreamFault);

    /// Called after a flush wrote its output file.
    fn on_flush_finished(&self, result: &FlushResult);

    /// Called when a flush fails or is rejected.
    fn on_flush_failed(&self, error: &CaptureError);

    /// Called when a `status` action is handled.
    fn on_status(&self, _status: &RecorderStatus) {}
}

/// Delegate that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDelegate;

impl RecorderDelegate for NullDelegate {
    fn on_state_changed(&self, _state: ControllerState) {}
    fn on_stream_fault(&self, _fault: &StreamFault) {}
    fn on_flush_finished(&self, _result: &FlushResult) {}
    fn on_flush_failed(&self, _error: &CaptureError) {}
}

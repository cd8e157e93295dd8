//! Microphone via the default WASAPI capture endpoint in shared mode.

use std::time::Duration;

use replay_capture_core::{AudioChunk, AudioDevice, CaptureError, CaptureSource, SourceInfo};

use crate::wasapi_stream::{IdlePolicy, WasapiStream};

/// A capture endpoint delivers continuously; this long without data means
/// the device is gone.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

pub struct WasapiMicSource {
    stream: WasapiStream,
}

// SAFETY: the COM interfaces inside `WasapiStream` are created on the
// capture thread after the source has been moved there, and never leave it.
unsafe impl Send for WasapiMicSource {}

impl WasapiMicSource {
    pub fn new(device: &AudioDevice, chunk_frames: usize) -> Self {
        let idle = IdlePolicy::Fail { timeout: STALL_TIMEOUT };
        Self {
            stream: WasapiStream::new(device, chunk_frames, 0, idle),
        }
    }
}

impl CaptureSource<AudioChunk> for WasapiMicSource {
    fn next_item(&mut self) -> Result<AudioChunk, CaptureError> {
        self.stream.read_chunk()
    }

    fn device_info(&self) -> SourceInfo {
        self.stream.info()
    }

    fn close(&mut self) {
        self.stream.close();
    }
}

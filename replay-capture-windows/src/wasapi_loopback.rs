//! System audio via WASAPI loopback on the default render endpoint.
//!
//! Loopback delivers no packets while nothing is playing. The gap is
//! filled with silence once a chunk's worth of time has passed, so the
//! system track stays aligned with video. DRM-protected audio arrives
//! silenced.

use std::time::Duration;

use windows::Win32::Media::Audio::AUDCLNT_STREAMFLAGS_LOOPBACK;

use replay_capture_core::{AudioChunk, AudioDevice, CaptureError, CaptureSource, SourceInfo};

use crate::wasapi_stream::{IdlePolicy, WasapiStream};

pub struct WasapiLoopbackSource {
    stream: WasapiStream,
}

// SAFETY: the COM interfaces inside `WasapiStream` are created on the
// capture thread after the source has been moved there, and never leave it.
unsafe impl Send for WasapiLoopbackSource {}

impl WasapiLoopbackSource {
    pub fn new(device: &AudioDevice, chunk_frames: usize) -> Self {
        let chunk_secs = chunk_frames as f64 / device.format.sample_rate.max(1) as f64;
        let idle = IdlePolicy::FillSilence {
            timeout: Duration::from_secs_f64(chunk_secs),
        };
        Self {
            stream: WasapiStream::new(device, chunk_frames, AUDCLNT_STREAMFLAGS_LOOPBACK, idle),
        }
    }
}

impl CaptureSource<AudioChunk> for WasapiLoopbackSource {
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

use std::path::Path;

use crate::models::error::CaptureError;
use crate::models::media::VideoFrame;

/// Encodes frames into a video container file.
pub trait VideoEncoder: Send + Sync {
    /// Write `frames` in order at `fps`. Every frame must be `width`×`height`.
    fn encode(&self, frames: &[VideoFrame], fps: f64, size: (u32, u32), output: &Path) -> Result<(), CaptureError>;
}

/// Compresses a PCM WAV file.
pub trait AudioEncoder: Send + Sync {
    fn encode(&self, input_wav: &Path, output: &Path) -> Result<(), CaptureError>;
}

/// Combines a video track and an optional audio track without re-encoding.
pub trait Muxer: Send + Sync {
    fn mux(&self, video: &Path, audio: Option<&Path>, output: &Path) -> Result<(), CaptureError>;
}

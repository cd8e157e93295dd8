use crate::models::error::CaptureError;
use crate::models::media::{AudioChunk, VideoFrame};
use crate::models::stream::{AudioDevice, DisplayInfo, StreamKind};

use super::capture_source::CaptureSource;

pub type VideoSource = Box<dyn CaptureSource<VideoFrame>>;
pub type AudioSource = Box<dyn CaptureSource<AudioChunk>>;

/// Platform collaborator that resolves devices and opens capture sources.
///
/// Resolution happens once at startup, before any capture thread exists;
/// its failures become `ConfigurationFailed` there.
pub trait CaptureBackend {
    /// Short name for logs ("synthetic", "wasapi").
    fn name(&self) -> &str;

    /// Primary display geometry.
    fn resolve_display(&self) -> Result<DisplayInfo, CaptureError>;

    /// Open a screen source producing frames of `display`'s size at about `target_fps`.
    fn open_screen(&self, display: &DisplayInfo, target_fps: u32) -> Result<VideoSource, CaptureError>;

    /// Resolve the default device for an audio stream.
    ///
    /// `StreamKind::System` is the default playback device's loopback,
    /// `StreamKind::Mic` the default input device. Fails with
    /// `DeviceNotAvailable` when the audio subsystem or the device is absent.
    fn resolve_audio(&self, kind: StreamKind) -> Result<AudioDevice, CaptureError>;

    /// Open a resolved device delivering chunks of exactly `chunk_frames` frames.
    fn open_audio(&self, device: &AudioDevice, chunk_frames: usize) -> Result<AudioSource, CaptureError>;
}

use std::path::PathBuf;

use log::info;
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use replay_capture_core::media::ffmpeg::FfmpegTool;
use replay_capture_core::{
    AudioDevice, AudioSource, CaptureBackend, CaptureError, DisplayInfo, StreamKind, VideoSource,
};

use crate::device_enumerator::{ComGuard, DeviceEnumerator};
use crate::permissions::check_microphone_access;
use crate::screen_capture::GdigrabScreenSource;
use crate::wasapi_loopback::WasapiLoopbackSource;
use crate::wasapi_mic::WasapiMicSource;

/// Primary monitor through gdigrab, audio through WASAPI.
pub struct WindowsBackend {
    ffmpeg: FfmpegTool,
}

impl WindowsBackend {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: FfmpegTool::new(ffmpeg_path),
        }
    }
}

impl CaptureBackend for WindowsBackend {
    fn name(&self) -> &str {
        "wasapi"
    }

    fn resolve_display(&self) -> Result<DisplayInfo, CaptureError> {
        let (width, height) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if width <= 0 || height <= 0 {
            return Err(CaptureError::DeviceNotAvailable("no primary display".into()));
        }
        Ok(DisplayInfo {
            width: width as u32,
            height: height as u32,
        })
    }

    fn open_screen(&self, display: &DisplayInfo, target_fps: u32) -> Result<VideoSource, CaptureError> {
        Ok(Box::new(GdigrabScreenSource::new(self.ffmpeg.clone(), *display, target_fps)))
    }

    fn resolve_audio(&self, kind: StreamKind) -> Result<AudioDevice, CaptureError> {
        if kind == StreamKind::Mic {
            check_microphone_access()?;
        }
        let _com = ComGuard::init_mta()?;
        let device = DeviceEnumerator::new()?.default_device(kind)?;
        info!("resolved {} device: {}", kind, device.info.name);
        Ok(device)
    }

    fn open_audio(&self, device: &AudioDevice, chunk_frames: usize) -> Result<AudioSource, CaptureError> {
        match device.info.kind {
            StreamKind::System => Ok(Box::new(WasapiLoopbackSource::new(device, chunk_frames))),
            StreamKind::Mic => Ok(Box::new(WasapiMicSource::new(device, chunk_frames))),
            StreamKind::Video => Err(CaptureError::ConfigurationFailed(
                "video is not an audio device".into(),
            )),
        }
    }
}

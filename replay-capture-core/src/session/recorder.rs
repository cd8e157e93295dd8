use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use crate::models::config::RecorderConfig;
use crate::models::error::CaptureError;
use crate::models::media::{AudioChunk, VideoFrame};
use crate::models::stream::{DisplayInfo, SourceInfo, StreamConfig, StreamKind};
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::capture_backend::{AudioSource, CaptureBackend, VideoSource};

/// Buffer and parameters of one stream.
pub struct StreamSlot<T> {
    pub config: StreamConfig,
    pub device: SourceInfo,
    pub buffer: Arc<RingBuffer<T>>,
}

impl<T: Clone> StreamSlot<T> {
    fn new(config: StreamConfig, device: SourceInfo) -> Self {
        let buffer = Arc::new(RingBuffer::new(config.ring_capacity));
        Self { config, device, buffer }
    }
}

/// Opened sources, handed to the capture loops exactly once.
pub struct RecorderSources {
    pub video: VideoSource,
    pub mic: Option<AudioSource>,
    pub system: Option<AudioSource>,
}

/// Everything one recording session owns: configuration, resolved
/// devices, per-stream parameters and ring buffers.
///
/// Built once at startup from a `CaptureBackend`. Every failure here is a
/// `ConfigurationFailed`, so a missing device stops the process before any
/// capture thread exists.
pub struct Recorder {
    config: RecorderConfig,
    backend_name: String,
    display: DisplayInfo,
    video: StreamSlot<VideoFrame>,
    mic: Option<StreamSlot<AudioChunk>>,
    system: Option<StreamSlot<AudioChunk>>,
    sources: Mutex<Option<RecorderSources>>,
}

impl Recorder {
    pub fn build(config: RecorderConfig, backend: &dyn CaptureBackend) -> Result<Self, CaptureError> {
        config.validate()?;

        let display = backend.resolve_display().map_err(startup_error("display"))?;
        if display.width == 0 || display.height == 0 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "display reports {}x{}",
                display.width, display.height
            )));
        }
        let video_config = StreamConfig::video(config.target_fps, config.buffer_duration_secs)?;
        let video_source = backend
            .open_screen(&display, config.target_fps)
            .map_err(startup_error("screen"))?;
        let video = StreamSlot::new(video_config, video_source.device_info());
        info!(
            "video: {}x{} at {} fps, {} frames buffered",
            display.width, display.height, config.target_fps, video.config.ring_capacity
        );

        let mut mic = None;
        let mut mic_source = None;
        if config.enable_mic {
            let (slot, source) = open_audio(backend, StreamKind::Mic, &config)?;
            mic = Some(slot);
            mic_source = Some(source);
        }

        let mut system = None;
        let mut system_source = None;
        if config.enable_system_audio {
            let (slot, source) = open_audio(backend, StreamKind::System, &config)?;
            system = Some(slot);
            system_source = Some(source);
        }

        Ok(Self {
            backend_name: backend.name().to_string(),
            config,
            display,
            video,
            mic,
            system,
            sources: Mutex::new(Some(RecorderSources {
                video: video_source,
                mic: mic_source,
                system: system_source,
            })),
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn display(&self) -> DisplayInfo {
        self.display
    }

    pub fn video(&self) -> &StreamSlot<VideoFrame> {
        &self.video
    }

    /// The mic or system slot; `None` if that stream is disabled.
    pub fn audio(&self, kind: StreamKind) -> Option<&StreamSlot<AudioChunk>> {
        match kind {
            StreamKind::Mic => self.mic.as_ref(),
            StreamKind::System => self.system.as_ref(),
            StreamKind::Video => None,
        }
    }

    pub fn stream_config(&self, kind: StreamKind) -> Option<&StreamConfig> {
        match kind {
            StreamKind::Video => Some(&self.video.config),
            _ => self.audio(kind).map(|slot| &slot.config),
        }
    }

    /// Take the opened sources. Returns `None` after the first call.
    pub fn take_sources(&self) -> Option<RecorderSources> {
        self.sources.lock().take()
    }
}

fn open_audio(
    backend: &dyn CaptureBackend,
    kind: StreamKind,
    config: &RecorderConfig,
) -> Result<(StreamSlot<AudioChunk>, AudioSource), CaptureError> {
    let device = backend.resolve_audio(kind).map_err(startup_error(kind.short_name()))?;
    let stream = StreamConfig::audio(kind, device.format, config.chunk_frames, config.buffer_duration_secs)?;
    let source = backend
        .open_audio(&device, config.chunk_frames)
        .map_err(startup_error(kind.short_name()))?;
    info!(
        "{}: {} ({} Hz, {} ch), {} chunks buffered",
        kind, device.info.name, device.format.sample_rate, device.format.channels, stream.ring_capacity
    );
    Ok((StreamSlot::new(stream, device.info), source))
}

fn startup_error(what: &'static str) -> impl Fn(CaptureError) -> CaptureError {
    move |err| match err {
        CaptureError::ConfigurationFailed(_) => err,
        other => CaptureError::ConfigurationFailed(format!("{}: {}", what, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stream::{AudioDevice, AudioFormat};
    use crate::traits::capture_source::CaptureSource;

    struct Silent<T>(T, StreamKind);

    impl<T: Clone + Send> CaptureSource<T> for Silent<T> {
        fn next_item(&mut self) -> Result<T, CaptureError> {
            Ok(self.0.clone())
        }

        fn device_info(&self) -> SourceInfo {
            SourceInfo {
                id: "silent".into(),
                name: "Silent".into(),
                kind: self.1,
                is_default: true,
            }
        }
    }

    struct Backend {
        missing_mic: bool,
    }

    impl CaptureBackend for Backend {
        fn name(&self) -> &str {
            "test"
        }

        fn resolve_display(&self) -> Result<DisplayInfo, CaptureError> {
            Ok(DisplayInfo { width: 4, height: 2 })
        }

        fn open_screen(&self, display: &DisplayInfo, _fps: u32) -> Result<VideoSource, CaptureError> {
            let frame = VideoFrame::new(display.width, display.height, vec![0; display.frame_bytes()]);
            Ok(Box::new(Silent(frame, StreamKind::Video)))
        }

        fn resolve_audio(&self, kind: StreamKind) -> Result<AudioDevice, CaptureError> {
            if kind == StreamKind::Mic && self.missing_mic {
                return Err(CaptureError::DeviceNotAvailable("no input device".into()));
            }
            Ok(AudioDevice {
                info: SourceInfo {
                    id: kind.short_name().into(),
                    name: kind.to_string(),
                    kind,
                    is_default: true,
                },
                format: AudioFormat {
                    sample_rate: 48000,
                    channels: 2,
                },
            })
        }

        fn open_audio(&self, device: &AudioDevice, chunk_frames: usize) -> Result<AudioSource, CaptureError> {
            let chunk = AudioChunk::new(device.format.channels, vec![0; chunk_frames * 2]);
            Ok(Box::new(Silent(chunk, device.info.kind)))
        }
    }

    #[test]
    fn build_derives_stream_configs() {
        let config = RecorderConfig {
            buffer_duration_secs: 10.0,
            ..Default::default()
        };
        let recorder = Recorder::build(config, &Backend { missing_mic: false }).unwrap();

        assert_eq!(recorder.video().config.ring_capacity, 300);
        assert_eq!(recorder.audio(StreamKind::Mic).unwrap().config.ring_capacity, 468);
        assert_eq!(recorder.display(), DisplayInfo { width: 4, height: 2 });
        assert!(recorder.take_sources().is_some());
        assert!(recorder.take_sources().is_none());
    }

    #[test]
    fn disabled_streams_are_absent() {
        let config = RecorderConfig {
            enable_mic: false,
            ..Default::default()
        };
        let recorder = Recorder::build(config, &Backend { missing_mic: true }).unwrap();

        assert!(recorder.audio(StreamKind::Mic).is_none());
        assert!(recorder.audio(StreamKind::System).is_some());
        assert!(recorder.take_sources().unwrap().mic.is_none());
    }

    #[test]
    fn missing_device_is_a_config_error() {
        let result = Recorder::build(RecorderConfig::default(), &Backend { missing_mic: true });
        match result {
            Err(CaptureError::ConfigurationFailed(msg)) => assert!(msg.contains("no input device")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected a configuration error"),
        }
    }
}

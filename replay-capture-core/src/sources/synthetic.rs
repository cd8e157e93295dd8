use std::f64::consts::TAU;
use std::time::Duration;

use log::debug;

use crate::models::error::CaptureError;
use crate::models::media::{AudioChunk, VideoFrame};
use crate::models::stream::{AudioDevice, AudioFormat, DisplayInfo, SourceInfo, StreamKind};
use crate::processing::frame_pacer::FramePacer;
use crate::traits::capture_backend::{AudioSource, CaptureBackend, VideoSource};
use crate::traits::capture_source::CaptureSource;

/// Device-free backend: a moving test pattern and two sine tones.
///
/// Runs on any platform and paces itself like real hardware, so the whole
/// capture and flush path can be exercised without a desktop or sound card.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    pub display: DisplayInfo,
    pub format: AudioFormat,
    pub mic_tone_hz: f64,
    pub system_tone_hz: f64,
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self {
            display: DisplayInfo { width: 320, height: 240 },
            format: AudioFormat {
                sample_rate: 44100,
                channels: 2,
            },
            mic_tone_hz: 440.0,
            system_tone_hz: 660.0,
        }
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn resolve_display(&self) -> Result<DisplayInfo, CaptureError> {
        Ok(self.display)
    }

    fn open_screen(&self, display: &DisplayInfo, target_fps: u32) -> Result<VideoSource, CaptureError> {
        Ok(Box::new(SyntheticScreenSource::new(*display, target_fps)))
    }

    fn resolve_audio(&self, kind: StreamKind) -> Result<AudioDevice, CaptureError> {
        if !kind.is_audio() {
            return Err(CaptureError::DeviceNotAvailable(format!("{} is not an audio stream", kind)));
        }
        Ok(AudioDevice {
            info: synthetic_info(kind),
            format: self.format,
        })
    }

    fn open_audio(&self, device: &AudioDevice, chunk_frames: usize) -> Result<AudioSource, CaptureError> {
        let tone = match device.info.kind {
            StreamKind::Mic => self.mic_tone_hz,
            _ => self.system_tone_hz,
        };
        Ok(Box::new(SyntheticToneSource::new(
            device.info.kind,
            device.format,
            chunk_frames,
            tone,
        )))
    }
}

fn synthetic_info(kind: StreamKind) -> SourceInfo {
    SourceInfo {
        id: format!("synthetic-{}", kind.short_name()),
        name: format!("Synthetic {}", kind),
        kind,
        is_default: true,
    }
}

/// Gradient frames with a bar sweeping left to right, one step per frame.
pub struct SyntheticScreenSource {
    display: DisplayInfo,
    pacer: FramePacer,
    frame_index: u64,
}

impl SyntheticScreenSource {
    pub fn new(display: DisplayInfo, target_fps: u32) -> Self {
        Self {
            display,
            pacer: FramePacer::new(target_fps),
            frame_index: 0,
        }
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.display.width as usize, self.display.height as usize);
        let bar = (self.frame_index as usize * 4) % w.max(1);
        let mut data = vec![0u8; self.display.frame_bytes()];
        for y in 0..h {
            for x in 0..w {
                let px = (y * w + x) * 3;
                if x.abs_diff(bar) < 4 {
                    data[px..px + 3].copy_from_slice(&[255, 255, 255]);
                } else {
                    data[px] = (x * 255 / w.max(1)) as u8;
                    data[px + 1] = (y * 255 / h.max(1)) as u8;
                    data[px + 2] = (self.frame_index % 256) as u8;
                }
            }
        }
        data
    }
}

impl CaptureSource<VideoFrame> for SyntheticScreenSource {
    fn next_item(&mut self) -> Result<VideoFrame, CaptureError> {
        self.pacer.begin();
        let frame = VideoFrame::new(self.display.width, self.display.height, self.render());
        self.frame_index += 1;
        self.pacer.wait();
        Ok(frame)
    }

    fn device_info(&self) -> SourceInfo {
        synthetic_info(StreamKind::Video)
    }

    fn close(&mut self) {
        debug!("synthetic screen closed after {} frames", self.frame_index);
    }
}

/// Sine tone delivered in fixed-size chunks at real-time pace.
pub struct SyntheticToneSource {
    kind: StreamKind,
    format: AudioFormat,
    chunk_frames: usize,
    frequency: f64,
    amplitude: f64,
    position: u64,
    pacer: FramePacer,
}

impl SyntheticToneSource {
    pub fn new(kind: StreamKind, format: AudioFormat, chunk_frames: usize, frequency: f64) -> Self {
        let chunk_secs = chunk_frames as f64 / format.sample_rate.max(1) as f64;
        Self {
            kind,
            format,
            chunk_frames,
            frequency,
            amplitude: 0.25,
            position: 0,
            pacer: FramePacer::with_interval(Duration::from_secs_f64(chunk_secs)),
        }
    }

    /// Interleaved samples for the next chunk; advances the phase.
    pub fn render_chunk(&mut self) -> AudioChunk {
        let channels = self.format.channels as usize;
        let rate = self.format.sample_rate as f64;
        let mut samples = Vec::with_capacity(self.chunk_frames * channels);
        for i in 0..self.chunk_frames as u64 {
            let t = (self.position + i) as f64 / rate;
            let value = (TAU * self.frequency * t).sin() * self.amplitude;
            let sample = (value * i16::MAX as f64).round() as i16;
            samples.extend(std::iter::repeat(sample).take(channels));
        }
        self.position += self.chunk_frames as u64;
        AudioChunk::new(self.format.channels, samples)
    }
}

impl CaptureSource<AudioChunk> for SyntheticToneSource {
    fn next_item(&mut self) -> Result<AudioChunk, CaptureError> {
        self.pacer.begin();
        let chunk = self.render_chunk();
        self.pacer.wait();
        Ok(chunk)
    }

    fn device_info(&self) -> SourceInfo {
        synthetic_info(self.kind)
    }
}

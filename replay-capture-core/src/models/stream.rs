use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Which of the three captured streams a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Mic,
    System,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Video, StreamKind::Mic, StreamKind::System];

    pub fn is_audio(self) -> bool {
        !matches!(self, Self::Video)
    }

    /// Identifier used in thread names and file names.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Mic => "mic",
            Self::System => "system",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Video => "video",
            Self::Mic => "microphone",
            Self::System => "system audio",
        })
    }
}

/// In-memory sample layout of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 16-bit little-endian PCM, interleaved.
    I16,
    /// Packed 8-bit blue/green/red pixels, row-major.
    Bgr24,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::I16 => 2,
            Self::Bgr24 => 3,
        }
    }

    pub fn bit_depth(self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }
}

/// Format negotiated with an audio device when its stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Primary display geometry used to size video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub width: u32,
    pub height: u32,
}

impl DisplayInfo {
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * SampleFormat::Bgr24.bytes_per_sample()
    }
}

/// Identity of the device or display behind a capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub kind: StreamKind,
    pub is_default: bool,
}

/// A resolved audio endpoint: who it is and what it delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub info: SourceInfo,
    pub format: AudioFormat,
}

/// Most items a single ring buffer may hold.
pub const MAX_RING_CAPACITY: usize = 1 << 24;

/// Per-stream parameters, derived once at startup.
///
/// Only the video `ring_capacity` changes afterwards, through the
/// frame-rate calibrator resizing the live buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub kind: StreamKind,
    /// Frames per second for video, samples per second for audio.
    pub rate: f64,
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub ring_capacity: usize,
    /// Frames per audio chunk; 1 for video.
    pub chunk_frames: usize,
}

impl StreamConfig {
    pub fn video(target_fps: u32, buffer_duration_secs: f64) -> Result<Self, CaptureError> {
        let config = Self {
            kind: StreamKind::Video,
            rate: target_fps as f64,
            channels: 3,
            sample_format: SampleFormat::Bgr24,
            ring_capacity: (target_fps as f64 * buffer_duration_secs).floor() as usize,
            chunk_frames: 1,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn audio(
        kind: StreamKind,
        format: AudioFormat,
        chunk_frames: usize,
        buffer_duration_secs: f64,
    ) -> Result<Self, CaptureError> {
        let capacity = if chunk_frames == 0 {
            0
        } else {
            (buffer_duration_secs * format.sample_rate as f64 / chunk_frames as f64).floor() as usize
        };
        let config = Self {
            kind,
            rate: format.sample_rate as f64,
            channels: format.channels,
            sample_format: SampleFormat::I16,
            ring_capacity: capacity,
            chunk_frames,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        let fail = |msg: String| Err(CaptureError::ConfigurationFailed(format!("{} stream: {}", self.kind, msg)));

        if !(self.rate > 0.0 && self.rate.is_finite()) {
            return fail(format!("rate must be positive, got {}", self.rate));
        }
        if self.kind.is_audio() {
            if !(1..=8).contains(&self.channels) {
                return fail(format!("unsupported channel count: {}", self.channels));
            }
            if self.sample_format != SampleFormat::I16 {
                return fail("audio must be 16-bit PCM".into());
            }
            if self.chunk_frames == 0 {
                return fail("chunk size must be positive".into());
            }
        }
        if self.ring_capacity == 0 {
            return fail("buffer duration is shorter than one item".into());
        }
        if self.ring_capacity > MAX_RING_CAPACITY {
            return fail(format!(
                "buffer would hold {} items, more than the limit of {}",
                self.ring_capacity, MAX_RING_CAPACITY
            ));
        }
        Ok(())
    }

    /// Wall-clock seconds covered by one buffered item.
    pub fn item_duration_secs(&self) -> f64 {
        self.chunk_frames as f64 / self.rate
    }

    /// AudioFormat view of an audio stream.
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.rate.round() as u32,
            channels: self.channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_capacity_matches_chunk_count() {
        let format = AudioFormat {
            sample_rate: 48000,
            channels: 2,
        };
        let config = StreamConfig::audio(StreamKind::System, format, 1024, 60.0).unwrap();
        // 60 * 48000 / 1024 = 2812.5
        assert_eq!(config.ring_capacity, 2812);
        assert!((config.item_duration_secs() - 1024.0 / 48000.0).abs() < 1e-12);
    }

    #[test]
    fn video_capacity_is_fps_times_duration() {
        let config = StreamConfig::video(30, 60.0).unwrap();
        assert_eq!(config.ring_capacity, 1800);
        assert_eq!(config.sample_format, SampleFormat::Bgr24);
    }

    #[test]
    fn zero_capacity_is_a_config_error() {
        let format = AudioFormat {
            sample_rate: 8000,
            channels: 1,
        };
        let err = StreamConfig::audio(StreamKind::Mic, format, 1024, 0.1).unwrap_err();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));
    }

    #[test]
    fn rejects_bad_channel_counts() {
        let format = AudioFormat {
            sample_rate: 48000,
            channels: 0,
        };
        assert!(StreamConfig::audio(StreamKind::Mic, format, 1024, 60.0).is_err());
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let format = AudioFormat {
            sample_rate: 0,
            channels: 2,
        };
        assert!(StreamConfig::audio(StreamKind::Mic, format, 1024, 60.0).is_err());
    }

    #[test]
    fn infinite_duration_is_a_config_error() {
        let err = StreamConfig::video(30, f64::INFINITY).unwrap_err();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));

        let format = AudioFormat {
            sample_rate: 48000,
            channels: 2,
        };
        assert!(StreamConfig::audio(StreamKind::System, format, 1024, 1e300).is_err());
    }

    #[test]
    fn oversized_ring_is_a_config_error() {
        let format = AudioFormat {
            sample_rate: 192_000,
            channels: 2,
        };
        // One-frame chunks for an hour: far past the item limit.
        let err = StreamConfig::audio(StreamKind::Mic, format, 1, 3600.0).unwrap_err();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));
    }
}

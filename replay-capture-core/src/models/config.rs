use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Longest history a recorder keeps: one hour.
pub const MAX_BUFFER_DURATION_SECS: f64 = 3600.0;

pub const MAX_TARGET_FPS: u32 = 240;

/// Upper bound for calibration windows and intervals: one day.
pub const MAX_CALIBRATION_SECS: f64 = 86_400.0;

pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Recorder configuration.
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Seconds of history kept for each stream (default: 60).
    pub buffer_duration_secs: f64,

    /// Target screen capture rate (default: 30).
    pub target_fps: u32,

    /// Audio frames per captured chunk (default: 1024).
    pub chunk_frames: usize,

    /// Capture the default microphone (default: true).
    pub enable_mic: bool,

    /// Capture the default output device's loopback (default: true).
    pub enable_system_audio: bool,

    /// Directory for timestamped replay files.
    pub output_dir: PathBuf,

    /// Fixed output path. Overwritten on every flush when set.
    pub output_file: Option<PathBuf>,

    /// Parent directory for per-flush scratch directories. System temp dir when unset.
    pub temp_dir: Option<PathBuf>,

    pub calibration: CalibrationConfig,

    pub retry: RetryConfig,

    /// Flush requests closer together than this are dropped.
    pub trigger_debounce_ms: u64,

    pub encoder: EncoderSettings,
}

/// Frame-rate calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub enabled: bool,

    /// Measurement window in seconds.
    pub window_secs: f64,

    /// Pause between measurements. `None` measures once.
    pub interval_secs: Option<f64>,
}

/// Retry policy for failed device reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Consecutive failed reads tolerated before a stream is declared dead.
    pub max_retries: u32,

    pub backoff_ms: u64,
}

/// External encoder/muxer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub ffmpeg_path: PathBuf,
    pub video_codec: String,
    /// FourCC tag written into the intermediate video container.
    pub video_tag: Option<String>,
    /// Codec quantizer scale (lower is better).
    pub video_quality: u32,
    pub video_extension: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_extension: String,
    pub output_extension: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            buffer_duration_secs: 60.0,
            target_fps: 30,
            chunk_frames: 1024,
            enable_mic: true,
            enable_system_audio: true,
            output_dir: PathBuf::from("."),
            output_file: None,
            temp_dir: None,
            calibration: CalibrationConfig::default(),
            retry: RetryConfig::default(),
            trigger_debounce_ms: 250,
            encoder: EncoderSettings::default(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 1.0,
            interval_secs: Some(30.0),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 200,
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            video_codec: "mpeg4".into(),
            video_tag: Some("xvid".into()),
            video_quality: 5,
            video_extension: "avi".into(),
            audio_codec: "libmp3lame".into(),
            audio_bitrate: "192k".into(),
            audio_extension: "mp3".into(),
            output_extension: "mp4".into(),
        }
    }
}

impl RecorderConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CaptureError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            CaptureError::ConfigurationFailed(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(self.buffer_duration_secs > 0.0 && self.buffer_duration_secs <= MAX_BUFFER_DURATION_SECS) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "buffer duration must be in (0, {}] seconds, got {}",
                MAX_BUFFER_DURATION_SECS, self.buffer_duration_secs
            )));
        }
        if self.target_fps == 0 || self.target_fps > MAX_TARGET_FPS {
            return Err(CaptureError::ConfigurationFailed(format!(
                "target fps must be in 1..={}, got {}",
                MAX_TARGET_FPS, self.target_fps
            )));
        }
        if self.chunk_frames == 0 {
            return Err(CaptureError::ConfigurationFailed("chunk size must be positive".into()));
        }
        if self.calibration.enabled {
            let window = self.calibration.window_secs;
            if !(window > 0.0 && window <= MAX_CALIBRATION_SECS) {
                return Err(CaptureError::ConfigurationFailed(format!(
                    "calibration window must be in (0, {}] seconds, got {}",
                    MAX_CALIBRATION_SECS, window
                )));
            }
            if let Some(interval) = self.calibration.interval_secs {
                if !(interval >= 0.0 && interval <= MAX_CALIBRATION_SECS) {
                    return Err(CaptureError::ConfigurationFailed(format!(
                        "invalid calibration interval: {}",
                        interval
                    )));
                }
            }
        }
        if self.retry.backoff_ms > MAX_BACKOFF_MS {
            return Err(CaptureError::ConfigurationFailed(format!(
                "retry backoff must be at most {} ms, got {}",
                MAX_BACKOFF_MS, self.retry.backoff_ms
            )));
        }
        if self.encoder.video_extension.is_empty()
            || self.encoder.audio_extension.is_empty()
            || self.encoder.output_extension.is_empty()
        {
            return Err(CaptureError::ConfigurationFailed("container extensions must be set".into()));
        }
        Ok(())
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn trigger_debounce(&self) -> Duration {
        Duration::from_millis(self.trigger_debounce_ms)
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

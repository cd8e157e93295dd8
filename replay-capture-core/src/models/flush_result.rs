use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::stream::StreamKind;

/// One buffer serialized to an intermediate file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotInfo {
    pub kind: StreamKind,
    /// Frames (video) or chunks (audio) written.
    pub items: usize,
    pub duration_secs: f64,
    pub path: PathBuf,
}

/// The overlaid audio track handed to the muxer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedAudio {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Result of a successful flush.
///
/// Serializable so a caller can log or export it as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlushResult {
    pub id: String,
    pub output_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub video_frames: usize,
    /// Frame rate the video track was written at.
    pub video_fps: f64,
    pub duration_secs: f64,
    pub mic_chunks: usize,
    pub system_chunks: usize,
    pub merged_audio_secs: Option<f64>,
    pub has_audio: bool,
    /// SHA-256 of the output file, lowercase hex.
    pub checksum: String,
}

use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};

use crate::models::error::CaptureError;
use crate::models::flush_result::SnapshotInfo;
use crate::models::media::{AudioChunk, VideoFrame};
use crate::models::stream::{StreamConfig, StreamKind};
use crate::processing::ring_buffer::RingBuffer;
use crate::processing::wav_format;
use crate::storage::workspace::PartialFile;
use crate::traits::media_encoder::VideoEncoder;

/// Serializes a ring buffer's current contents to an intermediate file.
///
/// `RingBuffer::snapshot` is the only contact with the live buffer; all
/// file I/O and encoding works from that copy, so capture keeps running
/// while a snapshot is written. Output goes through a `PartialFile`, so a
/// failed write leaves nothing at `path`.
pub struct SnapshotWriter {
    video_encoder: Arc<dyn VideoEncoder>,
}

impl SnapshotWriter {
    pub fn new(video_encoder: Arc<dyn VideoEncoder>) -> Self {
        Self { video_encoder }
    }

    /// Write an audio buffer as one 16-bit PCM WAV file.
    ///
    /// Chunks whose channel count disagrees with `config` are dropped.
    /// Fails with `EmptyBuffer` when nothing usable is buffered.
    pub fn write_audio(
        &self,
        buffer: &RingBuffer<AudioChunk>,
        config: &StreamConfig,
        path: &Path,
    ) -> Result<SnapshotInfo, CaptureError> {
        let chunks = buffer.snapshot();
        let total = chunks.len();
        let usable: Vec<AudioChunk> = chunks.into_iter().filter(|c| c.channels == config.channels).collect();
        if usable.len() < total {
            warn!(
                "{} snapshot: dropped {} chunks with a foreign channel layout",
                config.kind,
                total - usable.len()
            );
        }
        if usable.is_empty() {
            return Err(CaptureError::EmptyBuffer(config.kind));
        }

        let partial = PartialFile::new(path);
        let bytes = wav_format::write_wav(
            partial.path(),
            config.audio_format(),
            usable.iter().map(|c| &c.samples[..]),
        )?;
        let path = partial.commit()?;

        let frames: usize = usable.iter().map(AudioChunk::frames).sum();
        let duration_secs = frames as f64 / config.rate;
        debug!(
            "{} snapshot: {} chunks, {:.2}s, {} bytes -> {}",
            config.kind,
            usable.len(),
            duration_secs,
            bytes,
            path.display()
        );

        Ok(SnapshotInfo {
            kind: config.kind,
            items: usable.len(),
            duration_secs,
            path,
        })
    }

    /// Write the video buffer as a container file at `fps`.
    ///
    /// Frames not matching `size` (captured before a resolution change) are
    /// dropped. Fails with `EmptyBuffer(Video)` when nothing usable is buffered.
    pub fn write_video(
        &self,
        buffer: &RingBuffer<VideoFrame>,
        fps: f64,
        size: (u32, u32),
        path: &Path,
    ) -> Result<SnapshotInfo, CaptureError> {
        if !(fps > 0.0) {
            return Err(CaptureError::EncodingFailed(format!("invalid frame rate {}", fps)));
        }

        let frames = buffer.snapshot();
        let total = frames.len();
        let frames: Vec<VideoFrame> = frames
            .into_iter()
            .filter(|f| f.size() == size && f.is_well_formed())
            .collect();
        if frames.len() < total {
            warn!(
                "video snapshot: dropped {} frames not matching {}x{}",
                total - frames.len(),
                size.0,
                size.1
            );
        }
        if frames.is_empty() {
            return Err(CaptureError::EmptyBuffer(StreamKind::Video));
        }

        let partial = PartialFile::new(path);
        self.video_encoder.encode(&frames, fps, size, partial.path())?;
        let path = partial.commit()?;

        let duration_secs = frames.len() as f64 / fps;
        debug!(
            "video snapshot: {} frames at {:.2} fps ({:.2}s) -> {}",
            frames.len(),
            fps,
            duration_secs,
            path.display()
        );

        Ok(SnapshotInfo {
            kind: StreamKind::Video,
            items: frames.len(),
            duration_secs,
            path,
        })
    }
}

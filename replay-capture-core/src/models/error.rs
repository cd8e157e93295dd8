use std::fmt;

use thiserror::Error;

use super::stream::StreamKind;

/// Stage of a flush sequence, reported when the sequence fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushStage {
    Prepare,
    SnapshotVideo,
    SnapshotMic,
    SnapshotSystem,
    Overlay,
    Mux,
    Finalize,
}

impl FlushStage {
    pub fn snapshot_of(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Video => Self::SnapshotVideo,
            StreamKind::Mic => Self::SnapshotMic,
            StreamKind::System => Self::SnapshotSystem,
        }
    }
}

impl fmt::Display for FlushStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prepare => "prepare",
            Self::SnapshotVideo => "video snapshot",
            Self::SnapshotMic => "microphone snapshot",
            Self::SnapshotSystem => "system audio snapshot",
            Self::Overlay => "audio overlay",
            Self::Mux => "mux",
            Self::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while capturing, snapshotting or merging.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("mux failed: {0}")]
    MuxFailed(String),

    #[error("{0} buffer is empty")]
    EmptyBuffer(StreamKind),

    #[error("a flush is already in progress")]
    TriggerInFlight,

    #[error("flush failed during {stage}: {reason}")]
    FlushFailed { stage: FlushStage, reason: String },
}

impl CaptureError {
    /// Wrap this error with the flush stage it happened in.
    pub fn at_stage(self, stage: FlushStage) -> Self {
        match self {
            // Already attributed, or deliberately surfaced as-is.
            Self::FlushFailed { .. } | Self::EmptyBuffer(_) | Self::TriggerInFlight => self,
            other => Self::FlushFailed {
                stage,
                reason: other.to_string(),
            },
        }
    }

    /// The failing stage, if this error came out of a flush sequence.
    pub fn stage(&self) -> Option<FlushStage> {
        match self {
            Self::FlushFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device(_) | Self::DeviceNotAvailable(_))
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        Self::StorageError(e.to_string())
    }
}

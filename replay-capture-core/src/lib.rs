//! # replay-capture-core
//!
//! Platform-agnostic core of the instant-replay recorder.
//!
//! Three capture loops (screen, microphone, system loopback) keep the most
//! recent N seconds of each stream in bounded ring buffers. A trigger
//! snapshots the buffers to intermediate files, overlays the two audio
//! tracks and muxes them with the video into one output file. Platform
//! backends (Windows WASAPI + gdigrab, or the synthetic backend) implement
//! `CaptureBackend` and plug into the generic `Controller`.
//!
//! ## Architecture
//!
//! ```text
//! replay-capture-core (this crate)
//! ├── traits/       ← CaptureSource, CaptureBackend, VideoEncoder/AudioEncoder/Muxer, RecorderDelegate
//! ├── models/       ← CaptureError, ControllerState, RecorderConfig, StreamConfig, FlushResult, etc.
//! ├── processing/   ← RingBuffer, AudioMixer, WAV I/O, FramePacer
//! ├── capture/      ← CaptureLoop, FrameRateCalibrator, CancellationSignal
//! ├── storage/      ← SnapshotWriter, FlushWorkspace, checksums
//! ├── media/        ← ffmpeg invocation and argument builders
//! ├── pipeline/     ← MergePipeline (overlay + mux)
//! ├── session/      ← Recorder (devices + buffers), Controller (orchestration)
//! └── sources/      ← SyntheticBackend
//! ```

pub mod capture;
pub mod media;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod session;
pub mod sources;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use capture::calibrator::FrameRateCalibrator;
pub use capture::capture_loop::{CaptureLoop, LoopHandle};
pub use capture::signal::CancellationSignal;
pub use media::ffmpeg::{FfmpegAudioEncoder, FfmpegMuxer, FfmpegTool, FfmpegVideoEncoder};
pub use models::config::{CalibrationConfig, EncoderSettings, RecorderConfig, RetryConfig};
pub use models::error::{CaptureError, FlushStage};
pub use models::flush_result::FlushResult;
pub use models::media::{AudioChunk, VideoFrame};
pub use models::state::{ControllerState, LoopState};
pub use models::status::{RecorderStatus, StreamFault, StreamStatus};
pub use models::stream::{AudioDevice, AudioFormat, DisplayInfo, SourceInfo, StreamConfig, StreamKind};
pub use pipeline::merge::MergePipeline;
pub use processing::ring_buffer::RingBuffer;
pub use session::controller::{ControlEvent, Controller, FlushServices};
pub use session::recorder::Recorder;
pub use sources::synthetic::SyntheticBackend;
pub use traits::capture_backend::{AudioSource, CaptureBackend, VideoSource};
pub use traits::capture_delegate::{NullDelegate, RecorderDelegate};
pub use traits::capture_source::CaptureSource;
pub use traits::media_encoder::{AudioEncoder, Muxer, VideoEncoder};

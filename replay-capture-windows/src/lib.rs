//! # replay-capture-windows
//!
//! Windows backend for the instant-replay recorder.
//!
//! Provides:
//! - `WindowsBackend`: `CaptureBackend` over the pieces below
//! - `WasapiLoopbackSource`: system audio via WASAPI loopback on the default render endpoint
//! - `WasapiMicSource`: microphone via the default WASAPI capture endpoint
//! - `GdigrabScreenSource`: desktop frames from ffmpeg `gdigrab`
//! - `DeviceEnumerator`: default endpoint resolution via the MMDevice API
//! - `permissions`: Windows microphone privacy check
//!
//! ## Platform Requirements
//! - Windows 10 1703+ for loopback in shared mode
//! - ffmpeg with the `gdigrab` input device on PATH (or configured)
//!
//! ## Usage
//! ```ignore
//! use replay_capture_core::{Controller, Recorder, RecorderConfig};
//! use replay_capture_windows::WindowsBackend;
//!
//! let config = RecorderConfig::default();
//! let backend = WindowsBackend::new(&config.encoder.ffmpeg_path);
//! let recorder = Recorder::build(config, &backend)?;
//! let controller = Controller::with_ffmpeg(recorder);
//! ```

pub mod chunker;
pub mod screen_capture;

#[cfg(target_os = "windows")]
pub mod backend;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
mod wasapi_stream;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;
#[cfg(target_os = "windows")]
pub mod wasapi_mic;

pub use chunker::ChunkAccumulator;
pub use screen_capture::GdigrabScreenSource;

#[cfg(target_os = "windows")]
pub use backend::WindowsBackend;
#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_loopback::WasapiLoopbackSource;
#[cfg(target_os = "windows")]
pub use wasapi_mic::WasapiMicSource;

//! Shared-mode WASAPI capture stream, common to loopback and microphone.
//!
//! COM objects are created lazily on the first read, i.e. on the capture
//! thread the source was moved to, and released by `close()`. A read
//! error tears the stream down; the next read reopens the default
//! endpoint, so the capture loop's retry follows device changes.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use windows::core::w;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::AvSetMmThreadCharacteristicsW;

use replay_capture_core::{AudioChunk, AudioDevice, CaptureError, SourceInfo};

use crate::chunker::{ChunkAccumulator, PacketFormat};
use crate::device_enumerator::{ComGuard, DeviceEnumerator};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
/// 100 ms in 100-ns units.
const BUFFER_DURATION: i64 = 1_000_000;

/// What to do when the endpoint delivers nothing for `timeout`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum IdlePolicy {
    /// Pad with silence, keeping the track on the wall clock.
    FillSilence { timeout: Duration },
    /// Report the device as failed.
    Fail { timeout: Duration },
}

struct ActiveStream {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    packet_format: PacketFormat,
    bytes_per_frame: usize,
    // Declared last: COM is uninitialized after the interfaces are released.
    _com: ComGuard,
}

pub(crate) struct WasapiStream {
    device: AudioDevice,
    stream_flags: u32,
    idle: IdlePolicy,
    accumulator: ChunkAccumulator,
    active: Option<ActiveStream>,
}

impl WasapiStream {
    pub(crate) fn new(device: &AudioDevice, chunk_frames: usize, stream_flags: u32, idle: IdlePolicy) -> Self {
        Self {
            device: device.clone(),
            stream_flags,
            idle,
            accumulator: ChunkAccumulator::new(device.format.channels, chunk_frames),
            active: None,
        }
    }

    pub(crate) fn info(&self) -> SourceInfo {
        self.device.info.clone()
    }

    /// Block until one full chunk is available.
    pub(crate) fn read_chunk(&mut self) -> Result<AudioChunk, CaptureError> {
        match self.read_chunk_inner() {
            Ok(chunk) => Ok(chunk),
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    fn read_chunk_inner(&mut self) -> Result<AudioChunk, CaptureError> {
        if self.active.is_none() {
            self.active = Some(self.open()?);
        }

        let started = Instant::now();
        loop {
            if let Some(chunk) = self.accumulator.pop_chunk() {
                return Ok(chunk);
            }
            if self.drain_packets()? > 0 {
                continue;
            }
            match self.idle {
                IdlePolicy::FillSilence { timeout } if started.elapsed() >= timeout => {
                    let missing = self.accumulator.missing_frames();
                    self.accumulator.push_silence(missing);
                }
                IdlePolicy::Fail { timeout } if started.elapsed() >= timeout => {
                    return Err(CaptureError::Device(format!(
                        "{} delivered no audio for {:.1}s",
                        self.device.info.name,
                        timeout.as_secs_f64()
                    )));
                }
                _ => thread::sleep(POLL_INTERVAL),
            }
        }
    }

    /// Move every queued packet into the accumulator. Returns frames read.
    fn drain_packets(&mut self) -> Result<usize, CaptureError> {
        let Some(active) = &self.active else {
            return Ok(0);
        };
        let mut frames_read = 0usize;
        unsafe {
            let mut packet_length = active.capture_client.GetNextPacketSize().map_err(device_error)?;
            while packet_length > 0 {
                let mut data: *mut u8 = std::ptr::null_mut();
                let mut frames: u32 = 0;
                let mut flags: u32 = 0;
                active
                    .capture_client
                    .GetBuffer(&mut data, &mut frames, &mut flags, None, None)
                    .map_err(device_error)?;

                if frames > 0 {
                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 || data.is_null() {
                        self.accumulator.push_silence(frames as usize);
                    } else {
                        let bytes = std::slice::from_raw_parts(data, frames as usize * active.bytes_per_frame);
                        self.accumulator.push_bytes(active.packet_format, bytes);
                    }
                }

                active.capture_client.ReleaseBuffer(frames).map_err(device_error)?;
                frames_read += frames as usize;
                packet_length = active.capture_client.GetNextPacketSize().map_err(device_error)?;
            }
        }
        Ok(frames_read)
    }

    /// Activate, initialize and start the default endpoint.
    fn open(&self) -> Result<ActiveStream, CaptureError> {
        let com = ComGuard::init_mta()?;
        let kind = self.device.info.kind;
        let device = DeviceEnumerator::new()?.default_endpoint(kind)?;

        unsafe {
            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| CaptureError::DeviceNotAvailable(format!("Activate failed: {}", e)))?;

            let format_ptr = audio_client.GetMixFormat().map_err(device_error)?;
            let format = &*format_ptr;
            let sample_rate = format.nSamplesPerSec;
            let channels = format.nChannels;
            let bits = format.wBitsPerSample;

            let initialized = audio_client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                self.stream_flags | AUDCLNT_STREAMFLAGS_NOPERSIST,
                BUFFER_DURATION,
                0,
                format_ptr,
                None,
            );
            CoTaskMemFree(Some(format_ptr as *const _));
            initialized.map_err(|e| CaptureError::Device(format!("IAudioClient::Initialize failed: {}", e)))?;

            if sample_rate != self.device.format.sample_rate || channels != self.device.format.channels {
                return Err(CaptureError::Device(format!(
                    "{} changed format to {} Hz x{} (expected {} Hz x{})",
                    self.device.info.name,
                    sample_rate,
                    channels,
                    self.device.format.sample_rate,
                    self.device.format.channels
                )));
            }
            let packet_format = PacketFormat::from_bits(bits)
                .ok_or_else(|| CaptureError::Device(format!("unsupported mix format: {} bits per sample", bits)))?;

            let capture_client: IAudioCaptureClient = audio_client.GetService().map_err(device_error)?;

            let mut task_index: u32 = 0;
            if AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index).is_err() {
                debug!("MMCSS registration failed, capturing at normal priority");
            }

            audio_client.Start().map_err(device_error)?;
            info!(
                "{} opened: {} Hz x{}, {}-bit",
                self.device.info.name, sample_rate, channels, bits
            );

            Ok(ActiveStream {
                audio_client,
                capture_client,
                packet_format,
                bytes_per_frame: channels as usize * packet_format.bytes_per_sample(),
                _com: com,
            })
        }
    }

    pub(crate) fn close(&mut self) {
        if let Some(active) = self.active.take() {
            unsafe {
                let _ = active.audio_client.Stop();
            }
            debug!("{} closed", self.device.info.name);
        }
        self.accumulator.clear();
    }
}

fn device_error(e: windows::core::Error) -> CaptureError {
    CaptureError::Device(e.to_string())
}

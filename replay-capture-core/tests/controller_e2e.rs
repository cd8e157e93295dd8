//! End-to-end flush scenarios against scripted sources and file-writing fakes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use replay_capture_core::models::config::CalibrationConfig;
use replay_capture_core::{
    AudioChunk, AudioDevice, AudioEncoder, AudioFormat, AudioSource, CaptureBackend, CaptureError, CaptureSource,
    ControlEvent, Controller, ControllerState, DisplayInfo, FlushResult, FlushServices, Muxer, Recorder,
    RecorderConfig, RecorderDelegate, RecorderStatus, RetryConfig, SourceInfo, StreamFault, StreamKind, VideoEncoder, VideoFrame,
    VideoSource,
};

const FORMAT: AudioFormat = AudioFormat {
    sample_rate: 8000,
    channels: 1,
};
const CHUNK_FRAMES: usize = 4;

/// Emits numbered items every `interval`, then fails forever after `fail_after` items.
struct Scripted {
    kind: StreamKind,
    interval: Duration,
    fail_after: Option<u64>,
    produced: u64,
}

impl Scripted {
    fn step(&mut self) -> Result<u64, CaptureError> {
        thread::sleep(self.interval);
        if self.fail_after.is_some_and(|n| self.produced >= n) {
            return Err(CaptureError::Device(format!("{} unplugged", self.kind.short_name())));
        }
        self.produced += 1;
        Ok(self.produced)
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            id: self.kind.short_name().into(),
            name: format!("scripted {}", self.kind),
            kind: self.kind,
            is_default: true,
        }
    }
}

impl CaptureSource<VideoFrame> for Scripted {
    fn next_item(&mut self) -> Result<VideoFrame, CaptureError> {
        let index = self.step()? as u32;
        let mut data = index.to_le_bytes().to_vec();
        data.extend_from_slice(&[0, 0]);
        Ok(VideoFrame::new(2, 1, data))
    }

    fn device_info(&self) -> SourceInfo {
        self.info()
    }
}

impl CaptureSource<AudioChunk> for Scripted {
    fn next_item(&mut self) -> Result<AudioChunk, CaptureError> {
        let value = (self.step()? % 1000) as i16;
        Ok(AudioChunk::new(FORMAT.channels, vec![value; CHUNK_FRAMES]))
    }

    fn device_info(&self) -> SourceInfo {
        self.info()
    }
}

#[derive(Clone, Copy, Default)]
struct Script {
    video_fail_after: Option<u64>,
    mic_fail_after: Option<u64>,
    system_fail_after: Option<u64>,
}

struct ScriptedBackend(Script);

impl ScriptedBackend {
    fn source(&self, kind: StreamKind) -> Scripted {
        let fail_after = match kind {
            StreamKind::Video => self.0.video_fail_after,
            StreamKind::Mic => self.0.mic_fail_after,
            StreamKind::System => self.0.system_fail_after,
        };
        Scripted {
            kind,
            interval: Duration::from_millis(2),
            fail_after,
            produced: 0,
        }
    }
}

impl CaptureBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn resolve_display(&self) -> Result<DisplayInfo, CaptureError> {
        Ok(DisplayInfo { width: 2, height: 1 })
    }

    fn open_screen(&self, _display: &DisplayInfo, _fps: u32) -> Result<VideoSource, CaptureError> {
        Ok(Box::new(self.source(StreamKind::Video)))
    }

    fn resolve_audio(&self, kind: StreamKind) -> Result<AudioDevice, CaptureError> {
        Ok(AudioDevice {
            info: self.source(kind).info(),
            format: FORMAT,
        })
    }

    fn open_audio(&self, device: &AudioDevice, _chunk_frames: usize) -> Result<AudioSource, CaptureError> {
        Ok(Box::new(self.source(device.info.kind)))
    }
}

/// Writes the frame indices it was given, one u32 each.
#[derive(Default)]
struct IndexEncoder {
    encoded: Mutex<Vec<Vec<u32>>>,
    gate: Option<(Sender<()>, Receiver<()>)>,
}

impl VideoEncoder for IndexEncoder {
    fn encode(&self, frames: &[VideoFrame], _fps: f64, _size: (u32, u32), output: &Path) -> Result<(), CaptureError> {
        if let Some((entered, release)) = &self.gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        let indices: Vec<u32> = frames
            .iter()
            .map(|f| u32::from_le_bytes([f.data[0], f.data[1], f.data[2], f.data[3]]))
            .collect();
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        fs::write(output, bytes)?;
        self.encoded.lock().push(indices);
        Ok(())
    }
}

struct CopyEncoder;

impl AudioEncoder for CopyEncoder {
    fn encode(&self, input_wav: &Path, output: &Path) -> Result<(), CaptureError> {
        fs::copy(input_wav, output)?;
        Ok(())
    }
}

/// Concatenates its inputs.
struct ConcatMuxer;

impl Muxer for ConcatMuxer {
    fn mux(&self, video: &Path, audio: Option<&Path>, output: &Path) -> Result<(), CaptureError> {
        let mut bytes = fs::read(video)?;
        if let Some(audio) = audio {
            bytes.extend(fs::read(audio)?);
        }
        fs::write(output, bytes)?;
        Ok(())
    }
}

#[derive(Default)]
struct Recording {
    states: Mutex<Vec<ControllerState>>,
    faults: Mutex<Vec<StreamFault>>,
    finished: Mutex<Vec<FlushResult>>,
    failed: Mutex<Vec<CaptureError>>,
    statuses: Mutex<usize>,
}

impl RecorderDelegate for Recording {
    fn on_state_changed(&self, state: ControllerState) {
        self.states.lock().push(state);
    }

    fn on_stream_fault(&self, fault: &StreamFault) {
        self.faults.lock().push(fault.clone());
    }

    fn on_flush_finished(&self, result: &FlushResult) {
        self.finished.lock().push(result.clone());
    }

    fn on_flush_failed(&self, error: &CaptureError) {
        self.failed.lock().push(error.clone());
    }

    fn on_status(&self, _status: &RecorderStatus) {
        *self.statuses.lock() += 1;
    }
}

struct Harness {
    controller: Arc<Controller>,
    encoder: Arc<IndexEncoder>,
    delegate: Arc<Recording>,
    temp: PathBuf,
    output: PathBuf,
    _dir: tempfile::TempDir,
}

fn harness(script: Script, encoder: IndexEncoder) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let temp = dir.path().join("tmp");
    let output = dir.path().join("out").join("final.mp4");
    let config = RecorderConfig {
        buffer_duration_secs: 2.0,
        target_fps: 10,
        chunk_frames: CHUNK_FRAMES,
        output_file: Some(output.clone()),
        temp_dir: Some(temp.clone()),
        calibration: CalibrationConfig {
            enabled: false,
            ..Default::default()
        },
        retry: RetryConfig {
            max_retries: 1,
            backoff_ms: 1,
        },
        trigger_debounce_ms: 0,
        ..Default::default()
    };
    let recorder = Recorder::build(config, &ScriptedBackend(script)).unwrap();

    let encoder = Arc::new(encoder);
    let services = FlushServices::new(encoder.clone(), Arc::new(CopyEncoder), Arc::new(ConcatMuxer));
    let delegate = Arc::new(Recording::default());
    let controller = Arc::new(Controller::new(recorder, services).with_delegate(delegate.clone()));

    Harness {
        controller,
        encoder,
        delegate,
        temp,
        output,
        _dir: dir,
    }
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

fn wait_for_video(controller: &Controller, frames: u64) {
    let buffer = Arc::clone(&controller.recorder().video().buffer);
    wait_until("video frames", || buffer.total_appended() >= frames);
}

fn leftover_workspaces(temp: &Path) -> usize {
    fs::read_dir(temp).map(|entries| entries.count()).unwrap_or(0)
}

#[test]
fn video_snapshot_keeps_most_recent_frames() {
    let h = harness(Script::default(), IndexEncoder::default());
    h.controller.start().unwrap();
    wait_for_video(&h.controller, 40);

    let result = h.controller.trigger().unwrap();
    h.controller.stop().unwrap();

    // 10 fps for 2 s.
    assert_eq!(result.video_frames, 20);
    assert_relative_eq!(result.video_fps, 10.0);
    assert_relative_eq!(result.duration_secs, 2.0);

    let encoded = h.encoder.encoded.lock();
    let indices = &encoded[0];
    assert_eq!(indices.len(), 20);
    assert!(indices.windows(2).all(|w| w[1] == w[0] + 1));
    assert!(indices[0] > 20, "oldest frames should have been evicted");
}

#[test]
fn flush_overlays_audio_and_cleans_up() {
    let h = harness(Script::default(), IndexEncoder::default());
    h.controller.start().unwrap();
    wait_for_video(&h.controller, 5);

    let result = h.controller.trigger().unwrap();
    h.controller.stop().unwrap();

    assert!(h.output.exists());
    assert_eq!(result.output_path, h.output);
    assert!(result.has_audio);
    assert!(result.mic_chunks > 0 && result.system_chunks > 0);

    let longest = result.mic_chunks.max(result.system_chunks);
    let expected = (longest * CHUNK_FRAMES) as f64 / FORMAT.sample_rate as f64;
    assert_relative_eq!(result.merged_audio_secs.unwrap(), expected);

    let bytes = fs::read(&h.output).unwrap();
    assert_eq!(result.checksum, replay_capture_core::storage::checksum::sha256_file(&h.output).unwrap());
    assert!(bytes.len() > result.video_frames * 4);
    assert_eq!(leftover_workspaces(&h.temp), 0);
    assert_eq!(h.delegate.finished.lock().len(), 1);
}

#[test]
fn dead_mic_does_not_block_flush() {
    let script = Script {
        mic_fail_after: Some(3),
        ..Default::default()
    };
    let h = harness(script, IndexEncoder::default());
    h.controller.start().unwrap();

    let fault = h.controller.faults().recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(fault.kind, StreamKind::Mic);
    assert!(fault.error.is_device_error());
    wait_for_video(&h.controller, 5);

    let status = h.controller.status();
    let mic = status.streams.iter().find(|s| s.kind == StreamKind::Mic).unwrap();
    assert_eq!(mic.len, 0);
    assert!(mic.state.is_stopped());
    assert!(mic.last_error.is_some());

    let result = h.controller.trigger().unwrap();
    h.controller.stop().unwrap();

    assert_eq!(result.mic_chunks, 0);
    assert!(result.system_chunks > 0);
    assert!(result.has_audio);
    assert!(h.output.exists());
}

#[test]
fn empty_video_buffer_fails_flush() {
    let script = Script {
        video_fail_after: Some(0),
        mic_fail_after: Some(0),
        system_fail_after: Some(0),
    };
    let h = harness(script, IndexEncoder::default());
    h.controller.start().unwrap();
    for _ in 0..3 {
        h.controller.faults().recv_timeout(Duration::from_secs(10)).unwrap();
    }

    let err = h.controller.trigger().unwrap_err();
    h.controller.stop().unwrap();

    assert_eq!(err, CaptureError::EmptyBuffer(StreamKind::Video));
    assert!(!h.output.exists());
    assert_eq!(leftover_workspaces(&h.temp), 0);
    assert_eq!(*h.delegate.failed.lock(), vec![err]);
}

#[test]
fn overlapping_trigger_is_rejected() {
    let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded(1);
    let encoder = IndexEncoder {
        gate: Some((entered_tx, release_rx)),
        ..Default::default()
    };
    let h = harness(Script::default(), encoder);
    h.controller.start().unwrap();
    wait_for_video(&h.controller, 5);

    let first = {
        let controller = Arc::clone(&h.controller);
        thread::spawn(move || controller.trigger())
    };
    entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(h.controller.state(), ControllerState::Flushing);

    assert_eq!(h.controller.trigger().unwrap_err(), CaptureError::TriggerInFlight);

    release_tx.send(()).unwrap();
    assert!(first.join().unwrap().is_ok());
    assert_eq!(h.controller.state(), ControllerState::Capturing);
    h.controller.stop().unwrap();
}

#[test]
fn stop_waits_for_in_flight_trigger() {
    let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded(1);
    let encoder = IndexEncoder {
        gate: Some((entered_tx, release_rx)),
        ..Default::default()
    };
    let h = harness(Script::default(), encoder);
    h.controller.start().unwrap();
    wait_for_video(&h.controller, 5);

    let trigger = {
        let controller = Arc::clone(&h.controller);
        thread::spawn(move || controller.trigger())
    };
    entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    let stopper = {
        let controller = Arc::clone(&h.controller);
        thread::spawn(move || controller.stop())
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!stopper.is_finished(), "stop returned while a flush was running");
    assert!(!h.controller.signal().is_cancelled());
    assert!(matches!(h.controller.trigger(), Err(CaptureError::TriggerInFlight)));

    release_tx.send(()).unwrap();
    assert!(trigger.join().unwrap().is_ok());
    assert!(stopper.join().unwrap().is_ok());

    assert_eq!(h.controller.state(), ControllerState::Stopped);
    assert!(h.controller.signal().is_cancelled());
    assert!(h.output.exists());
    assert_eq!(leftover_workspaces(&h.temp), 0);
}

#[test]
fn record_once_captures_one_span_and_stops() {
    let h = harness(Script::default(), IndexEncoder::default());

    let started = Instant::now();
    let result = h.controller.record_once().unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(h.controller.state(), ControllerState::Stopped);
    assert!(result.video_frames > 0 && result.video_frames <= 20);
    assert!(result.has_audio);
    assert!(h.output.exists());
    assert_eq!(h.delegate.finished.lock().len(), 1);
}

#[test]
fn stop_is_idempotent_and_final() {
    let h = harness(Script::default(), IndexEncoder::default());
    h.controller.start().unwrap();
    wait_for_video(&h.controller, 2);

    h.controller.stop().unwrap();
    h.controller.stop().unwrap();

    assert_eq!(h.controller.state(), ControllerState::Stopped);
    assert!(h.controller.signal().is_cancelled());
    assert!(matches!(h.controller.trigger(), Err(CaptureError::ConfigurationFailed(_))));
    assert!(h.controller.start().is_err());

    let status = h.controller.status();
    assert!(status.streams.iter().all(|s| s.state.is_stopped()));
    let states = h.delegate.states.lock();
    assert_eq!(states.first(), Some(&ControllerState::Capturing));
    assert_eq!(states.last(), Some(&ControllerState::Stopped));
}

#[test]
fn run_handles_flush_then_quit() {
    let h = harness(Script::default(), IndexEncoder::default());
    h.controller.start().unwrap();
    wait_for_video(&h.controller, 5);

    let (tx, rx) = crossbeam_channel::unbounded();
    let runner = {
        let controller = Arc::clone(&h.controller);
        thread::spawn(move || controller.run(rx))
    };
    tx.send(ControlEvent::Status).unwrap();
    tx.send(ControlEvent::Flush).unwrap();
    tx.send(ControlEvent::Quit).unwrap();

    assert!(runner.join().unwrap().is_ok());
    assert_eq!(h.controller.state(), ControllerState::Stopped);
    assert_eq!(*h.delegate.statuses.lock(), 1);
    assert_eq!(h.delegate.finished.lock().len(), 1);
    assert!(h.output.exists());
}

#[test]
fn video_fault_ends_run() {
    let script = Script {
        video_fail_after: Some(3),
        ..Default::default()
    };
    let h = harness(script, IndexEncoder::default());
    let (_tx, rx) = crossbeam_channel::unbounded::<ControlEvent>();

    let err = h.controller.run(rx).unwrap_err();

    assert!(err.is_device_error());
    assert_eq!(h.controller.state(), ControllerState::Stopped);
    assert_eq!(h.delegate.faults.lock()[0].kind, StreamKind::Video);
}

/// Needs an ffmpeg binary on PATH.
#[test]
#[ignore]
fn synthetic_capture_through_ffmpeg() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("replay.mp4");
    let config = RecorderConfig {
        buffer_duration_secs: 2.0,
        target_fps: 15,
        output_file: Some(output.clone()),
        temp_dir: Some(dir.path().join("tmp")),
        ..Default::default()
    };
    let recorder = Recorder::build(config, &replay_capture_core::SyntheticBackend::default()).unwrap();
    let controller = Controller::with_ffmpeg(recorder);

    controller.start().unwrap();
    thread::sleep(Duration::from_secs(3));
    let result = controller.trigger().unwrap();
    controller.stop().unwrap();

    assert!(result.has_audio);
    assert!(fs::metadata(&output).unwrap().len() > 0);
}

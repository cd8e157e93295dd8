use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::capture::calibrator::{FrameRateCalibrator, MeasuredRate};
use crate::capture::capture_loop::{CaptureLoop, LoopHandle, LoopStatus};
use crate::capture::signal::CancellationSignal;
use crate::media::ffmpeg::{FfmpegAudioEncoder, FfmpegMuxer, FfmpegTool, FfmpegVideoEncoder};
use crate::models::config::EncoderSettings;
use crate::models::error::{CaptureError, FlushStage};
use crate::models::flush_result::{FlushResult, SnapshotInfo};
use crate::models::state::{ControllerState, LoopState};
use crate::models::status::{RecorderStatus, StreamFault, StreamStatus};
use crate::models::stream::StreamKind;
use crate::pipeline::merge::MergePipeline;
use crate::session::recorder::{Recorder, RecorderSources};
use crate::storage::checksum::sha256_file;
use crate::storage::snapshot_writer::SnapshotWriter;
use crate::storage::workspace::FlushWorkspace;
use crate::traits::capture_delegate::{NullDelegate, RecorderDelegate};
use crate::traits::media_encoder::{AudioEncoder, Muxer, VideoEncoder};

/// How often the event loop logs buffer occupancy at debug level.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// An edge-triggered user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Status,
    Flush,
    Quit,
}

impl ControlEvent {
    /// Map an input line (`p`/`status`, `s`/`flush`, `q`/`quit`) to an action.
    pub fn from_command(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "status" => Some(Self::Status),
            "s" | "flush" => Some(Self::Flush),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// The encode and mux services a flush runs through.
pub struct FlushServices {
    pub snapshot: SnapshotWriter,
    pub merge: MergePipeline,
}

impl FlushServices {
    pub fn new(video: Arc<dyn VideoEncoder>, audio: Arc<dyn AudioEncoder>, muxer: Arc<dyn Muxer>) -> Self {
        Self {
            snapshot: SnapshotWriter::new(video),
            merge: MergePipeline::new(audio, muxer),
        }
    }

    /// Services backed by the configured ffmpeg executable.
    pub fn ffmpeg(settings: &EncoderSettings) -> Self {
        let tool = FfmpegTool::new(settings.ffmpeg_path.clone());
        Self::new(
            Arc::new(FfmpegVideoEncoder::new(tool.clone(), settings.clone())),
            Arc::new(FfmpegAudioEncoder::new(tool.clone(), settings.clone())),
            Arc::new(FfmpegMuxer::new(tool)),
        )
    }
}

/// Owns the cancellation signal and sequences capture and flushes.
///
/// ```text
/// start():   3 × CaptureLoop thread + FrameRateCalibrator thread
/// trigger(): snapshot video → snapshot mic → snapshot system → overlay → mux → checksum
/// stop():    wait for trigger → cancel → join loops and calibrator
/// ```
///
/// All methods take `&self`; share the controller as `Arc<Controller>`.
/// At most one trigger runs at a time, a second one is rejected with
/// `TriggerInFlight`.
pub struct Controller {
    recorder: Recorder,
    services: FlushServices,
    delegate: Arc<dyn RecorderDelegate>,
    signal: CancellationSignal,
    state: Mutex<ControllerState>,
    loops: Mutex<Vec<LoopHandle>>,
    loop_status: Mutex<Vec<(StreamKind, Arc<Mutex<LoopStatus>>)>>,
    calibrator: Mutex<Option<JoinHandle<()>>>,
    measured_fps: Mutex<Option<Arc<MeasuredRate>>>,
    flush_guard: Mutex<()>,
    flush_seq: AtomicU64,
    fault_tx: Sender<StreamFault>,
    fault_rx: Receiver<StreamFault>,
}

impl Controller {
    pub fn new(recorder: Recorder, services: FlushServices) -> Self {
        let (fault_tx, fault_rx) = crossbeam_channel::unbounded();
        Self {
            recorder,
            services,
            delegate: Arc::new(NullDelegate),
            signal: CancellationSignal::new(),
            state: Mutex::new(ControllerState::Idle),
            loops: Mutex::new(Vec::new()),
            loop_status: Mutex::new(Vec::new()),
            calibrator: Mutex::new(None),
            measured_fps: Mutex::new(None),
            flush_guard: Mutex::new(()),
            flush_seq: AtomicU64::new(0),
            fault_tx,
            fault_rx,
        }
    }

    /// Controller using ffmpeg for every encode and mux step.
    pub fn with_ffmpeg(recorder: Recorder) -> Self {
        let services = FlushServices::ffmpeg(&recorder.config().encoder);
        Self::new(recorder, services)
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn RecorderDelegate>) -> Self {
        self.delegate = delegate;
        self
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock()
    }

    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Faults reported by capture loops. `run` consumes these; callers
    /// driving the controller themselves can watch them here instead.
    pub fn faults(&self) -> &Receiver<StreamFault> {
        &self.fault_rx
    }

    /// Frame rate the video snapshot is written at: the calibrated rate
    /// once measured, the target rate before that.
    pub fn video_fps(&self) -> f64 {
        self.measured_fps
            .lock()
            .as_ref()
            .and_then(|m| m.get())
            .unwrap_or(self.recorder.video().config.rate)
    }

    /// Launch the capture loops and the frame-rate calibrator.
    pub fn start(&self) -> Result<(), CaptureError> {
        if !self.state().is_idle() {
            return Err(CaptureError::ConfigurationFailed("recorder was already started".into()));
        }
        let sources = self
            .recorder
            .take_sources()
            .ok_or_else(|| CaptureError::ConfigurationFailed("capture sources were already taken".into()))?;
        let mut handles = Vec::new();
        let mut statuses = Vec::new();
        if let Err(err) = self.spawn_loops(sources, &mut handles, &mut statuses) {
            error!("failed to start capture: {}", err);
            self.signal.cancel();
            for handle in handles {
                handle.join();
            }
            self.set_state(ControllerState::Stopped);
            return Err(err);
        }

        *self.loops.lock() = handles;
        *self.loop_status.lock() = statuses;

        let calibration = &self.recorder.config().calibration;
        if calibration.enabled {
            let calibrator = FrameRateCalibrator::new(
                Arc::clone(&self.recorder.video().buffer),
                self.recorder.config().buffer_duration_secs,
                calibration,
                self.signal.clone(),
            );
            *self.measured_fps.lock() = Some(calibrator.measured());
            match calibrator.spawn() {
                Ok(handle) => *self.calibrator.lock() = Some(handle),
                Err(err) => warn!("frame-rate calibration disabled: {}", err),
            }
        }

        info!("capturing from {} backend", self.recorder.backend_name());
        self.set_state(ControllerState::Capturing);
        Ok(())
    }

    fn spawn_loops(
        &self,
        sources: RecorderSources,
        handles: &mut Vec<LoopHandle>,
        statuses: &mut Vec<(StreamKind, Arc<Mutex<LoopStatus>>)>,
    ) -> Result<(), CaptureError> {
        let retry = &self.recorder.config().retry;

        let video = CaptureLoop::new(
            StreamKind::Video,
            sources.video,
            Arc::clone(&self.recorder.video().buffer),
            self.signal.clone(),
        )
        .with_retry(retry.clone())
        .report_faults_to(self.fault_tx.clone());
        statuses.push((StreamKind::Video, video.status()));
        handles.push(video.spawn()?);

        for (kind, source) in [(StreamKind::Mic, sources.mic), (StreamKind::System, sources.system)] {
            let (Some(source), Some(slot)) = (source, self.recorder.audio(kind)) else {
                continue;
            };
            let audio = CaptureLoop::new(kind, source, Arc::clone(&slot.buffer), self.signal.clone())
                .with_retry(retry.clone())
                .report_faults_to(self.fault_tx.clone());
            statuses.push((kind, audio.status()));
            handles.push(audio.spawn()?);
        }
        Ok(())
    }

    /// Snapshot all buffers and merge them into one output file.
    ///
    /// Runs synchronously on the calling thread. Capture continues
    /// throughout; only the snapshot copies touch the live buffers.
    pub fn trigger(&self) -> Result<FlushResult, CaptureError> {
        let result = self.trigger_inner();
        match &result {
            Ok(flush) => self.delegate.on_flush_finished(flush),
            Err(err) => self.delegate.on_flush_failed(err),
        }
        result
    }

    fn trigger_inner(&self) -> Result<FlushResult, CaptureError> {
        let Some(_guard) = self.flush_guard.try_lock() else {
            warn!("flush rejected: another flush is in progress");
            return Err(CaptureError::TriggerInFlight);
        };
        {
            let mut state = self.state.lock();
            if *state != ControllerState::Capturing {
                return Err(CaptureError::ConfigurationFailed(format!(
                    "cannot flush while {:?}",
                    *state
                )));
            }
            *state = ControllerState::Flushing;
        }
        self.delegate.on_state_changed(ControllerState::Flushing);

        let seq = self.flush_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        info!("flush #{} started", seq);

        let result = self.flush(seq);
        match &result {
            Ok(flush) => info!(
                "flush #{} wrote {} ({:.1}s, {} frames, audio: {}) in {:.2}s",
                seq,
                flush.output_path.display(),
                flush.duration_secs,
                flush.video_frames,
                flush.has_audio,
                started.elapsed().as_secs_f64()
            ),
            Err(err) => error!("flush #{} failed: {}", seq, err),
        }

        let restored = {
            let mut state = self.state.lock();
            if *state == ControllerState::Flushing {
                *state = ControllerState::Capturing;
                true
            } else {
                false
            }
        };
        if restored {
            self.delegate.on_state_changed(ControllerState::Capturing);
        }
        result
    }

    fn flush(&self, seq: u64) -> Result<FlushResult, CaptureError> {
        let config = self.recorder.config();
        let workspace = FlushWorkspace::create(&config.temp_root(), &config.encoder)
            .map_err(|e| e.at_stage(FlushStage::Prepare))?;
        let output = self.output_path(seq);

        let display = self.recorder.display();
        let fps = self.video_fps();
        let video = self
            .services
            .snapshot
            .write_video(
                &self.recorder.video().buffer,
                fps,
                (display.width, display.height),
                &workspace.video_path(),
            )
            .map_err(|e| e.at_stage(FlushStage::SnapshotVideo))?;
        debug!("flush #{}: {} stage done", seq, FlushStage::SnapshotVideo);

        let mic = self.snapshot_audio(StreamKind::Mic, &workspace)?;
        let system = self.snapshot_audio(StreamKind::System, &workspace)?;

        let outcome = self
            .services
            .merge
            .merge(&workspace, &video, mic.as_ref(), system.as_ref(), &output)?;
        debug!("flush #{}: {} stage done", seq, FlushStage::Mux);

        let checksum = sha256_file(&outcome.output_path).map_err(|e| e.at_stage(FlushStage::Finalize))?;

        Ok(FlushResult {
            id: workspace.id().to_string(),
            output_path: outcome.output_path,
            created_at: Utc::now(),
            video_frames: video.items,
            video_fps: fps,
            duration_secs: video.duration_secs,
            mic_chunks: mic.as_ref().map_or(0, |s| s.items),
            system_chunks: system.as_ref().map_or(0, |s| s.items),
            merged_audio_secs: outcome.audio.as_ref().map(|a| a.duration_secs),
            has_audio: outcome.audio.is_some(),
            checksum,
        })
    }

    /// Write one audio snapshot. A disabled stream or an empty buffer yields `None`.
    fn snapshot_audio(&self, kind: StreamKind, workspace: &FlushWorkspace) -> Result<Option<SnapshotInfo>, CaptureError> {
        let Some(slot) = self.recorder.audio(kind) else {
            return Ok(None);
        };
        match self
            .services
            .snapshot
            .write_audio(&slot.buffer, &slot.config, &workspace.audio_path(kind))
        {
            Ok(info) => Ok(Some(info)),
            Err(CaptureError::EmptyBuffer(_)) => {
                info!("{} buffer is empty, flushing without it", kind);
                Ok(None)
            }
            Err(err) => Err(err.at_stage(FlushStage::snapshot_of(kind))),
        }
    }

    fn output_path(&self, seq: u64) -> PathBuf {
        let config = self.recorder.config();
        if let Some(path) = &config.output_file {
            return path.clone();
        }
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        config
            .output_dir
            .join(format!("replay_{}_{}.{}", stamp, seq, config.encoder.output_extension))
    }

    /// Stop capturing and release every device.
    ///
    /// Waits for an in-flight trigger to finish first. Safe to call more
    /// than once and from any thread except a trigger's own.
    pub fn stop(&self) -> Result<(), CaptureError> {
        {
            let mut state = self.state.lock();
            match *state {
                ControllerState::Stopped | ControllerState::Stopping => return Ok(()),
                _ => *state = ControllerState::Stopping,
            }
        }
        self.delegate.on_state_changed(ControllerState::Stopping);
        info!("stopping capture");

        let _flush = self.flush_guard.lock();
        self.signal.cancel();

        let loops: Vec<LoopHandle> = std::mem::take(&mut *self.loops.lock());
        for handle in loops {
            let exit = handle.join();
            match exit.error {
                Some(err) => warn!("{} stream had stopped with: {}", exit.kind, err),
                None => debug!("{} stream joined after {} items", exit.kind, exit.items_captured),
            }
        }
        if let Some(calibrator) = self.calibrator.lock().take() {
            if calibrator.join().is_err() {
                warn!("frame-rate calibrator panicked");
            }
        }

        self.set_state(ControllerState::Stopped);
        info!("capture stopped");
        Ok(())
    }

    /// Fixed-length recording: capture for one buffer span, flush once,
    /// then stop. An early `stop()` from another thread cuts the span short.
    pub fn record_once(&self) -> Result<FlushResult, CaptureError> {
        let secs = self.recorder.config().buffer_duration_secs;
        let span = Duration::try_from_secs_f64(secs)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("invalid recording length {}: {}", secs, e)))?;
        if self.state().is_idle() {
            self.start()?;
        }

        info!("recording {:.1}s", secs);
        if self.signal.wait_timeout(span) {
            debug!("recording interrupted");
        }
        let result = self.trigger();
        self.stop()?;
        result
    }

    /// Per-stream buffer occupancy.
    pub fn status(&self) -> RecorderStatus {
        let loop_status = self.loop_status.lock();
        let loop_of = |kind: StreamKind| loop_status.iter().find(|(k, _)| *k == kind).map(|(_, s)| s.lock().clone());

        let mut streams = Vec::new();
        let video = self.recorder.video();
        streams.push(stream_status(
            StreamKind::Video,
            video.buffer.len(),
            video.buffer.capacity(),
            1.0 / self.video_fps(),
            video.buffer.total_appended(),
            loop_of(StreamKind::Video),
        ));
        for kind in [StreamKind::Mic, StreamKind::System] {
            if let Some(slot) = self.recorder.audio(kind) {
                streams.push(stream_status(
                    kind,
                    slot.buffer.len(),
                    slot.buffer.capacity(),
                    slot.config.item_duration_secs(),
                    slot.buffer.total_appended(),
                    loop_of(kind),
                ));
            }
        }

        RecorderStatus {
            state: self.state(),
            measured_fps: self.measured_fps.lock().as_ref().and_then(|m| m.get()),
            streams,
        }
    }

    /// Drive the controller from an event channel until `Quit`, a closed
    /// channel, or the death of the video stream.
    ///
    /// Starts capture if needed. Flushes run on worker threads so status
    /// and quit stay responsive; flushes closer together than the
    /// configured debounce are dropped. Always stops the controller before
    /// returning.
    pub fn run(self: &Arc<Self>, events: Receiver<ControlEvent>) -> Result<(), CaptureError> {
        if self.state().is_idle() {
            self.start()?;
        }

        let debounce = self.recorder.config().trigger_debounce();
        let ticker = crossbeam_channel::tick(STATUS_LOG_INTERVAL);
        let mut last_flush: Option<Instant> = None;
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        let outcome = loop {
            let step = select! {
                recv(events) -> event => Step::Event(event.ok()),
                recv(self.fault_rx) -> fault => Step::Fault(fault.ok()),
                recv(ticker) -> _ => Step::Tick,
            };
            match step {
                Step::Event(Some(ControlEvent::Status)) => {
                    let status = self.status();
                    debug!("{}", status);
                    self.delegate.on_status(&status);
                }
                Step::Event(Some(ControlEvent::Flush)) => {
                    if last_flush.is_some_and(|t| t.elapsed() < debounce) {
                        debug!("flush request debounced");
                        continue;
                    }
                    last_flush = Some(Instant::now());
                    workers.retain(|w| !w.is_finished());
                    match self.spawn_flush() {
                        Ok(worker) => workers.push(worker),
                        Err(err) => {
                            error!("{}", err);
                            self.delegate.on_flush_failed(&err);
                        }
                    }
                }
                Step::Event(Some(ControlEvent::Quit)) => break Ok(()),
                Step::Event(None) => {
                    debug!("control channel closed");
                    break Ok(());
                }
                Step::Fault(Some(fault)) => {
                    self.delegate.on_stream_fault(&fault);
                    if fault.kind == StreamKind::Video {
                        error!("{}; nothing left to replay", fault);
                        break Err(fault.error);
                    }
                    warn!("{}; continuing without it", fault);
                }
                Step::Fault(None) => {}
                Step::Tick => debug!("{}", self.status()),
            }
        };

        for worker in workers {
            let _ = worker.join();
        }
        self.stop()?;
        outcome
    }

    /// Run one trigger on a worker thread.
    fn spawn_flush(self: &Arc<Self>) -> Result<JoinHandle<()>, CaptureError> {
        let this = Arc::clone(self);
        thread::Builder::new()
            .name("flush".into())
            .spawn(move || {
                let _ = this.trigger();
            })
            .map_err(|e| CaptureError::FlushFailed {
                stage: FlushStage::Prepare,
                reason: format!("failed to spawn flush thread: {}", e),
            })
    }

    fn set_state(&self, new_state: ControllerState) {
        *self.state.lock() = new_state;
        self.delegate.on_state_changed(new_state);
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        // Capture threads keep running after drop unless stopped.
        if !self.state().is_terminal() && !self.state().is_idle() {
            let _ = self.stop();
        }
    }
}

enum Step {
    Event(Option<ControlEvent>),
    Fault(Option<StreamFault>),
    Tick,
}

fn stream_status(
    kind: StreamKind,
    len: usize,
    capacity: usize,
    item_secs: f64,
    total_captured: u64,
    loop_status: Option<LoopStatus>,
) -> StreamStatus {
    StreamStatus {
        kind,
        len,
        capacity,
        seconds_buffered: len as f64 * item_secs,
        state: loop_status.as_ref().map_or(LoopState::Stopped, |s| s.state),
        total_captured,
        last_error: loop_status.and_then(|s| s.last_error).map(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_map_to_events() {
        assert_eq!(ControlEvent::from_command("p"), Some(ControlEvent::Status));
        assert_eq!(ControlEvent::from_command(" FLUSH \n"), Some(ControlEvent::Flush));
        assert_eq!(ControlEvent::from_command("q"), Some(ControlEvent::Quit));
        assert_eq!(ControlEvent::from_command("x"), None);
        assert_eq!(ControlEvent::from_command(""), None);
    }
}

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::capture::signal::CancellationSignal;
use crate::models::config::RetryConfig;
use crate::models::error::CaptureError;
use crate::models::state::LoopState;
use crate::models::status::StreamFault;
use crate::models::stream::StreamKind;
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::capture_source::CaptureSource;

/// Loop progress, shared with whoever reports status.
#[derive(Debug, Clone)]
pub struct LoopStatus {
    pub state: LoopState,
    pub items_captured: u64,
    pub last_error: Option<CaptureError>,
}

impl Default for LoopStatus {
    fn default() -> Self {
        Self {
            state: LoopState::Running,
            items_captured: 0,
            last_error: None,
        }
    }
}

/// How a capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopExit {
    pub kind: StreamKind,
    pub items_captured: u64,
    /// The error that killed the stream; `None` after a normal stop.
    pub error: Option<CaptureError>,
}

/// Drives one capture source into its ring buffer until cancelled.
///
/// ```text
/// [CaptureSource] → next_item() → [RingBuffer]
///        │ error
///        ├─ retry after backoff (up to max_retries in a row)
///        └─ give up: report StreamFault, clear buffer (audio), stop
/// ```
///
/// The cancellation signal is checked once per iteration, so a loop stops
/// after its current `next_item()` call returns.
pub struct CaptureLoop<T> {
    kind: StreamKind,
    source: Box<dyn CaptureSource<T>>,
    buffer: Arc<RingBuffer<T>>,
    signal: CancellationSignal,
    retry: RetryConfig,
    status: Arc<Mutex<LoopStatus>>,
    faults: Option<Sender<StreamFault>>,
}

impl<T: Clone + Send + 'static> CaptureLoop<T> {
    pub fn new(
        kind: StreamKind,
        source: Box<dyn CaptureSource<T>>,
        buffer: Arc<RingBuffer<T>>,
        signal: CancellationSignal,
    ) -> Self {
        Self {
            kind,
            source,
            buffer,
            signal,
            retry: RetryConfig::default(),
            status: Arc::new(Mutex::new(LoopStatus::default())),
            faults: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Send a `StreamFault` here when the loop gives up on its source.
    pub fn report_faults_to(mut self, faults: Sender<StreamFault>) -> Self {
        self.faults = Some(faults);
        self
    }

    pub fn status(&self) -> Arc<Mutex<LoopStatus>> {
        Arc::clone(&self.status)
    }

    /// Run on a dedicated named thread.
    pub fn spawn(self) -> Result<LoopHandle, CaptureError> {
        let kind = self.kind;
        let status = self.status();
        let handle = thread::Builder::new()
            .name(format!("capture-{}", kind.short_name()))
            .spawn(move || self.run())
            .map_err(|e| CaptureError::Device(format!("failed to spawn {} capture thread: {}", kind, e)))?;

        Ok(LoopHandle { kind, status, handle })
    }

    /// Run on the current thread until cancelled or the source dies.
    pub fn run(mut self) -> LoopExit {
        let device = self.source.device_info();
        info!("{} capture started on {}", self.kind, device.name);

        let fatal = self.capture_until_stopped();
        self.source.close();

        if let Some(err) = &fatal {
            error!("{} capture stopped: {}", self.kind, err);
            if self.kind.is_audio() {
                self.buffer.clear();
            }
        }

        let items_captured = {
            let mut status = self.status.lock();
            status.state = LoopState::Stopped;
            status.items_captured
        };

        // Observers of the fault see the loop already stopped.
        if let (Some(err), Some(faults)) = (&fatal, &self.faults) {
            let _ = faults.send(StreamFault {
                kind: self.kind,
                error: err.clone(),
            });
        }
        info!("{} capture finished after {} items", self.kind, items_captured);

        LoopExit {
            kind: self.kind,
            items_captured,
            error: fatal,
        }
    }

    fn capture_until_stopped(&mut self) -> Option<CaptureError> {
        let mut consecutive_failures = 0u32;

        loop {
            if self.signal.is_cancelled() {
                self.status.lock().state = LoopState::Stopping;
                debug!("{} capture observed cancellation", self.kind);
                return None;
            }

            match self.source.next_item() {
                Ok(item) => {
                    consecutive_failures = 0;
                    self.buffer.append(item);
                    self.status.lock().items_captured += 1;
                }
                Err(err) => {
                    // A source torn down by shutdown is not a stream failure.
                    if self.signal.is_cancelled() {
                        self.status.lock().state = LoopState::Stopping;
                        return None;
                    }

                    consecutive_failures += 1;
                    self.status.lock().last_error = Some(err.clone());
                    if consecutive_failures > self.retry.max_retries {
                        return Some(err);
                    }

                    warn!(
                        "{} read failed (retry {}/{}): {}",
                        self.kind, consecutive_failures, self.retry.max_retries, err
                    );
                    if self.signal.wait_timeout(self.retry.backoff()) {
                        self.status.lock().state = LoopState::Stopping;
                        return None;
                    }
                }
            }
        }
    }
}

/// A capture loop running on its own thread.
#[derive(Debug)]
pub struct LoopHandle {
    kind: StreamKind,
    status: Arc<Mutex<LoopStatus>>,
    handle: JoinHandle<LoopExit>,
}

impl LoopHandle {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn status(&self) -> LoopStatus {
        self.status.lock().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to exit. Has no timeout.
    pub fn join(self) -> LoopExit {
        match self.handle.join() {
            Ok(exit) => exit,
            Err(_) => {
                let items_captured = {
                    let mut status = self.status.lock();
                    status.state = LoopState::Stopped;
                    status.items_captured
                };
                LoopExit {
                    kind: self.kind,
                    items_captured,
                    error: Some(CaptureError::Device(format!("{} capture thread panicked", self.kind))),
                }
            }
        }
    }
}

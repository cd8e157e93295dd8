use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::capture::signal::CancellationSignal;
use crate::models::config::{CalibrationConfig, MAX_CALIBRATION_SECS};
use crate::models::error::CaptureError;
use crate::models::stream::MAX_RING_CAPACITY;
use crate::processing::ring_buffer::RingBuffer;

/// Last measured frame rate, readable from any thread.
#[derive(Debug, Default)]
pub struct MeasuredRate(AtomicU64);

impl MeasuredRate {
    pub fn get(&self) -> Option<f64> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            bits => Some(f64::from_bits(bits)),
        }
    }

    fn set(&self, fps: f64) {
        self.0.store(fps.to_bits(), Ordering::Release);
    }
}

/// Outcome of one calibration pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Calibration {
    Resized { fps: f64, old_capacity: usize, new_capacity: usize },
    Skipped { fps: f64, capacity: usize },
}

/// Keeps the video buffer's wall-clock span at `buffer_duration_secs`.
///
/// Screen capture rarely achieves its target rate exactly. The calibrator
/// counts frames appended over a window, derives the real rate, and resizes
/// the buffer to `rate * duration` frames. A stalled stream (rate 0) leaves
/// the capacity alone.
pub struct FrameRateCalibrator<T> {
    buffer: Arc<RingBuffer<T>>,
    buffer_duration_secs: f64,
    window: Duration,
    interval: Option<Duration>,
    measured: Arc<MeasuredRate>,
    signal: CancellationSignal,
}

impl<T: Clone + Send + Sync + 'static> FrameRateCalibrator<T> {
    pub fn new(
        buffer: Arc<RingBuffer<T>>,
        buffer_duration_secs: f64,
        config: &CalibrationConfig,
        signal: CancellationSignal,
    ) -> Self {
        Self {
            buffer,
            buffer_duration_secs,
            window: secs_to_duration(config.window_secs.max(0.001)),
            interval: config.interval_secs.map(|s| secs_to_duration(s.max(0.0))),
            measured: Arc::new(MeasuredRate::default()),
            signal,
        }
    }

    pub fn measured(&self) -> Arc<MeasuredRate> {
        Arc::clone(&self.measured)
    }

    /// Buffer capacity covering `duration_secs` at `fps`, or `None` for a stalled rate.
    pub fn capacity_for(fps: f64, duration_secs: f64) -> Option<usize> {
        if !(fps > 0.0) {
            return None;
        }
        let capacity = (fps * duration_secs).round();
        if !capacity.is_finite() || capacity > MAX_RING_CAPACITY as f64 {
            return Some(MAX_RING_CAPACITY);
        }
        let capacity = capacity as usize;
        (capacity > 0).then_some(capacity)
    }

    /// Count appends over one window. `None` if cancelled meanwhile.
    pub fn measure(&self) -> Option<f64> {
        let start_count = self.buffer.total_appended();
        let start = Instant::now();
        if self.signal.wait_timeout(self.window) {
            return None;
        }
        let frames = self.buffer.total_appended().saturating_sub(start_count);
        let elapsed = start.elapsed().as_secs_f64();
        Some(frames as f64 / elapsed)
    }

    /// Resize the buffer for a measured rate.
    pub fn apply(&self, fps: f64) -> Calibration {
        let old_capacity = self.buffer.capacity();
        match Self::capacity_for(fps, self.buffer_duration_secs) {
            Some(new_capacity) => {
                self.measured.set(fps);
                if new_capacity != old_capacity {
                    self.buffer.resize(new_capacity);
                }
                info!(
                    "calibrated video at {:.2} fps: capacity {} -> {}",
                    fps, old_capacity, new_capacity
                );
                Calibration::Resized {
                    fps,
                    old_capacity,
                    new_capacity,
                }
            }
            None => {
                warn!(
                    "video stalled ({:.2} fps measured), keeping capacity {}",
                    fps, old_capacity
                );
                Calibration::Skipped {
                    fps,
                    capacity: old_capacity,
                }
            }
        }
    }

    /// Measure and apply until cancelled, or once when no interval is set.
    pub fn run(self) {
        loop {
            let Some(fps) = self.measure() else {
                break;
            };
            self.apply(fps);

            match self.interval {
                None => break,
                Some(interval) => {
                    if self.signal.wait_timeout(interval) {
                        break;
                    }
                }
            }
        }
        debug!("frame-rate calibrator finished");
    }

    pub fn spawn(self) -> Result<JoinHandle<()>, CaptureError> {
        thread::Builder::new()
            .name("fps-calibrator".into())
            .spawn(move || self.run())
            .map_err(|e| CaptureError::Device(format!("failed to spawn calibrator thread: {}", e)))
    }
}

/// Seconds to a `Duration`, saturating at `MAX_CALIBRATION_SECS`.
fn secs_to_duration(secs: f64) -> Duration {
    let limit = Duration::from_secs_f64(MAX_CALIBRATION_SECS);
    Duration::try_from_secs_f64(secs).map_or(limit, |d| d.min(limit))
}

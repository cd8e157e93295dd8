use std::thread;
use std::time::{Duration, Instant};

/// Paces a producer to a target rate.
///
/// Call `begin()` before producing an item and `wait()` after. If producing
/// took longer than the interval, `wait()` returns immediately: the source
/// runs at whatever rate it can achieve rather than being throttled further.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    started: Option<Instant>,
}

impl FramePacer {
    pub fn new(target_fps: u32) -> Self {
        Self::with_interval(Duration::from_secs_f64(1.0 / target_fps.max(1) as f64))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self { interval, started: None }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Sleep out the rest of the current interval.
    pub fn wait(&mut self) {
        if let Some(started) = self.started.take() {
            let remaining = self.remaining(started.elapsed());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
    }

    /// Time left in the interval after `elapsed` of work.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.interval.saturating_sub(elapsed)
    }
}

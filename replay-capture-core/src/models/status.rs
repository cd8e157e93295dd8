use std::fmt;

use serde::Serialize;

use super::error::CaptureError;
use super::state::{ControllerState, LoopState};
use super::stream::StreamKind;

/// A capture loop gave up on its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFault {
    pub kind: StreamKind,
    pub error: CaptureError,
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stream stopped: {}", self.kind, self.error)
    }
}

/// Occupancy of one stream's buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatus {
    pub kind: StreamKind,
    pub len: usize,
    pub capacity: usize,
    pub seconds_buffered: f64,
    pub state: LoopState,
    pub total_captured: u64,
    pub last_error: Option<String>,
}

/// Snapshot of the whole recorder, as printed by the `status` action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecorderStatus {
    pub state: ControllerState,
    pub measured_fps: Option<f64>,
    pub streams: Vec<StreamStatus>,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<13} {:>6}/{:<6} {:>6.1}s  {:?}  captured={}",
            self.kind.to_string(),
            self.len,
            self.capacity,
            self.seconds_buffered,
            self.state,
            self.total_captured
        )?;
        if let Some(err) = &self.last_error {
            write!(f, "  last error: {}", err)?;
        }
        Ok(())
    }
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recorder {:?}", self.state)?;
        if let Some(fps) = self.measured_fps {
            write!(f, " (measured {:.1} fps)", fps)?;
        }
        for stream in &self.streams {
            write!(f, "\n  {}", stream)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lists_every_stream() {
        let status = RecorderStatus {
            state: ControllerState::Capturing,
            measured_fps: Some(29.7),
            streams: vec![
                StreamStatus {
                    kind: StreamKind::Video,
                    len: 20,
                    capacity: 1800,
                    seconds_buffered: 0.7,
                    state: LoopState::Running,
                    total_captured: 20,
                    last_error: None,
                },
                StreamStatus {
                    kind: StreamKind::Mic,
                    len: 0,
                    capacity: 2812,
                    seconds_buffered: 0.0,
                    state: LoopState::Stopped,
                    total_captured: 4,
                    last_error: Some("device error: unplugged".into()),
                },
            ],
        };

        let text = status.to_string();
        assert!(text.starts_with("recorder Capturing (measured 29.7 fps)"));
        assert!(text.contains("20/1800"));
        assert!(text.contains("last error: device error: unplugged"));
    }
}

use serde::Serialize;

/// Controller lifecycle.
///
/// ```text
/// idle → capturing ⇄ flushing
///            ↓          ↓
///         stopping → stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Capturing,
    Flushing,
    Stopping,
    Stopped,
}

impl ControllerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing | Self::Flushing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Capture loop lifecycle.
///
/// ```text
/// running → stopping → stopped
///     └──────────────────↑   (fatal device error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Running,
    Stopping,
    Stopped,
}

impl LoopState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

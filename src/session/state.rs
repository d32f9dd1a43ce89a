use serde::Serialize;

/// Lifecycle of one streaming session
///
/// ```text
/// idle → opening → running → stopping → closed
///          ↓
///        idle (open failed, everything released)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Opening,
    Running,
    Stopping,
    Closed,
}

impl SessionState {
    /// Opening or running; at most one such session per controller
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Opening | Self::Running)
    }
}

/// Why a session's loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Stop was requested
    Stopped,
    /// The capture device went away
    DeviceLost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(SessionState::Opening.is_active());
        assert!(SessionState::Running.is_active());
        assert!(!SessionState::Stopping.is_active());
        assert!(!SessionState::Idle.is_active());
        assert!(!SessionState::Closed.is_active());
    }
}

//! Coordinator state definitions.

use serde::{Deserialize, Serialize};

/// Coordinator operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorState {
    /// Built but not started; background tasks are not running.
    Starting,
    /// Accepting quotes and acceptances.
    Running,
    /// Stop requested, no new requests accepted.
    ShuttingDown,
    /// Background tasks cancelled.
    Stopped,
}

impl CoordinatorState {
    /// Check if the coordinator is accepting new requests.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, CoordinatorState::Running)
    }

    /// Check if the coordinator is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Stopped)
    }
}

//! The outer process lifecycle.
//!
//! ```text
//!                 ┌──────────── abort (start failed) ─────────────┐
//!                 │                                                ▼
//!  INITIALIZING ──┼──► RUNNING ◄──► ERROR                       STOPPED
//!                 │       │           │                            ▲
//!                 └───────┴───────────┴──► STOPPING ───────────────┘
//! ```
//!
//! The only way to skip STOPPING is the explicit abort edge taken when the
//! controller could not be started at all.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    Initializing,
    Running,
    Error,
    Stopping,
    Stopped,
}

impl ProcessState {
    /// Returns `true` when `self → next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Initializing, Running)
                | (Initializing, Stopping)
                | (Initializing, Stopped)
                | (Running, Error)
                | (Running, Stopping)
                | (Error, Running)
                | (Error, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ProcessState::Stopped
    }

    /// `true` once a stop has been requested (STOPPING or STOPPED).
    pub fn is_shutting_down(self) -> bool {
        matches!(self, ProcessState::Stopping | ProcessState::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Initializing => "INITIALIZING",
            ProcessState::Running => "RUNNING",
            ProcessState::Error => "ERROR",
            ProcessState::Stopping => "STOPPING",
            ProcessState::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal process transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: ProcessState,
    pub to: ProcessState,
}

/// Owns the current [`ProcessState`] and refuses edges outside the graph.
#[derive(Debug, Clone)]
pub struct ProcessMachine {
    state: ProcessState,
}

impl ProcessMachine {
    pub fn new() -> Self {
        Self {
            state: ProcessState::Initializing,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Moves to `next`, returning the previous state.
    pub fn transition(&mut self, next: ProcessState) -> Result<ProcessState, IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        let previous = self.state;
        self.state = next;
        Ok(previous)
    }
}

impl Default for ProcessMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProcessState::*;

    const ALL: [ProcessState; 5] = [Initializing, Running, Error, Stopping, Stopped];

    #[test]
    fn test_stopped_has_no_outgoing_edges() {
        for next in ALL {
            assert!(!Stopped.can_transition_to(next));
        }
    }

    #[test]
    fn test_running_and_error_alternate() {
        assert!(Running.can_transition_to(Error));
        assert!(Error.can_transition_to(Running));
    }

    #[test]
    fn test_running_cannot_skip_stopping() {
        assert!(!Running.can_transition_to(Stopped));
        assert!(!Error.can_transition_to(Stopped));
    }

    #[test]
    fn test_error_is_not_reachable_from_initializing() {
        assert!(!Initializing.can_transition_to(Error));
    }

    #[test]
    fn test_machine_rejects_illegal_edge_and_keeps_state() {
        // Arrange
        let mut machine = ProcessMachine::new();

        // Act
        let err = machine.transition(Error).unwrap_err();

        // Assert
        assert_eq!(err.from, Initializing);
        assert_eq!(err.to, Error);
        assert_eq!(machine.state(), Initializing);
    }

    #[test]
    fn test_machine_walks_full_lifecycle() {
        let mut machine = ProcessMachine::new();
        assert_eq!(machine.transition(Running), Ok(Initializing));
        assert_eq!(machine.transition(Error), Ok(Running));
        assert_eq!(machine.transition(Running), Ok(Error));
        assert_eq!(machine.transition(Stopping), Ok(Running));
        assert_eq!(machine.transition(Stopped), Ok(Stopping));
        assert!(machine.state().is_terminal());
    }
}

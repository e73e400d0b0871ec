//! Run state machine.
//!
//! `INIT → AUTHENTICATING → SEARCHING → PERSISTING → SUMMARIZING → {DONE, FAILED}`
//!
//! Only the edges listed in [`RunState::can_transition_to`] are legal. An
//! illegal transition is an orchestrator bug and surfaces as
//! [`SourcingError::Internal`].

use serde::{Deserialize, Serialize};

use sourcing_shared::{Result, SourcingError};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Authenticating,
    Searching,
    Persisting,
    Summarizing,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Authenticating => "authenticating",
            Self::Searching => "searching",
            Self::Persisting => "persisting",
            Self::Summarizing => "summarizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Legal edges of the run graph.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;

        matches!(
            (self, next),
            (Init, Authenticating)
                | (Authenticating, Searching)
                | (Authenticating, Failed)
                | (Searching, Persisting)
                | (Searching, Summarizing)
                | (Searching, Failed)
                | (Persisting, Persisting)
                | (Persisting, Summarizing)
                | (Summarizing, Done)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current state and the ordered trail of states visited.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: RunState,
    trail: Vec<RunState>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: RunState::Init,
            trail: vec![RunState::Init],
        }
    }

    pub fn current(&self) -> RunState {
        self.current
    }

    /// States visited so far, in order. Self-loops are not repeated.
    pub fn trail(&self) -> &[RunState] {
        &self.trail
    }

    pub fn into_trail(self) -> Vec<RunState> {
        self.trail
    }

    /// Move to `next`, rejecting edges that are not part of the run graph.
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(SourcingError::Internal(format!(
                "illegal state transition {} -> {next}",
                self.current
            )));
        }

        if next != self.current {
            self.trail.push(next);
        }
        self.current = next;
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

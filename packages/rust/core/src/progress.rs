//! Run progress callbacks.

use sourcing_shared::SaveOutcome;

use crate::state::RunState;
use crate::summary::RunSummary;

/// Observer of a run. Implementations must be cheap; they are called inline.
pub trait ProgressReporter: Send + Sync {
    /// The run entered `state`.
    fn state(&self, _state: RunState) {}

    /// One candidate reached its final outcome. `total` excludes skipped candidates.
    fn candidate_finished(&self, _outcome: &SaveOutcome, _finished: usize, _total: usize) {}

    /// The run produced its summary.
    fn done(&self, _summary: &RunSummary) {}
}

/// Reporter that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {}

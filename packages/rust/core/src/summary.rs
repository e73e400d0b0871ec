//! Run summary and outcome aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sourcing_shared::{ErrorKind, FailureDetail, RunId, SaveOutcome, SaveStatus, SourcingError};

use crate::state::RunState;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Failed,
}

/// Workflow stage, used to attribute a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Authenticate,
    Search,
    Persist,
}

/// Why a run ended `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(stage: Stage, err: &SourcingError) -> Self {
        Self {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Final report of one run; also the orchestrator's boundary response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub candidates_found: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Candidates a gate kept out of persistence.
    #[serde(default)]
    pub skipped: usize,
    /// Failed candidates in search-result order.
    pub failure_details: Vec<FailureDetail>,
    /// States traversed, `init` first.
    pub states: Vec<RunState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }

    /// `saved + duplicates + failed + skipped == candidates_found`.
    pub fn is_consistent(&self) -> bool {
        self.saved + self.duplicates + self.failed + self.skipped == self.candidates_found
    }
}

/// Per-status counts over a set of outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub saved: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub failure_details: Vec<FailureDetail>,
}

/// Count outcomes by status and collect failure details in input order.
pub fn tally(outcomes: &[SaveOutcome]) -> Tally {
    let mut tally = Tally::default();

    for outcome in outcomes {
        match outcome.status {
            SaveStatus::Saved => tally.saved += 1,
            SaveStatus::Duplicate => tally.duplicates += 1,
            SaveStatus::Failed => {
                tally.failed += 1;
                let detail = outcome.failure.clone().unwrap_or_else(|| FailureDetail {
                    candidate_id: outcome.candidate_id.clone(),
                    kind: ErrorKind::Internal,
                    message: "failed without detail".into(),
                });
                tally.failure_details.push(detail);
            }
        }
    }

    tally
}

//! Workflow orchestration for candidate sourcing.
//!
//! This crate ties the backend clients together into one run:
//! authenticate, search, persist every candidate through a bounded worker
//! pool with retry, and summarize the outcomes.

pub mod gate;
pub mod orchestrator;
pub mod persist;
pub mod policy;
pub mod progress;
pub mod state;
pub mod summary;

#[cfg(test)]
mod testing;

pub use gate::{AdmitAll, CandidateGate, Decision, MinimumExperience};
pub use orchestrator::WorkflowOrchestrator;
pub use policy::RetryPolicy;
pub use progress::{ProgressReporter, SilentProgress};
pub use state::{RunState, StateMachine};
pub use summary::{FailureReason, RunStatus, RunSummary, Stage};

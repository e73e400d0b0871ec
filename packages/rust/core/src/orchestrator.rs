//! The sourcing workflow: authenticate → search → persist×N → summarize.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use sourcing_clients::{AuthClient, PersistenceClient, RpcClients, SearchClient};
use sourcing_shared::{CredentialContext, ErrorKind, Result, RunId, SourcingError, WorkflowConfig};

use crate::gate::{AdmitAll, CandidateGate};
use crate::persist::{BatchContext, BatchResult, persist_batch};
use crate::policy::RetryPolicy;
use crate::progress::ProgressReporter;
use crate::state::{RunState, StateMachine};
use crate::summary::{FailureReason, RunStatus, RunSummary, Stage, tally};

/// Drives one run end to end against three backend capabilities.
///
/// The orchestrator holds no per-run state; every call to [`run`](Self::run)
/// is independent.
pub struct WorkflowOrchestrator {
    auth: Arc<dyn AuthClient>,
    search: Arc<dyn SearchClient>,
    storage: Arc<dyn PersistenceClient>,
    config: WorkflowConfig,
    gate: Arc<dyn CandidateGate>,
}

impl WorkflowOrchestrator {
    pub fn new(
        auth: Arc<dyn AuthClient>,
        search: Arc<dyn SearchClient>,
        storage: Arc<dyn PersistenceClient>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            auth,
            search,
            storage,
            config,
            gate: Arc::new(AdmitAll),
        }
    }

    /// Orchestrator over the JSON-RPC adapters.
    pub fn from_rpc(clients: RpcClients, config: WorkflowConfig) -> Self {
        Self::new(
            Arc::new(clients.auth),
            Arc::new(clients.search),
            Arc::new(clients.storage),
            config,
        )
    }

    /// Consult `gate` before persisting each candidate.
    pub fn with_gate(mut self, gate: impl CandidateGate + 'static) -> Self {
        self.gate = Arc::new(gate);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// Backend failures never surface as `Err`: authentication and search
    /// failures produce a `failed` summary, save failures are recorded per
    /// candidate. `Err` means the orchestrator itself broke an invariant.
    #[instrument(
        skip_all,
        fields(run_id = %ctx.run_id(), username = %ctx.credentials().username)
    )]
    pub async fn run(
        &self,
        ctx: CredentialContext,
        cancel: CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let mut run = RunTracker::new(ctx.run_id(), progress);

        run.enter(RunState::Authenticating)?;
        let authenticated = self
            .call_stage(
                "authenticate",
                &cancel,
                self.auth.authenticate(ctx.run_id(), ctx.credentials()),
            )
            .await
            .and_then(|token| {
                if token.is_issued_for(ctx.run_id()) {
                    Ok(token)
                } else {
                    Err(SourcingError::Internal(format!(
                        "session token issued for run {}",
                        token.run_id()
                    )))
                }
            });
        let token = match authenticated {
            Ok(token) => Arc::new(token),
            Err(err) => return run.fail(Stage::Authenticate, &err),
        };
        info!("authenticated");

        run.enter(RunState::Searching)?;
        let candidates = match self
            .call_stage("search", &cancel, self.search.search(&token, ctx.filter()))
            .await
        {
            Ok(candidates) => candidates,
            Err(err) => return run.fail(Stage::Search, &err),
        };
        let found = candidates.len();
        info!(
            candidates_found = found,
            title = ctx.filter().title(),
            "search complete"
        );

        let batch = if candidates.is_empty() {
            BatchResult::default()
        } else {
            run.enter(RunState::Persisting)?;
            let batch_ctx = BatchContext {
                storage: self.storage.clone(),
                token,
                retry: RetryPolicy::from(&self.config),
                call_timeout: self.config.call_timeout,
                concurrency: self.config.concurrency,
                cancel: cancel.clone(),
            };
            persist_batch(&batch_ctx, candidates, self.gate.as_ref(), progress).await
        };

        run.enter(RunState::Summarizing)?;
        let summary = run.finish(found, batch)?;
        if !summary.is_consistent() {
            return Err(SourcingError::Internal(format!(
                "summary counts do not add up to {} candidates",
                summary.candidates_found
            )));
        }
        Ok(summary)
    }

    /// Await one auth/search call under the per-call deadline, giving up early
    /// on cancellation.
    async fn call_stage<T>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let deadline = self.config.call_timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(SourcingError::Cancelled(format!("run cancelled during {operation}")))
            }
            result = tokio::time::timeout(deadline, call) => {
                result.unwrap_or(Err(SourcingError::Timeout { operation, after: deadline }))
            }
        }
    }
}

/// Per-run bookkeeping: state trail, timing, progress fan-out.
struct RunTracker<'a> {
    run_id: RunId,
    machine: StateMachine,
    progress: &'a dyn ProgressReporter,
    started_at: DateTime<Utc>,
}

impl<'a> RunTracker<'a> {
    fn new(run_id: RunId, progress: &'a dyn ProgressReporter) -> Self {
        Self {
            run_id,
            machine: StateMachine::new(),
            progress,
            started_at: Utc::now(),
        }
    }

    fn enter(&mut self, state: RunState) -> Result<()> {
        self.machine.advance(state)?;
        self.progress.state(state);
        if state.is_terminal() {
            debug!(trail = ?self.machine.trail(), "run finished");
        }
        Ok(())
    }

    fn fail(mut self, stage: Stage, err: &SourcingError) -> Result<RunSummary> {
        warn!(
            stage = ?stage,
            state = %self.machine.current(),
            error = %err,
            "run failed"
        );
        self.enter(RunState::Failed)?;

        let summary = RunSummary {
            run_id: self.run_id,
            status: RunStatus::Failed,
            failure_reason: Some(FailureReason::new(stage, err)),
            candidates_found: 0,
            saved: 0,
            duplicates: 0,
            failed: 0,
            skipped: 0,
            failure_details: Vec::new(),
            states: self.machine.into_trail(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        };
        self.progress.done(&summary);
        Ok(summary)
    }

    fn finish(mut self, found: usize, batch: BatchResult) -> Result<RunSummary> {
        let counts = tally(&batch.outcomes);
        self.enter(RunState::Done)?;

        let cancelled = counts
            .failure_details
            .iter()
            .any(|d| d.kind == ErrorKind::Cancelled);
        let failure_reason = cancelled.then(|| FailureReason {
            stage: Stage::Persist,
            kind: ErrorKind::Cancelled,
            message: "run cancelled during persistence".into(),
        });

        let summary = RunSummary {
            run_id: self.run_id,
            status: RunStatus::Done,
            failure_reason,
            candidates_found: found,
            saved: counts.saved,
            duplicates: counts.duplicates,
            failed: counts.failed,
            skipped: batch.skipped,
            failure_details: counts.failure_details,
            states: self.machine.into_trail(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        };

        info!(
            candidates_found = summary.candidates_found,
            saved = summary.saved,
            duplicates = summary.duplicates,
            failed = summary.failed,
            skipped = summary.skipped,
            "run complete"
        );
        self.progress.done(&summary);
        Ok(summary)
    }
}

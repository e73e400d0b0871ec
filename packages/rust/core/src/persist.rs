//! Bounded, isolated persistence of one search batch.
//!
//! Each admitted candidate gets its own task; a semaphore caps how many are
//! talking to the storage backend at once. A failing worker only affects its
//! own outcome slot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sourcing_clients::{PersistenceClient, SaveAck};
use sourcing_shared::{CandidateRecord, ErrorKind, SaveOutcome, SessionToken, SourcingError};

use crate::gate::{CandidateGate, Decision};
use crate::policy::RetryPolicy;
use crate::progress::ProgressReporter;

/// Everything a persistence worker needs, shared read-only across workers.
#[derive(Clone)]
pub struct BatchContext {
    pub storage: Arc<dyn PersistenceClient>,
    pub token: Arc<SessionToken>,
    pub retry: RetryPolicy,
    pub call_timeout: Duration,
    pub concurrency: usize,
    pub cancel: CancellationToken,
}

/// Outcomes in search-result order, plus the number of gated-out candidates.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub outcomes: Vec<SaveOutcome>,
    pub skipped: usize,
}

/// Persist `candidates`, producing exactly one outcome per admitted candidate.
pub async fn persist_batch(
    ctx: &BatchContext,
    candidates: Vec<CandidateRecord>,
    gate: &dyn CandidateGate,
    progress: &dyn ProgressReporter,
) -> BatchResult {
    let mut admitted = Vec::with_capacity(candidates.len());
    let mut skipped = 0;
    for candidate in candidates {
        match gate.admit(&candidate) {
            Decision::Proceed => admitted.push(candidate),
            Decision::Skip { reason } => {
                debug!(candidate_id = %candidate.id, %reason, "candidate skipped");
                skipped += 1;
            }
        }
    }

    let total = admitted.len();
    let semaphore = Arc::new(Semaphore::new(ctx.concurrency.max(1)));
    let mut ids = Vec::with_capacity(total);
    let mut tasks = JoinSet::new();

    for (index, candidate) in admitted.into_iter().enumerate() {
        ids.push(candidate.id.clone());
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();

        tasks.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };
            let outcome = match permit {
                Some(_permit) => persist_one(&ctx, &candidate).await,
                None => cancelled(&candidate.id, 0, None),
            };
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<SaveOutcome>> = vec![None; total];
    let mut finished = 0;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => {
                finished += 1;
                progress.candidate_finished(&outcome, finished, total);
                slots[index] = Some(outcome);
            }
            Err(err) => warn!(error = %err, "persistence worker aborted"),
        }
    }

    // A worker that panicked leaves its slot empty.
    let outcomes = slots
        .into_iter()
        .zip(ids)
        .map(|(slot, id)| {
            slot.unwrap_or_else(|| {
                SaveOutcome::failed(id, 0, ErrorKind::Internal, "persistence worker aborted")
            })
        })
        .collect();

    BatchResult { outcomes, skipped }
}

/// Save one candidate, retrying transient failures with backoff.
async fn persist_one(ctx: &BatchContext, candidate: &CandidateRecord) -> SaveOutcome {
    let mut attempts = 0;
    let mut last_error: Option<SourcingError> = None;

    if let Err(err) = candidate.check_complete() {
        warn!(candidate_id = %candidate.id, error = %err, "record not sent to storage");
        return SaveOutcome::from_error(&candidate.id, attempts, &err);
    }

    loop {
        if ctx.cancel.is_cancelled() {
            return cancelled(&candidate.id, attempts, last_error.as_ref());
        }

        attempts += 1;
        let result = tokio::time::timeout(ctx.call_timeout, ctx.storage.save(&ctx.token, candidate))
            .await
            .unwrap_or(Err(SourcingError::Timeout {
                operation: "save",
                after: ctx.call_timeout,
            }));

        match result {
            Ok(SaveAck::Saved) => {
                debug!(candidate_id = %candidate.id, attempts, "saved");
                return SaveOutcome::saved(&candidate.id, attempts);
            }
            Ok(SaveAck::Duplicate) => {
                debug!(candidate_id = %candidate.id, attempts, "already stored");
                return SaveOutcome::duplicate(&candidate.id, attempts);
            }
            Err(err) if err.is_retryable() && ctx.retry.allows_retry(attempts) => {
                let delay = ctx.retry.delay_for(attempts);
                warn!(
                    candidate_id = %candidate.id,
                    attempt = attempts,
                    max_attempts = ctx.retry.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "save failed, retrying"
                );
                last_error = Some(err);

                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => {
                        return cancelled(&candidate.id, attempts, last_error.as_ref());
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => {
                warn!(candidate_id = %candidate.id, attempts, error = %err, "save failed");
                return SaveOutcome::from_error(&candidate.id, attempts, &err);
            }
        }
    }
}

fn cancelled(candidate_id: &str, attempts: u32, last_error: Option<&SourcingError>) -> SaveOutcome {
    let message = match last_error {
        Some(err) => format!("cancelled before retry: {err}"),
        None => "cancelled".to_string(),
    };
    SaveOutcome::failed(candidate_id, attempts, ErrorKind::Cancelled, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{AdmitAll, MinimumExperience};
    use crate::progress::SilentProgress;
    use crate::testing::{FakeStorage, Step, candidate, candidates};
    use sourcing_shared::{RunId, SaveStatus};

    fn context(storage: Arc<FakeStorage>, concurrency: usize) -> BatchContext {
        BatchContext {
            storage,
            token: Arc::new(SessionToken::new("tok", RunId::new())),
            retry: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            call_timeout: Duration::from_secs(5),
            concurrency,
            cancel: CancellationToken::new(),
        }
    }

    async fn run(ctx: &BatchContext, ids: &[&str]) -> BatchResult {
        persist_batch(ctx, candidates(ids), &AdmitAll, &SilentProgress).await
    }

    fn statuses(result: &BatchResult) -> Vec<(&str, SaveStatus)> {
        result
            .outcomes
            .iter()
            .map(|o| (o.candidate_id.as_str(), o.status))
            .collect()
    }

    #[tokio::test]
    async fn one_outcome_per_candidate_in_search_order() {
        let storage = Arc::new(FakeStorage::with_delay(Duration::from_millis(5)).with_stored(&["c2"]));
        let ctx = context(storage, 3);

        let result = run(&ctx, &["c1", "c2", "c3", "c4"]).await;

        assert_eq!(
            statuses(&result),
            [
                ("c1", SaveStatus::Saved),
                ("c2", SaveStatus::Duplicate),
                ("c3", SaveStatus::Saved),
                ("c4", SaveStatus::Saved),
            ]
        );
        assert_eq!(result.skipped, 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let storage =
            Arc::new(FakeStorage::new().script("c1", &[Step::Transient, Step::Transient]));
        let ctx = context(storage.clone(), 2);

        let result = run(&ctx, &["c1"]).await;

        assert_eq!(result.outcomes[0].status, SaveStatus::Saved);
        assert_eq!(result.outcomes[0].attempts, 3);
        assert_eq!(storage.calls_for("c1"), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_only_that_candidate() {
        let storage = Arc::new(FakeStorage::new().script("c2", &[Step::Transient; 10]));
        let ctx = context(storage.clone(), 2);

        let result = run(&ctx, &["c1", "c2", "c3"]).await;

        let failed = &result.outcomes[1];
        assert_eq!(failed.status, SaveStatus::Failed);
        assert_eq!(failed.attempts, 4);
        assert_eq!(failed.failure.as_ref().unwrap().kind, ErrorKind::TransientSave);
        assert_eq!(storage.calls_for("c2"), 4);
        assert_eq!(result.outcomes[0].status, SaveStatus::Saved);
        assert_eq!(result.outcomes[2].status, SaveStatus::Saved);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let storage = Arc::new(FakeStorage::new().script("c1", &[Step::Permanent]));
        let ctx = context(storage.clone(), 1);

        let result = run(&ctx, &["c1"]).await;

        let outcome = &result.outcomes[0];
        assert_eq!(outcome.status, SaveStatus::Failed);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.failure.as_ref().unwrap().kind, ErrorKind::PermanentSave);
        assert_eq!(storage.calls_for("c1"), 1);
    }

    #[tokio::test]
    async fn hung_save_times_out_and_is_retried() {
        let storage = Arc::new(FakeStorage::new().script("c1", &[Step::Hang]));
        let mut ctx = context(storage.clone(), 1);
        ctx.call_timeout = Duration::from_millis(30);

        let result = run(&ctx, &["c1"]).await;

        assert_eq!(result.outcomes[0].status, SaveStatus::Saved);
        assert_eq!(result.outcomes[0].attempts, 2);
        assert_eq!(storage.max_in_flight(), 1);
        assert_eq!(storage.in_flight(), 0, "abandoned call released its slot");
    }

    #[tokio::test]
    async fn panicking_worker_fails_only_its_candidate() {
        let storage = Arc::new(FakeStorage::new().script("c2", &[Step::Panic]));
        let ctx = context(storage.clone(), 2);

        let result = run(&ctx, &["c1", "c2", "c3"]).await;

        assert_eq!(
            statuses(&result),
            [
                ("c1", SaveStatus::Saved),
                ("c2", SaveStatus::Failed),
                ("c3", SaveStatus::Saved),
            ]
        );
        let failure = result.outcomes[1].failure.as_ref().unwrap();
        assert_eq!(failure.kind, ErrorKind::Internal);
        assert_eq!(failure.message, "persistence worker aborted");
        assert_eq!(storage.in_flight(), 0);
    }

    #[tokio::test]
    async fn incomplete_record_fails_without_storage_call() {
        let storage = Arc::new(FakeStorage::new());
        let ctx = context(storage.clone(), 2);
        let mut records = candidates(&["c1", "c2"]);
        records[1].title = "  ".into();

        let result = persist_batch(&ctx, records, &AdmitAll, &SilentProgress).await;

        assert_eq!(
            statuses(&result),
            [("c1", SaveStatus::Saved), ("c2", SaveStatus::Failed)]
        );
        let outcome = &result.outcomes[1];
        assert_eq!(outcome.attempts, 0);
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.kind, ErrorKind::PermanentSave);
        assert!(failure.message.contains("missing title"));
        assert_eq!(storage.calls_for("c2"), 0);
    }

    #[tokio::test]
    async fn pool_size_bounds_in_flight_saves() {
        let storage = Arc::new(FakeStorage::with_delay(Duration::from_millis(20)));
        let ctx = context(storage.clone(), 2);

        let result = run(&ctx, &["c1", "c2", "c3", "c4", "c5", "c6"]).await;

        assert_eq!(result.outcomes.len(), 6);
        assert!(storage.max_in_flight() <= 2);
        assert_eq!(storage.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn gate_skips_without_calling_storage() {
        let storage = Arc::new(FakeStorage::new());
        let ctx = context(storage.clone(), 2);
        let mut records = candidates(&["c1", "c2"]);
        records[1].experience = Some("1 year".into());

        let result =
            persist_batch(&ctx, records, &MinimumExperience::new(3.0), &SilentProgress).await;

        assert_eq!(result.skipped, 1);
        assert_eq!(statuses(&result), [("c1", SaveStatus::Saved)]);
        assert_eq!(storage.calls_for("c2"), 0);
    }

    #[tokio::test]
    async fn cancellation_stops_queued_candidates() {
        let storage = Arc::new(FakeStorage::with_delay(Duration::from_millis(100)));
        let ctx = context(storage.clone(), 1);
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        });

        let result = run(&ctx, &["c1", "c2", "c3"]).await;

        assert_eq!(result.outcomes.len(), 3);
        let saved = result
            .outcomes
            .iter()
            .filter(|o| o.status == SaveStatus::Saved)
            .count();
        assert_eq!(saved, 1, "the in-flight save completes");

        let cancelled: Vec<_> = result
            .outcomes
            .iter()
            .filter(|o| o.status == SaveStatus::Failed)
            .collect();
        assert_eq!(cancelled.len(), 2);
        for outcome in cancelled {
            assert_eq!(outcome.attempts, 0);
            let failure = outcome.failure.as_ref().unwrap();
            assert_eq!(failure.kind, ErrorKind::Cancelled);
            assert_eq!(failure.message, "cancelled");
        }
        assert_eq!(storage.total_calls(), 1);
    }

    #[tokio::test]
    async fn cancellation_abandons_pending_retry() {
        let storage = Arc::new(FakeStorage::new().script("c1", &[Step::Transient; 4]));
        let mut ctx = context(storage.clone(), 1);
        ctx.retry.base_delay = Duration::from_secs(30);
        ctx.retry.max_delay = Duration::from_secs(30);
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        });

        let result = persist_batch(&ctx, vec![candidate("c1")], &AdmitAll, &SilentProgress).await;

        let outcome = &result.outcomes[0];
        assert_eq!(outcome.status, SaveStatus::Failed);
        assert_eq!(outcome.attempts, 1);
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.kind, ErrorKind::Cancelled);
        assert!(failure.message.contains("backend unavailable"));
        assert_eq!(storage.calls_for("c1"), 1);
    }
}

//! In-memory backends for orchestrator tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use sourcing_clients::{AuthClient, PersistenceClient, SaveAck, SearchClient};
use sourcing_shared::{
    CandidateRecord, Credentials, Result, RunId, SearchFilter, SessionToken, SourcingError,
};

pub(crate) fn candidate(id: &str) -> CandidateRecord {
    CandidateRecord {
        id: id.into(),
        name: format!("Candidate {id}"),
        title: "Backend Engineer".into(),
        skills: vec!["Go".into(), "Kubernetes".into()],
        source_ref: Some(format!("https://profiles.example.com/{id}")),
        experience: Some("6 years".into()),
    }
}

pub(crate) fn candidates(ids: &[&str]) -> Vec<CandidateRecord> {
    ids.iter().map(|id| candidate(id)).collect()
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeAuth {
    pub reject: bool,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeAuth {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthClient for FakeAuth {
    async fn authenticate(&self, run_id: RunId, credentials: &Credentials) -> Result<SessionToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.reject || credentials.secret.expose() != "s3cret" {
            return Err(SourcingError::Auth("invalid credentials".into()));
        }
        Ok(SessionToken::new(format!("tok-{}", credentials.username), run_id))
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeSearch {
    pub results: Vec<CandidateRecord>,
    pub fail: bool,
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub seen_token: Mutex<Option<String>>,
}

impl FakeSearch {
    pub fn returning(results: Vec<CandidateRecord>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchClient for FakeSearch {
    async fn search(
        &self,
        token: &SessionToken,
        _filter: &SearchFilter,
    ) -> Result<Vec<CandidateRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_token.lock().unwrap() = Some(token.as_str().to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(SourcingError::Search("invalid token".into()));
        }
        Ok(self.results.clone())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Scripted response for one `save` call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Transient,
    Permanent,
    Hang,
    Panic,
}

/// Holds one in-flight slot until dropped, so an abandoned or panicking
/// call still releases it.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, high_water: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        high_water.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Stores records in memory. Unscripted calls save, or report a duplicate
/// when the identifier is already stored.
#[derive(Default)]
pub(crate) struct FakeStorage {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    stored: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub delay: Duration,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_stored(self, ids: &[&str]) -> Self {
        self.stored
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| id.to_string()));
        self
    }

    pub fn script(self, id: &str, steps: &[Step]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), steps.iter().copied().collect());
        self
    }

    pub fn calls_for(&self, id: &str) -> u32 {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_stored(&self, id: &str) -> bool {
        self.stored.lock().unwrap().contains(id)
    }
}

#[async_trait]
impl PersistenceClient for FakeStorage {
    async fn save(&self, _token: &SessionToken, candidate: &CandidateRecord) -> Result<SaveAck> {
        let _slot = InFlight::enter(&self.in_flight, &self.max_in_flight);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(candidate.id.clone())
            .or_default() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&candidate.id)
            .and_then(VecDeque::pop_front);

        let result = match step {
            Some(Step::Transient) => Err(SourcingError::TransientSave("backend unavailable".into())),
            Some(Step::Permanent) => Err(SourcingError::PermanentSave("record rejected".into())),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SourcingError::Internal("hang elapsed".into()))
            }
            Some(Step::Panic) => panic!("storage worker crashed on {}", candidate.id),
            None => {
                if self.stored.lock().unwrap().insert(candidate.id.clone()) {
                    Ok(SaveAck::Saved)
                } else {
                    Ok(SaveAck::Duplicate)
                }
            }
        };

        result
    }
}

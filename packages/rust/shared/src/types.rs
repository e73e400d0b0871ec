//! Core domain types for a sourcing run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, Result, SourcingError};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Operator secret. Redacted in `Debug`, never serialized.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw secret. Only the auth adapter should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Operator identity used to open a session.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub secret: Secret,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Secret::new(secret),
        }
    }
}

// ---------------------------------------------------------------------------
// SearchFilter
// ---------------------------------------------------------------------------

/// Sourcing criteria: a job title and a de-duplicated set of skills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchFilter {
    title: String,
    skills: Vec<String>,
}

impl SearchFilter {
    /// Build a filter. The title is trimmed and must be non-empty; skills are
    /// trimmed, blanks dropped, and case-insensitive duplicates removed while
    /// keeping first-seen order.
    pub fn new<I, S>(title: impl Into<String>, skills: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(SourcingError::validation("search title must not be empty"));
        }

        let mut deduped: Vec<String> = Vec::new();
        for skill in skills {
            let skill = skill.into().trim().to_string();
            if skill.is_empty() {
                continue;
            }
            if !deduped.iter().any(|s| s.eq_ignore_ascii_case(&skill)) {
                deduped.push(skill);
            }
        }

        Ok(Self {
            title,
            skills: deduped,
        })
    }

    /// Split a comma-separated skill string (`"Go, Distributed Systems"`).
    pub fn parse_skills(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn skills(&self) -> &[String] {
        &self.skills
    }
}

// ---------------------------------------------------------------------------
// CredentialContext
// ---------------------------------------------------------------------------

/// Immutable input of one run: who is asking and what to look for.
///
/// Not `Clone`: a context belongs to exactly one run and is dropped with it.
#[derive(Debug)]
pub struct CredentialContext {
    run_id: RunId,
    credentials: Credentials,
    filter: SearchFilter,
}

impl CredentialContext {
    pub fn new(credentials: Credentials, filter: SearchFilter) -> Self {
        Self {
            run_id: RunId::new(),
            credentials,
            filter,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn filter(&self) -> &SearchFilter {
        &self.filter
    }
}

// ---------------------------------------------------------------------------
// SessionToken
// ---------------------------------------------------------------------------

/// Proof of authentication, bound to the run that obtained it.
pub struct SessionToken {
    value: String,
    run_id: RunId,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, run_id: RunId) -> Self {
        Self {
            value: value.into(),
            run_id,
        }
    }

    /// Raw token for the wire. Never log this.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn is_issued_for(&self, run_id: RunId) -> bool {
        self.run_id == run_id
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"***")
            .field("run_id", &self.run_id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CandidateRecord
// ---------------------------------------------------------------------------

/// One sourced person as returned by the search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Unique within one search result batch.
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub skills: Vec<String>,
    /// Where the search backend found this person (profile URL, crawler ref).
    #[serde(
        default,
        alias = "source-ref",
        alias = "sourceRef",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_ref: Option<String>,
    /// Free-text experience, e.g. `"6 years"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
}

impl CandidateRecord {
    /// Reject a record the storage backend cannot accept: blank id, name or
    /// title, or no non-blank skill.
    pub fn check_complete(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("id", self.id.trim().is_empty()),
            ("name", self.name.trim().is_empty()),
            ("title", self.title.trim().is_empty()),
            ("skills", self.skills.iter().all(|s| s.trim().is_empty())),
        ]
        .into_iter()
        .filter_map(|(field, blank)| blank.then_some(field))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SourcingError::PermanentSave(format!(
                "incomplete record: missing {}",
                missing.join(", ")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Save outcomes
// ---------------------------------------------------------------------------

/// Terminal status of one candidate's persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    Saved,
    Duplicate,
    Failed,
}

/// Why a candidate ended up `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub candidate_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of persisting one candidate. Exactly one per attempted candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub candidate_id: String,
    pub status: SaveStatus,
    /// Number of `save` calls issued for this candidate (0 if never started).
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
}

impl SaveOutcome {
    pub fn saved(candidate_id: impl Into<String>, attempts: u32) -> Self {
        Self::succeeded(candidate_id, SaveStatus::Saved, attempts)
    }

    pub fn duplicate(candidate_id: impl Into<String>, attempts: u32) -> Self {
        Self::succeeded(candidate_id, SaveStatus::Duplicate, attempts)
    }

    pub fn failed(
        candidate_id: impl Into<String>,
        attempts: u32,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        let candidate_id = candidate_id.into();
        Self {
            failure: Some(FailureDetail {
                candidate_id: candidate_id.clone(),
                kind,
                message: message.into(),
            }),
            candidate_id,
            status: SaveStatus::Failed,
            attempts,
        }
    }

    pub fn from_error(candidate_id: impl Into<String>, attempts: u32, err: &SourcingError) -> Self {
        Self::failed(candidate_id, attempts, err.kind(), err.to_string())
    }

    fn succeeded(candidate_id: impl Into<String>, status: SaveStatus, attempts: u32) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            status,
            attempts,
            failure: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RunRequest
// ---------------------------------------------------------------------------

/// Skills as either a JSON array or a comma-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SkillList {
    List(Vec<String>),
    Csv(String),
}

impl SkillList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(skills) => skills,
            Self::Csv(raw) => SearchFilter::parse_skills(&raw),
        }
    }
}

impl Default for SkillList {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

/// The orchestrator's boundary request: `{username, secret, title, skills}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub username: String,
    #[serde(alias = "password")]
    pub secret: Secret,
    pub title: String,
    #[serde(default)]
    pub skills: SkillList,
}

impl RunRequest {
    /// Validate the request and turn it into a fresh run context.
    pub fn into_context(self) -> Result<CredentialContext> {
        let username = self.username.trim().to_string();
        if username.is_empty() {
            return Err(SourcingError::validation("username must not be empty"));
        }

        let filter = SearchFilter::new(self.title, self.skills.into_vec())?;
        let credentials = Credentials {
            username,
            secret: self.secret,
        };

        Ok(CredentialContext::new(credentials, filter))
    }
}

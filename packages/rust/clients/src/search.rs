//! Candidate-search backend adapter (`search_candidates`).
//!
//! The backend may answer with a bare array or with a page object carrying a
//! `next_cursor`. Pages are followed until the cursor runs out, so callers
//! always receive one complete snapshot.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use sourcing_shared::{CandidateRecord, Result, SearchFilter, SessionToken, SourcingError};

use crate::SearchClient;
use crate::rpc::{RpcClient, RpcError};

/// Upper bound on followed pages; a backend that keeps returning cursors past
/// this is treated as broken.
const MAX_PAGES: usize = 100;

#[derive(Serialize)]
struct SearchParams<'a> {
    token: &'a str,
    title: &'a str,
    skills: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchPage {
    Bare(Vec<CandidateRecord>),
    Paged {
        candidates: Vec<CandidateRecord>,
        #[serde(default)]
        next_cursor: Option<String>,
    },
}

/// [`SearchClient`] over JSON-RPC.
#[derive(Debug)]
pub struct RpcSearchClient {
    rpc: RpcClient,
}

impl RpcSearchClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn endpoint(&self) -> &Url {
        self.rpc.endpoint()
    }
}

#[async_trait]
impl SearchClient for RpcSearchClient {
    #[instrument(skip_all, fields(title = %filter.title(), skills = filter.skills().len()))]
    async fn search(
        &self,
        token: &SessionToken,
        filter: &SearchFilter,
    ) -> Result<Vec<CandidateRecord>> {
        let mut candidates: Vec<CandidateRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;

        for page_no in 1..=MAX_PAGES {
            let params = SearchParams {
                token: token.as_str(),
                title: filter.title(),
                skills: filter.skills(),
                cursor: cursor.as_deref(),
            };

            let page: SearchPage = self
                .rpc
                .call("search_candidates", &params)
                .await
                .map_err(|e| map_rpc_error(e, &self.rpc))?;

            let (batch, next) = match page {
                SearchPage::Bare(batch) => (batch, None),
                SearchPage::Paged {
                    candidates,
                    next_cursor,
                } => (candidates, next_cursor.filter(|c| !c.is_empty())),
            };

            debug!(page = page_no, received = batch.len(), "search page");

            for candidate in batch {
                if seen.insert(candidate.id.clone()) {
                    candidates.push(candidate);
                } else {
                    warn!(candidate_id = %candidate.id, "dropping duplicate candidate id");
                }
            }

            match next {
                Some(next) => cursor = Some(next),
                None => {
                    info!(found = candidates.len(), pages = page_no, "search complete");
                    return Ok(candidates);
                }
            }
        }

        Err(SourcingError::Search(format!(
            "search backend returned more than {MAX_PAGES} pages"
        )))
    }
}

fn map_rpc_error(err: RpcError, rpc: &RpcClient) -> SourcingError {
    match err {
        RpcError::TimedOut { .. } => SourcingError::Timeout {
            operation: "search",
            after: rpc.timeout(),
        },
        other => SourcingError::Search(other.to_string()),
    }
}

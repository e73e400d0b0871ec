//! Agent registry adapter (`get_agent`).
//!
//! A registry maps agent names to their current JSON-RPC endpoint, so the
//! backends can move without reconfiguring the orchestrator.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use sourcing_shared::{Result, SourcingError};

use crate::rpc::RpcClient;

/// Registry name of the identity service.
pub const AUTH_AGENT: &str = "auth_agent";
/// Registry name of the candidate-search service.
pub const SEARCH_AGENT: &str = "webservice_agent";
/// Registry name of the storage service.
pub const STORAGE_AGENT: &str = "dbservice_agent";

#[derive(Serialize)]
struct GetAgentParams<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct AgentCard {
    #[serde(default)]
    url: Option<String>,
}

/// Resolves agent names to endpoints, caching each answer.
#[derive(Debug)]
pub struct RegistryClient {
    rpc: RpcClient,
    resolved: Mutex<HashMap<String, String>>,
}

impl RegistryClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            rpc,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Endpoint currently registered for `name`.
    #[instrument(skip(self))]
    pub async fn resolve(&self, name: &str) -> Result<String> {
        if let Some(url) = self.cached(name) {
            return Ok(url);
        }

        let card: AgentCard = self
            .rpc
            .call("get_agent", &GetAgentParams { name })
            .await
            .map_err(|e| SourcingError::config(format!("registry lookup for {name} failed: {e}")))?;

        let url = card
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| SourcingError::config(format!("registry has no URL for {name}")))?;

        debug!(%url, "agent resolved");
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), url.clone());
        Ok(url)
    }

    fn cached(&self, name: &str) -> Option<String> {
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

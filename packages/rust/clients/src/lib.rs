//! Backend capabilities used by the sourcing workflow.
//!
//! This crate provides:
//! - [`AuthClient`], [`SearchClient`], [`PersistenceClient`]: the call
//!   contracts the orchestrator depends on
//! - [`rpc`]: JSON-RPC 2.0 transport shared by the HTTP adapters
//! - [`RpcAuthClient`], [`RpcSearchClient`], [`RpcPersistenceClient`]: thin
//!   adapters, one remote call per invocation
//! - [`RegistryClient`]: optional name-to-endpoint lookup for the adapters

pub mod auth;
pub mod registry;
pub mod rpc;
pub mod search;
pub mod storage;

use std::time::Duration;

use async_trait::async_trait;

use sourcing_shared::{
    CandidateRecord, Credentials, Result, RunId, SearchFilter, ServicesConfig, SessionToken,
};

pub use auth::RpcAuthClient;
pub use registry::RegistryClient;
pub use rpc::{RpcClient, RpcError};
pub use search::RpcSearchClient;
pub use storage::RpcPersistenceClient;

// ---------------------------------------------------------------------------
// Call contracts
// ---------------------------------------------------------------------------

/// Exchanges operator credentials for a session token.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Fails with `Auth` (or `Timeout`) on rejection or unreachable backend.
    /// The returned token is stamped with `run_id`.
    async fn authenticate(&self, run_id: RunId, credentials: &Credentials) -> Result<SessionToken>;
}

/// Exchanges a token and filter for one snapshot of matching candidates.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Returns every page of results; identifiers are unique in the returned batch.
    async fn search(
        &self,
        token: &SessionToken,
        filter: &SearchFilter,
    ) -> Result<Vec<CandidateRecord>>;
}

/// Backend acknowledgement of a successful save call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAck {
    /// The record was stored.
    Saved,
    /// The backend already held this candidate identifier.
    Duplicate,
}

/// Persists one candidate record.
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    /// Fails with `TransientSave`/`Timeout` (retryable) or `PermanentSave`.
    async fn save(&self, token: &SessionToken, candidate: &CandidateRecord) -> Result<SaveAck>;
}

// ---------------------------------------------------------------------------
// Construction from config
// ---------------------------------------------------------------------------

/// The three HTTP adapters built from one `[services]` section.
#[derive(Debug)]
pub struct RpcClients {
    pub auth: RpcAuthClient,
    pub search: RpcSearchClient,
    pub storage: RpcPersistenceClient,
}

impl RpcClients {
    pub fn from_config(services: &ServicesConfig, call_timeout: Duration) -> Result<Self> {
        let rpc = |url: &str, role: &str| {
            RpcClient::new(url, format!("{}-{role}", services.request_id), call_timeout)
        };

        Ok(Self {
            auth: RpcAuthClient::new(rpc(&services.auth_url, "auth")?),
            search: RpcSearchClient::new(rpc(&services.search_url, "search")?),
            storage: RpcPersistenceClient::new(rpc(&services.storage_url, "storage")?),
        })
    }

    /// Like [`from_config`](Self::from_config), but when `registry_url` is
    /// set the three endpoints are looked up in the registry first.
    pub async fn resolve(services: &ServicesConfig, call_timeout: Duration) -> Result<Self> {
        let Some(registry_url) = &services.registry_url else {
            return Self::from_config(services, call_timeout);
        };

        let registry = RegistryClient::new(RpcClient::new(
            registry_url,
            format!("{}-registry", services.request_id),
            call_timeout,
        )?);

        let resolved = ServicesConfig {
            auth_url: registry.resolve(registry::AUTH_AGENT).await?,
            search_url: registry.resolve(registry::SEARCH_AGENT).await?,
            storage_url: registry.resolve(registry::STORAGE_AGENT).await?,
            request_id: services.request_id.clone(),
            registry_url: None,
        };
        Self::from_config(&resolved, call_timeout)
    }
}

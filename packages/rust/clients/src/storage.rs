//! Storage backend adapter (`create_record`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use sourcing_shared::{CandidateRecord, Result, SessionToken, SourcingError};

use crate::rpc::{RpcClient, RpcError, codes};
use crate::{PersistenceClient, SaveAck};

#[derive(Serialize)]
struct CreateRecordParams<'a> {
    token: &'a str,
    candidate: &'a CandidateRecord,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResult {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// [`PersistenceClient`] over JSON-RPC.
#[derive(Debug)]
pub struct RpcPersistenceClient {
    rpc: RpcClient,
}

impl RpcPersistenceClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn endpoint(&self) -> &Url {
        self.rpc.endpoint()
    }
}

#[async_trait]
impl PersistenceClient for RpcPersistenceClient {
    #[instrument(skip_all, fields(candidate_id = %candidate.id))]
    async fn save(&self, token: &SessionToken, candidate: &CandidateRecord) -> Result<SaveAck> {
        candidate.check_complete()?;

        let params = CreateRecordParams {
            token: token.as_str(),
            candidate,
        };

        let result: CreateRecordResult = self
            .rpc
            .call("create_record", &params)
            .await
            .map_err(|e| map_rpc_error(e, &self.rpc))?;

        debug!(status = %result.status, "create_record answered");

        match result.status.as_str() {
            "saved" => Ok(SaveAck::Saved),
            "duplicate" | "exists" => Ok(SaveAck::Duplicate),
            "error" => Err(SourcingError::PermanentSave(
                result
                    .error
                    .unwrap_or_else(|| "storage service reported an error".into()),
            )),
            other => Err(SourcingError::PermanentSave(format!(
                "unexpected save status '{other}'"
            ))),
        }
    }
}

fn map_rpc_error(err: RpcError, rpc: &RpcClient) -> SourcingError {
    match err {
        RpcError::TimedOut { .. } => SourcingError::Timeout {
            operation: "save",
            after: rpc.timeout(),
        },
        RpcError::Remote {
            code: codes::INVALID_TOKEN,
            message,
        } => SourcingError::PermanentSave(format!("authorization rejected: {message}")),
        RpcError::Remote {
            code: codes::INVALID_PARAMS,
            message,
        } => SourcingError::PermanentSave(format!("record rejected: {message}")),
        other if other.is_transient() => SourcingError::TransientSave(other.to_string()),
        other => SourcingError::PermanentSave(other.to_string()),
    }
}

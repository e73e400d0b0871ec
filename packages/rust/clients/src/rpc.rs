//! Minimal JSON-RPC 2.0 over HTTP POST.
//!
//! Every backend exposes a single endpoint; one call is one POST carrying a
//! `{jsonrpc, method, params, id}` envelope and receiving `result` or `error`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use sourcing_shared::{Result, SourcingError};

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("sourcing/", env!("CARGO_PKG_VERSION"));

const JSONRPC_VERSION: &str = "2.0";

/// Longest response excerpt kept in error messages.
const MAX_BODY_EXCERPT: usize = 200;

/// Application-level JSON-RPC error codes understood by the adapters.
pub mod codes {
    /// Session token missing, expired, or revoked.
    pub const INVALID_TOKEN: i64 = -32001;
    /// Username/secret rejected.
    pub const INVALID_CREDENTIALS: i64 = -32002;
    /// Backend temporarily unable to serve the request.
    pub const SERVICE_UNAVAILABLE: i64 = -32003;
    /// Standard JSON-RPC "invalid params"; used for record validation failures.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Standard JSON-RPC "internal error".
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ---------------------------------------------------------------------------
// RpcError
// ---------------------------------------------------------------------------

/// Failure of a single JSON-RPC call, before any stage-specific mapping.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Connection refused, DNS failure, reset, etc.
    #[error("{endpoint} unreachable: {message}")]
    Unreachable { endpoint: String, message: String },

    /// The HTTP client's own deadline expired.
    #[error("{endpoint}: request timed out")]
    TimedOut { endpoint: String },

    /// Non-success HTTP status.
    #[error("{endpoint}: HTTP {status}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The backend answered with a JSON-RPC `error` object.
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    /// The body was not a usable JSON-RPC response.
    #[error("{endpoint}: malformed response: {message}")]
    Malformed { endpoint: String, message: String },
}

impl RpcError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::TimedOut { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Remote { code, .. } => {
                *code == codes::SERVICE_UNAVAILABLE || *code == codes::INTERNAL_ERROR
            }
            Self::Malformed { .. } => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a P,
    id: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// RpcClient
// ---------------------------------------------------------------------------

/// HTTP transport bound to one JSON-RPC endpoint.
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    endpoint: Url,
    request_id: String,
    timeout: Duration,
    counter: AtomicU64,
}

impl RpcClient {
    /// Create a client for `endpoint`. `request_id` prefixes every envelope id.
    pub fn new(endpoint: &str, request_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SourcingError::config(format!("invalid endpoint '{endpoint}': {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SourcingError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            request_id: request_id.into(),
            timeout,
            counter: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// HTTP-level deadline applied to each call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke `method` with `params` and decode the `result` as `R`.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> std::result::Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id: format!("{}-{seq}", self.request_id),
        };
        let endpoint = self.endpoint.to_string();

        debug!(%endpoint, method, seq, "rpc call");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::TimedOut {
                        endpoint: endpoint.clone(),
                    }
                } else {
                    RpcError::Unreachable {
                        endpoint: endpoint.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RpcError::TimedOut {
                    endpoint: endpoint.clone(),
                }
            } else {
                RpcError::Unreachable {
                    endpoint: endpoint.clone(),
                    message: format!("failed to read body: {e}"),
                }
            }
        })?;

        if !status.is_success() {
            return Err(RpcError::Http {
                endpoint,
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let decoded: RpcResponse<R> =
            serde_json::from_str(&body).map_err(|e| RpcError::Malformed {
                endpoint: endpoint.clone(),
                message: format!("{e} (got: {})", excerpt(&body)),
            })?;

        if let Some(error) = decoded.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        decoded.result.ok_or_else(|| RpcError::Malformed {
            endpoint,
            message: "response carries neither result nor error".into(),
        })
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(MAX_BODY_EXCERPT).collect()
}

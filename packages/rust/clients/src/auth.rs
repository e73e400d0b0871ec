//! Identity backend adapter (`login`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

use sourcing_shared::{Credentials, Result, RunId, SessionToken, SourcingError};

use crate::AuthClient;
use crate::rpc::{RpcClient, RpcError, codes};

#[derive(Serialize)]
struct LoginParams<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// [`AuthClient`] over JSON-RPC.
#[derive(Debug)]
pub struct RpcAuthClient {
    rpc: RpcClient,
}

impl RpcAuthClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn endpoint(&self) -> &Url {
        self.rpc.endpoint()
    }
}

#[async_trait]
impl AuthClient for RpcAuthClient {
    #[instrument(skip_all, fields(username = %credentials.username, run_id = %run_id))]
    async fn authenticate(&self, run_id: RunId, credentials: &Credentials) -> Result<SessionToken> {
        let params = LoginParams {
            username: &credentials.username,
            password: credentials.secret.expose(),
        };

        let result: LoginResult = self
            .rpc
            .call("login", &params)
            .await
            .map_err(|e| map_rpc_error(e, &self.rpc))?;

        match result {
            LoginResult {
                success: true,
                token: Some(token),
                ..
            } if !token.is_empty() => {
                info!("login succeeded");
                Ok(SessionToken::new(token, run_id))
            }
            LoginResult { success: true, .. } => Err(SourcingError::Auth(
                "identity service reported success without a token".into(),
            )),
            LoginResult { error, .. } => {
                let reason = error.unwrap_or_else(|| "invalid credentials".into());
                warn!(%reason, "login rejected");
                Err(SourcingError::Auth(reason))
            }
        }
    }
}

fn map_rpc_error(err: RpcError, rpc: &RpcClient) -> SourcingError {
    match err {
        RpcError::TimedOut { .. } => SourcingError::Timeout {
            operation: "authenticate",
            after: rpc.timeout(),
        },
        RpcError::Remote {
            code: codes::INVALID_CREDENTIALS,
            message,
        } => SourcingError::Auth(format!("invalid credentials: {message}")),
        other => SourcingError::Auth(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RpcAuthClient {
        RpcAuthClient::new(RpcClient::new(&server.uri(), "auth", Duration::from_secs(5)).unwrap())
    }

    fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": "x", "result": result}))
    }

    #[tokio::test]
    async fn login_returns_run_bound_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "login",
                "params": {"username": "recruiter", "password": "s3cret"}
            })))
            .respond_with(rpc_result(json!({"success": true, "token": "tok-123"})))
            .expect(1)
            .mount(&server)
            .await;

        let run_id = RunId::new();
        let token = client(&server)
            .authenticate(run_id, &Credentials::new("recruiter", "s3cret"))
            .await
            .unwrap();

        assert_eq!(token.as_str(), "tok-123");
        assert!(token.is_issued_for(run_id));
    }

    #[tokio::test]
    async fn rejected_login_is_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(rpc_result(json!({"success": false, "error": "wrong password"})))
            .mount(&server)
            .await;

        let err = client(&server)
            .authenticate(RunId::new(), &Credentials::new("recruiter", "nope"))
            .await
            .unwrap_err();

        assert!(matches!(err, SourcingError::Auth(ref m) if m == "wrong password"));
    }

    #[tokio::test]
    async fn remote_invalid_credentials_code() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "x",
                "error": {"code": codes::INVALID_CREDENTIALS, "message": "unknown user"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .authenticate(RunId::new(), &Credentials::new("ghost", "x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid credentials: unknown user"));
    }

    #[tokio::test]
    async fn success_without_token_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(rpc_result(json!({"success": true})))
            .mount(&server)
            .await;

        let err = client(&server)
            .authenticate(RunId::new(), &Credentials::new("recruiter", "s3cret"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("without a token"));
    }

    #[tokio::test]
    async fn unreachable_backend_is_auth_error() {
        let rpc = RpcClient::new("http://127.0.0.1:1/a2a", "auth", Duration::from_secs(2)).unwrap();
        let err = RpcAuthClient::new(rpc)
            .authenticate(RunId::new(), &Credentials::new("recruiter", "s3cret"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourcingError::Auth(_)));
    }
}

//! JSON-RPC implementation of [`Ledger`].
//!
//! Submissions are never retried here: a failed `sendTransaction` is returned
//! to the caller as is. Confirmation polls `getSignatureStatuses` until the
//! configured commitment is reached or the timeout expires.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chain_sol::address_to_bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::{ClientConfig, Commitment};
use crate::error::{QfError, Result};
use crate::ledger::{AccountSnapshot, Ledger};

/// Preflight simulation failed; the node attaches program logs.
const SEND_TRANSACTION_PREFLIGHT_FAILURE: i64 = -32002;

// ---------------------------------------------------------------------------
// JSON-RPC response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct RpcAccount {
    lamports: u64,
    owner: String,
    /// `[payload, encoding]`
    data: (String, String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockhash {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<Commitment>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RpcLedger {
    client: Client,
    url: String,
    commitment: Commitment,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl RpcLedger {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.rpc_url.clone(),
            commitment: config.commitment,
            confirm_timeout: config.confirm_timeout(),
            poll_interval: config.poll_interval(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        debug!(method, "rpc call");
        let body: Value = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        decode_response(method, body)
    }
}

/// Turn a JSON-RPC envelope into its result or a typed error.
fn decode_response<T: DeserializeOwned>(method: &str, body: Value) -> Result<T> {
    let response: RpcResponse<T> = serde_json::from_value(body)?;

    if let Some(err) = response.error {
        return Err(map_rpc_error(err));
    }
    response
        .result
        .ok_or_else(|| QfError::TransportFailure(format!("empty result from {method}")))
}

fn map_rpc_error(err: RpcError) -> QfError {
    if err.code == SEND_TRANSACTION_PREFLIGHT_FAILURE {
        let logs = err
            .data
            .as_ref()
            .and_then(|d| d.get("logs"))
            .and_then(Value::as_array)
            .map(|logs| {
                logs.iter()
                    .filter_map(|l| l.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        warn!(message = %err.message, "transaction rejected in preflight");
        return QfError::EngineRejection {
            message: err.message,
            logs,
        };
    }
    QfError::TransportFailure(format!("rpc error {}: {}", err.code, err.message))
}

fn decode_account(account: RpcAccount) -> Result<AccountSnapshot> {
    let (payload, encoding) = account.data;
    if encoding != "base64" {
        return Err(QfError::TransportFailure(format!(
            "unexpected account encoding {encoding}"
        )));
    }
    let data = BASE64
        .decode(payload)
        .map_err(|e| QfError::TransportFailure(format!("invalid base64 account data: {e}")))?;
    let owner = address_to_bytes(&account.owner)
        .map_err(|e| QfError::TransportFailure(format!("invalid account owner: {e}")))?;
    Ok(AccountSnapshot {
        lamports: account.lamports,
        owner,
        data,
    })
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_account(&self, address: &[u8; 32]) -> Result<Option<AccountSnapshot>> {
        let params = json!([
            chain_sol::bytes_to_address(address),
            { "encoding": "base64", "commitment": self.commitment.as_str() }
        ]);
        let account: WithContext<Option<RpcAccount>> = self.call("getAccountInfo", params).await?;
        account.value.map(decode_account).transpose()
    }

    async fn get_latest_blockhash(&self) -> Result<[u8; 32]> {
        let params = json!([{ "commitment": self.commitment.as_str() }]);
        let latest: WithContext<RpcBlockhash> = self.call("getLatestBlockhash", params).await?;
        address_to_bytes(&latest.value.blockhash)
            .map_err(|e| QfError::TransportFailure(format!("invalid blockhash: {e}")))
    }

    async fn get_minimum_balance_for_rent_exemption(&self, space: usize) -> Result<u64> {
        self.call("getMinimumBalanceForRentExemption", json!([space]))
            .await
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<String> {
        let params = json!([
            BASE64.encode(wire),
            { "encoding": "base64", "preflightCommitment": self.commitment.as_str() }
        ]);
        self.call("sendTransaction", params).await
    }

    async fn confirm_transaction(&self, signature: &str) -> Result<()> {
        timeout(self.confirm_timeout, self.poll_status(signature))
            .await
            .map_err(|_| {
                QfError::TransportFailure(format!(
                    "transaction {signature} not confirmed within {:?}",
                    self.confirm_timeout
                ))
            })?
    }
}

impl RpcLedger {
    /// Poll until the signature reaches the configured commitment or fails.
    async fn poll_status(&self, signature: &str) -> Result<()> {
        loop {
            let params = json!([[signature], { "searchTransactionHistory": true }]);
            let statuses: WithContext<Vec<Option<RpcSignatureStatus>>> =
                self.call("getSignatureStatuses", params).await?;

            if let Some(Some(status)) = statuses.value.into_iter().next() {
                if let Some(err) = status.err {
                    warn!(signature, error = %err, "transaction failed");
                    return Err(QfError::EngineRejection {
                        message: err.to_string(),
                        logs: Vec::new(),
                    });
                }
                if status
                    .confirmation_status
                    .is_some_and(|reached| reached >= self.commitment)
                {
                    return Ok(());
                }
            }

            sleep(self.poll_interval).await;
        }
    }
}

//! JSON-RPC implementation of the deal-execution client.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::types::{CommitOutcome, DealExecution, DealRecord, ExecutionError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Deal-execution client over JSON-RPC 2.0 with bearer auth.
pub struct RpcDealExecution {
    rpc_url: String,
    token: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, serde::Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, serde::Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcDealExecution {
    pub fn new(rpc_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ExecutionError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExecutionError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            rpc_url: rpc_url.into(),
            token: token.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ExecutionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecutionError::Timeout
                } else {
                    ExecutionError::ConnectionFailed(e.to_string())
                }
            })?;

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| ExecutionError::MalformedResponse(e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(ExecutionError::RpcError(format!(
                "{} (code {})",
                err.message, err.code
            )));
        }

        serde_json::from_value(envelope.result)
            .map_err(|e| ExecutionError::MalformedResponse(format!("{method}: {e}")))
    }

    fn check_archive(archive: &Path) -> Result<(), ExecutionError> {
        if !archive.exists() {
            return Err(ExecutionError::ArchiveNotAccessible(
                archive.display().to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DealExecution for RpcDealExecution {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn lookup_deal_by_proposal(
        &self,
        proposal_cid: &str,
    ) -> Result<Option<DealRecord>, ExecutionError> {
        match self
            .call::<DealRecord>("boost.BoostDealBySignedProposalCid", json!([proposal_cid]))
            .await
        {
            Ok(record) => Ok(Some(record)),
            // The service reports a missing record as an RPC error rather
            // than a null result.
            Err(ExecutionError::RpcError(message)) if message.contains("not found") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn commit_offline_deal(
        &self,
        deal_uuid: Uuid,
        archive: &Path,
    ) -> Result<CommitOutcome, ExecutionError> {
        Self::check_archive(archive)?;
        debug!("committing offline deal {deal_uuid}");

        let result: Option<CommitOutcome> = self
            .call(
                "boost.BoostOfflineDealWithData",
                json!([deal_uuid, archive.to_string_lossy()]),
            )
            .await?;

        // A null result means the commit was accepted outright.
        Ok(result.unwrap_or(CommitOutcome {
            rejected: false,
            reason: String::new(),
        }))
    }

    async fn import_legacy_deal(
        &self,
        proposal_cid: &str,
        archive: &Path,
    ) -> Result<(), ExecutionError> {
        Self::check_archive(archive)?;
        debug!("importing legacy deal {proposal_cid}");

        let _: Value = self
            .call(
                "boost.MarketImportDealData",
                json!([proposal_cid, archive.to_string_lossy()]),
            )
            .await?;
        Ok(())
    }
}

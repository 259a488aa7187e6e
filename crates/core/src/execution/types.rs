//! Types for deal-execution operations.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during deal-execution operations.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Archive not accessible: {0}")]
    ArchiveNotAccessible(String),

    #[error("Request timeout")]
    Timeout,
}

/// A deal known to the execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealRecord {
    /// Execution-side deal identifier.
    pub deal_uuid: Uuid,
    /// Signed proposal content identifier.
    pub proposal_cid: String,
    /// Execution-side checkpoint, informational.
    #[serde(default)]
    pub checkpoint: String,
}

/// Result of committing an offline deal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitOutcome {
    /// Whether the service rejected the commit.
    pub rejected: bool,
    /// Rejection reason, empty when accepted.
    #[serde(default)]
    pub reason: String,
}

/// Trait for deal-execution backends.
#[async_trait]
pub trait DealExecution: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Look up a deal by its signed proposal cid.
    ///
    /// `Ok(None)` means the record does not exist; the caller falls back
    /// to the legacy import path.
    async fn lookup_deal_by_proposal(
        &self,
        proposal_cid: &str,
    ) -> Result<Option<DealRecord>, ExecutionError>;

    /// Hand an archive to the service for an offline deal.
    async fn commit_offline_deal(
        &self,
        deal_uuid: Uuid,
        archive: &Path,
    ) -> Result<CommitOutcome, ExecutionError>;

    /// Legacy import path for deals that predate the modern deal record.
    async fn import_legacy_deal(
        &self,
        proposal_cid: &str,
        archive: &Path,
    ) -> Result<(), ExecutionError>;
}

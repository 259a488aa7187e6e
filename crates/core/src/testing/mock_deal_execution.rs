//! Mock deal-execution service for testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::execution::{CommitOutcome, DealExecution, DealRecord, ExecutionError};

/// Mock implementation of the DealExecution trait.
///
/// Provides controllable behavior for testing:
/// - Scripted deal records keyed by proposal cid
/// - Recorded commits and legacy imports for assertions
/// - Simulated rejections
#[derive(Debug, Default)]
pub struct MockDealExecution {
    /// Deal records returned by lookup, keyed by proposal cid.
    records: Arc<RwLock<HashMap<String, Uuid>>>,
    /// Recorded (deal_uuid, archive) commit calls.
    committed: Arc<RwLock<Vec<(Uuid, PathBuf)>>>,
    /// Recorded proposal cids passed to the legacy import.
    legacy_imports: Arc<RwLock<Vec<String>>>,
    /// If set, commits come back rejected with this reason.
    reject_reason: Arc<RwLock<Option<String>>>,
}

impl MockDealExecution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a deal record for `proposal_cid`.
    pub async fn set_deal_record(&self, proposal_cid: &str, deal_uuid: Uuid) {
        self.records
            .write()
            .await
            .insert(proposal_cid.to_string(), deal_uuid);
    }

    /// Recorded (deal_uuid, archive path) commit calls.
    pub async fn committed(&self) -> Vec<(Uuid, PathBuf)> {
        self.committed.read().await.clone()
    }

    /// Recorded legacy-import proposal cids.
    pub async fn legacy_imports(&self) -> Vec<String> {
        self.legacy_imports.read().await.clone()
    }

    /// Make every commit come back rejected.
    pub async fn set_commit_rejected(&self, reason: &str) {
        *self.reject_reason.write().await = Some(reason.to_string());
    }
}

#[async_trait]
impl DealExecution for MockDealExecution {
    fn name(&self) -> &str {
        "mock-execution"
    }

    async fn lookup_deal_by_proposal(
        &self,
        proposal_cid: &str,
    ) -> Result<Option<DealRecord>, ExecutionError> {
        Ok(self
            .records
            .read()
            .await
            .get(proposal_cid)
            .map(|&deal_uuid| DealRecord {
                deal_uuid,
                proposal_cid: proposal_cid.to_string(),
                checkpoint: "Accepted".to_string(),
            }))
    }

    async fn commit_offline_deal(
        &self,
        deal_uuid: Uuid,
        archive: &Path,
    ) -> Result<CommitOutcome, ExecutionError> {
        if let Some(reason) = self.reject_reason.read().await.clone() {
            return Ok(CommitOutcome {
                rejected: true,
                reason,
            });
        }
        self.committed
            .write()
            .await
            .push((deal_uuid, archive.to_path_buf()));
        Ok(CommitOutcome {
            rejected: false,
            reason: String::new(),
        })
    }

    async fn import_legacy_deal(
        &self,
        proposal_cid: &str,
        _archive: &Path,
    ) -> Result<(), ExecutionError> {
        self.legacy_imports
            .write()
            .await
            .push(proposal_cid.to_string());
        Ok(())
    }
}

//! Types for chain node operations.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during chain node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Request timeout")]
    Timeout,
}

/// Status of a retrieval deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    /// Deal created locally, nothing sent yet.
    New,
    /// Waiting for the provider to accept.
    WaitForAcceptance,
    /// Provider accepted, transfer starting.
    Accepted,
    /// Blocks are flowing.
    Ongoing,
    /// All content received.
    Completed,
    /// Provider rejected the proposal.
    Rejected,
    /// Cancellation requested, not yet settled.
    Cancelling,
    /// Deal cancelled.
    Cancelled,
    /// Provider does not have the payload.
    NotFound,
    /// Deal failed with an error.
    Errored,
}

impl RetrievalStatus {
    /// Whether the deal can still make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetrievalStatus::Completed
                | RetrievalStatus::Rejected
                | RetrievalStatus::Cancelled
                | RetrievalStatus::NotFound
                | RetrievalStatus::Errored
        )
    }

    /// Whether a cancellation is already in flight or settled.
    pub fn is_cancelled_or_cancelling(&self) -> bool {
        matches!(self, RetrievalStatus::Cancelled | RetrievalStatus::Cancelling)
    }
}

/// A retrieval offer from a counterparty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOffer {
    /// Provider making the offer.
    pub provider: String,
    /// Payload the offer covers.
    pub payload_cid: String,
    /// Total price in attoFIL.
    pub min_price_attofil: u128,
    /// Payload size according to the provider.
    pub size_bytes: u64,
    /// Provider-side error; a non-empty value means the offer is unusable.
    #[serde(default)]
    pub error: String,
}

/// Order derived from an accepted offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOrder {
    /// Payload to retrieve.
    pub payload_cid: String,
    /// Counterparty to retrieve from.
    pub provider: String,
    /// Agreed total price in attoFIL.
    pub price_attofil: u128,
    /// Wallet paying for the retrieval.
    pub payer: String,
}

/// A progress event for some retrieval deal.
///
/// The event stream is shared across all retrievals on the node; consumers
/// filter by `retrieval_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalEvent {
    /// Deal the event belongs to.
    pub retrieval_id: u64,
    /// Deal status after the event.
    pub status: RetrievalStatus,
    /// Bytes received so far.
    pub bytes_received: u64,
    /// Total paid so far in attoFIL.
    pub total_paid_attofil: u128,
    /// Provider-supplied message, populated on failures.
    #[serde(default)]
    pub message: String,
}

/// Summary of a retrieval deal known to the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalState {
    /// Deal identifier.
    pub id: u64,
    /// Payload being retrieved.
    pub payload_cid: String,
    /// Current status.
    pub status: RetrievalStatus,
    /// Last provider message.
    #[serde(default)]
    pub message: String,
}

/// Content already present in the node's local store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalImport {
    /// Root payload identifier, if the import has one.
    pub root_cid: Option<String>,
    /// Backing archive path, if the import came from a file.
    pub car_path: Option<String>,
}

/// Reference to exportable content: either a finished retrieval deal or a
/// local archive.
#[derive(Debug, Clone)]
pub struct ExportRef {
    /// Root payload identifier.
    pub root_cid: String,
    /// Finished retrieval deal holding the content.
    pub retrieval_id: Option<u64>,
    /// Local archive holding the content.
    pub local_car_path: Option<String>,
}

/// Status of a data-transfer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Channel requested.
    Requested,
    /// Transfer in progress.
    Ongoing,
    /// Transfer finished.
    Completed,
    /// Transfer failed.
    Failed,
    /// Cancellation in flight.
    Cancelling,
    /// Channel cancelled.
    Cancelled,
}

impl TransferStatus {
    /// Whether the channel can still move data.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }

    /// Whether a cancellation is already in flight or settled.
    pub fn is_cancelled_or_cancelling(&self) -> bool {
        matches!(self, TransferStatus::Cancelled | TransferStatus::Cancelling)
    }
}

/// A data-transfer channel known to the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTransfer {
    /// Channel identifier.
    pub transfer_id: u64,
    /// Root content identifier the channel carries.
    pub base_cid: String,
    /// Current status.
    pub status: TransferStatus,
    /// Remote peer on the channel.
    pub other_peer: String,
    /// Whether this node opened the channel.
    pub is_initiator: bool,
}

/// A randomness beacon entry, used in marketplace auth tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconEntry {
    /// Beacon round.
    pub round: u64,
    /// Beacon payload.
    pub data: Vec<u8>,
}

/// A signature produced by the node's wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    /// Signature scheme identifier.
    pub sig_type: u8,
    /// Signature bytes.
    pub data: Vec<u8>,
}

/// Trait for chain node backends.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Actor address of the provider this node serves.
    async fn provider_address(&self) -> Result<String, NodeError>;

    /// Default wallet address, used as the retrieval payer.
    async fn wallet_default_address(&self) -> Result<String, NodeError>;

    /// Ask `provider` for an offer on `payload_cid`.
    async fn query_offer(
        &self,
        provider: &str,
        payload_cid: &str,
    ) -> Result<RetrievalOffer, NodeError>;

    /// Start a retrieval, returning the deal identifier.
    async fn start_retrieval(&self, order: RetrievalOrder) -> Result<u64, NodeError>;

    /// Subscribe to progress events for all retrievals on the node.
    ///
    /// Events arrive unordered across deals; each consumer gets its own
    /// channel and must filter by retrieval id.
    async fn subscribe_retrieval_events(
        &self,
    ) -> Result<mpsc::Receiver<RetrievalEvent>, NodeError>;

    /// List content already imported into the node's local store.
    async fn list_local_imports(&self) -> Result<Vec<LocalImport>, NodeError>;

    /// Export content to an archive file at `dest`.
    async fn export_content(&self, export: ExportRef, dest: &Path) -> Result<(), NodeError>;

    /// List all retrieval deals known to the node.
    async fn list_retrievals(&self) -> Result<Vec<RetrievalState>, NodeError>;

    /// Cancel a retrieval deal.
    async fn cancel_retrieval(&self, id: u64) -> Result<(), NodeError>;

    /// List all data-transfer channels.
    async fn list_data_transfers(&self) -> Result<Vec<DataTransfer>, NodeError>;

    /// Cancel a data-transfer channel.
    async fn cancel_data_transfer(
        &self,
        transfer_id: u64,
        other_peer: &str,
        is_initiator: bool,
    ) -> Result<(), NodeError>;

    /// Worker key of `provider` as of the finalized epoch.
    async fn finalized_worker_key(
        &self,
        provider: &str,
        finalized_epoch: i64,
    ) -> Result<String, NodeError>;

    /// Randomness beacon entry for `epoch`.
    async fn beacon_entry(&self, epoch: i64) -> Result<BeaconEntry, NodeError>;

    /// Sign `data` with the wallet key behind `address`.
    async fn wallet_sign(&self, address: &str, data: &[u8]) -> Result<Signature, NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_status_terminal() {
        assert!(RetrievalStatus::Completed.is_terminal());
        assert!(RetrievalStatus::Rejected.is_terminal());
        assert!(RetrievalStatus::Cancelled.is_terminal());
        assert!(RetrievalStatus::NotFound.is_terminal());
        assert!(RetrievalStatus::Errored.is_terminal());
        assert!(!RetrievalStatus::New.is_terminal());
        assert!(!RetrievalStatus::Ongoing.is_terminal());
        assert!(!RetrievalStatus::Cancelling.is_terminal());
    }

    #[test]
    fn test_transfer_status_terminal() {
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
        assert!(!TransferStatus::Ongoing.is_terminal());
        assert!(!TransferStatus::Cancelling.is_terminal());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RetrievalStatus::WaitForAcceptance).unwrap(),
            "\"wait_for_acceptance\""
        );
        assert_eq!(
            serde_json::to_string(&TransferStatus::Cancelling).unwrap(),
            "\"cancelling\""
        );
    }
}

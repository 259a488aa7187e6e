//! Types for marketplace coordinator operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur talking to the marketplace coordinator.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("API error (code {code}): {message}")]
    ApiError { code: i64, message: String },

    #[error("Request timeout")]
    Timeout,
}

/// One counterparty offering the payload behind a deal candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Counterparty identifier (storage provider actor id).
    pub provider_id: String,
    /// Payload identifier; shared by all sources of one candidate.
    pub original_payload_cid: String,
    /// Kind of source as reported by the coordinator.
    #[serde(default)]
    pub source_type: String,
    /// Expiration of the source's own deal, informational only.
    #[serde(default)]
    pub deal_expiration: String,
    /// Whether the source deal is verified (fil+).
    #[serde(default)]
    pub is_filplus: bool,
}

/// An open deal the coordinator is offering to this provider.
///
/// Immutable once fetched; the candidate cache replaces the whole list on
/// refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealCandidate {
    /// Content-addressed identifier of the padded, sealed piece.
    pub piece_cid: String,
    /// Padded size of the piece in bytes.
    pub padded_piece_size: u64,
    /// Counterparties able to serve the payload, in coordinator order.
    pub sources: Vec<Source>,
}

/// A proposal awaiting confirmation on the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingProposal {
    /// Piece the proposal covers.
    pub piece_cid: String,
    /// Signed proposal content identifier; what deal execution keys on.
    pub deal_proposal_cid: String,
    /// Coordinator-side proposal identifier.
    #[serde(default)]
    pub deal_proposal_id: String,
    /// Piece size in bytes.
    #[serde(default)]
    pub piece_size: u64,
    /// Hours until the proposal lapses.
    #[serde(default)]
    pub hours_remaining: i64,
}

/// Result of requesting a deal against a piece.
#[derive(Debug, Clone)]
pub struct RequestDealOutcome {
    /// Whether the coordinator accepted the request. A decline usually
    /// means another provider took the deal first.
    pub accepted: bool,
    /// Raw coordinator response code.
    pub response_code: i64,
    /// Human-readable info lines from the coordinator.
    pub info_lines: Vec<String>,
}

/// Trait for marketplace coordinator backends.
#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Fetch the current open-deal list for this provider.
    async fn list_open_deals(&self) -> Result<Vec<DealCandidate>, MarketplaceError>;

    /// Request a deal for `piece_cid` on behalf of `provider`.
    async fn request_deal(
        &self,
        provider: &str,
        piece_cid: &str,
    ) -> Result<RequestDealOutcome, MarketplaceError>;

    /// List proposals pending confirmation for `provider`.
    async fn pending_proposals(
        &self,
        provider: &str,
    ) -> Result<Vec<PendingProposal>, MarketplaceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_deserialize_coordinator_shape() {
        let json = r#"{
            "piece_cid": "baga6ea4seaqexample",
            "padded_piece_size": 34359738368,
            "sources": [{
                "provider_id": "f0127896",
                "original_payload_cid": "bafybeigexample",
                "source_type": "filecoin",
                "deal_expiration": "2026-11-01T00:00:00Z",
                "is_filplus": true
            }]
        }"#;
        let candidate: DealCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.piece_cid, "baga6ea4seaqexample");
        assert_eq!(candidate.padded_piece_size, 34359738368);
        assert_eq!(candidate.sources.len(), 1);
        assert_eq!(candidate.sources[0].provider_id, "f0127896");
    }

    #[test]
    fn test_pending_proposal_deserialize_partial() {
        // Coordinator omits fields we do not key on
        let json = r#"{
            "piece_cid": "baga6ea4seaqexample",
            "deal_proposal_cid": "bafyreiproposal"
        }"#;
        let proposal: PendingProposal = serde_json::from_str(json).unwrap();
        assert_eq!(proposal.deal_proposal_cid, "bafyreiproposal");
        assert_eq!(proposal.piece_size, 0);
    }
}

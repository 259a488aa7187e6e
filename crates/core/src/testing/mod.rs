//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of all external service
//! traits, allowing full pipeline tests without a coordinator, a chain
//! node or a deal-execution service.
//!
//! # Example
//!
//! ```rust,ignore
//! use dealbot_core::testing::{MockMarketplace, MockNodeClient, MockDealExecution};
//!
//! let marketplace = MockMarketplace::new();
//! let node = MockNodeClient::new();
//!
//! // Configure mock responses
//! marketplace.set_open_deals(vec![/* candidates */]).await;
//! node.set_offer_price(0).await;
//! ```

mod mock_deal_execution;
mod mock_marketplace;
mod mock_node_client;

pub use mock_deal_execution::MockDealExecution;
pub use mock_marketplace::MockMarketplace;
pub use mock_node_client::MockNodeClient;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::marketplace::{DealCandidate, Source};

    /// Create a test source with reasonable defaults.
    pub fn source(provider_id: &str, payload_cid: &str) -> Source {
        Source {
            provider_id: provider_id.to_string(),
            original_payload_cid: payload_cid.to_string(),
            source_type: "filecoin".to_string(),
            deal_expiration: "2027-01-01T00:00:00Z".to_string(),
            is_filplus: true,
        }
    }

    /// Create a test candidate with one source and a 2 KiB padded size.
    pub fn candidate(piece_cid: &str, provider_id: &str) -> DealCandidate {
        DealCandidate {
            piece_cid: piece_cid.to_string(),
            padded_piece_size: 2048,
            sources: vec![source(provider_id, "bafypayload")],
        }
    }
}

//! Mock deal coordinator for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::marketplace::{
    DealCandidate, Marketplace, MarketplaceError, PendingProposal, RequestDealOutcome,
};

/// Mock implementation of the Marketplace trait.
///
/// Provides controllable behavior for testing:
/// - Scripted open-deal lists, request outcomes and pending proposals
/// - Recorded deal requests for assertions
/// - Simulated slowness and failures
#[derive(Debug)]
pub struct MockMarketplace {
    open_deals: Arc<RwLock<Vec<DealCandidate>>>,
    /// Number of list_open_deals calls so far.
    list_calls: Arc<RwLock<usize>>,
    /// If set, the next list call fails with a connection error.
    fail_next_list: Arc<RwLock<bool>>,
    /// Artificial latency applied to list calls.
    list_delay: Arc<RwLock<Option<Duration>>>,
    /// Outcome returned by request_deal; accepted by default.
    request_outcome: Arc<RwLock<RequestDealOutcome>>,
    /// Recorded (provider, piece_cid) deal requests.
    deal_requests: Arc<RwLock<Vec<(String, String)>>>,
    pending_proposals: Arc<RwLock<Vec<PendingProposal>>>,
    /// Number of pending_proposals calls so far.
    pending_polls: Arc<RwLock<usize>>,
}

impl Default for MockMarketplace {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMarketplace {
    pub fn new() -> Self {
        Self {
            open_deals: Arc::new(RwLock::new(Vec::new())),
            list_calls: Arc::new(RwLock::new(0)),
            fail_next_list: Arc::new(RwLock::new(false)),
            list_delay: Arc::new(RwLock::new(None)),
            request_outcome: Arc::new(RwLock::new(RequestDealOutcome {
                accepted: true,
                response_code: 200,
                info_lines: Vec::new(),
            })),
            deal_requests: Arc::new(RwLock::new(Vec::new())),
            pending_proposals: Arc::new(RwLock::new(Vec::new())),
            pending_polls: Arc::new(RwLock::new(0)),
        }
    }

    pub async fn set_open_deals(&self, deals: Vec<DealCandidate>) {
        *self.open_deals.write().await = deals;
    }

    /// Number of list_open_deals calls made so far.
    pub async fn list_calls(&self) -> usize {
        *self.list_calls.read().await
    }

    /// Make the next list_open_deals call fail.
    pub async fn fail_next_list(&self) {
        *self.fail_next_list.write().await = true;
    }

    /// Delay every list_open_deals call by `delay`.
    pub async fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.write().await = Some(delay);
    }

    pub async fn set_request_outcome(&self, outcome: RequestDealOutcome) {
        *self.request_outcome.write().await = outcome;
    }

    /// Recorded (provider, piece_cid) pairs passed to request_deal.
    pub async fn deal_requests(&self) -> Vec<(String, String)> {
        self.deal_requests.read().await.clone()
    }

    pub async fn set_pending_proposals(&self, proposals: Vec<PendingProposal>) {
        *self.pending_proposals.write().await = proposals;
    }

    /// Number of pending_proposals calls made so far.
    pub async fn pending_polls(&self) -> usize {
        *self.pending_polls.read().await
    }
}

#[async_trait]
impl Marketplace for MockMarketplace {
    fn name(&self) -> &str {
        "mock-marketplace"
    }

    async fn list_open_deals(&self) -> Result<Vec<DealCandidate>, MarketplaceError> {
        let delay = *self.list_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *self.list_calls.write().await += 1;
        if std::mem::take(&mut *self.fail_next_list.write().await) {
            return Err(MarketplaceError::ConnectionFailed(
                "mock list failure".to_string(),
            ));
        }
        Ok(self.open_deals.read().await.clone())
    }

    async fn request_deal(
        &self,
        provider: &str,
        piece_cid: &str,
    ) -> Result<RequestDealOutcome, MarketplaceError> {
        self.deal_requests
            .write()
            .await
            .push((provider.to_string(), piece_cid.to_string()));
        Ok(self.request_outcome.read().await.clone())
    }

    async fn pending_proposals(
        &self,
        _provider: &str,
    ) -> Result<Vec<PendingProposal>, MarketplaceError> {
        *self.pending_polls.write().await += 1;
        Ok(self.pending_proposals.read().await.clone())
    }
}

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Config;
use crate::node::{ExportRef, NodeClient, RetrievalOrder, RetrievalStatus};

use super::RetrievalError;

/// Tuning for one retrieval supervisor.
#[derive(Debug, Clone)]
pub struct RetrievalMonitorConfig {
    /// Maximum acceptable offer price in attoFIL.
    pub max_price_attofil: u128,
    /// Fail the retrieval after this long without an event.
    pub inactivity_timeout: Duration,
    /// How often the inactivity deadline is checked.
    pub poll_tick: Duration,
    /// Grace before cancellation, letting the transfer register first.
    pub cancel_grace: Duration,
    /// Time box on the data-transfer cancellation sweep.
    pub cancel_sweep_timeout: Duration,
}

impl Default for RetrievalMonitorConfig {
    fn default() -> Self {
        Self {
            max_price_attofil: 0,
            inactivity_timeout: Duration::from_secs(600),
            poll_tick: Duration::from_secs(10),
            cancel_grace: Duration::from_secs(30),
            cancel_sweep_timeout: Duration::from_secs(10),
        }
    }
}

impl RetrievalMonitorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_price_attofil: config.node.max_retrieval_price_attofil,
            inactivity_timeout: Duration::from_secs(config.node.retrieval_timeout_secs),
            poll_tick: Duration::from_secs(10),
            cancel_grace: Duration::from_secs(config.scheduler.cancel_grace_secs),
            cancel_sweep_timeout: Duration::from_secs(config.scheduler.cancel_sweep_timeout_secs),
        }
    }
}

/// Supervises one network retrieval at a time.
pub struct RetrievalMonitor {
    node: Arc<dyn NodeClient>,
    config: RetrievalMonitorConfig,
}

impl RetrievalMonitor {
    pub fn new(node: Arc<dyn NodeClient>, config: RetrievalMonitorConfig) -> Self {
        Self { node, config }
    }

    /// Retrieve `payload_cid` from `provider` into the archive at `dest`.
    ///
    /// Content already present in the node's local store short-circuits to
    /// an export. Otherwise a retrieval deal is started and its event
    /// stream consumed until a terminal status or the inactivity timeout;
    /// events for other concurrent retrievals are discarded.
    pub async fn retrieve(
        &self,
        provider: &str,
        payload_cid: &str,
        dest: &Path,
    ) -> Result<(), RetrievalError> {
        if let Some(local) = self.find_local_import(payload_cid).await? {
            debug!("payload {payload_cid} already imported locally");
            self.node
                .export_content(
                    ExportRef {
                        root_cid: payload_cid.to_string(),
                        retrieval_id: None,
                        local_car_path: Some(local),
                    },
                    dest,
                )
                .await?;
            return Ok(());
        }

        let offer = self.node.query_offer(provider, payload_cid).await?;
        if !offer.error.is_empty() {
            return Err(RetrievalError::BadOffer {
                provider: provider.to_string(),
                message: offer.error,
            });
        }
        if offer.min_price_attofil > self.config.max_price_attofil {
            return Err(RetrievalError::PriceTooHigh {
                price: offer.min_price_attofil,
                max: self.config.max_price_attofil,
            });
        }

        let payer = self.node.wallet_default_address().await?;

        // Subscribe before starting: the deal id is unknown until the
        // retrieval is created, so filtering happens on the consumer side.
        let mut events = self.node.subscribe_retrieval_events().await?;

        let retrieval_id = self
            .node
            .start_retrieval(RetrievalOrder {
                payload_cid: payload_cid.to_string(),
                provider: provider.to_string(),
                price_attofil: offer.min_price_attofil,
                payer,
            })
            .await?;

        let started = Instant::now();
        let mut last_event = Instant::now();
        let mut tick = tokio::time::interval(self.config.poll_tick);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if last_event.elapsed() > self.config.inactivity_timeout {
                        return Err(RetrievalError::InactivityTimeout(
                            self.config.inactivity_timeout,
                        ));
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return Err(RetrievalError::EventStreamClosed);
                    };
                    if event.retrieval_id != retrieval_id {
                        continue;
                    }

                    last_event = Instant::now();
                    debug!(
                        "retrieval {retrieval_id}: recv {} B, {:?}, {:?} elapsed",
                        event.bytes_received,
                        event.status,
                        started.elapsed(),
                    );

                    match event.status {
                        RetrievalStatus::Completed => break,
                        RetrievalStatus::Rejected => {
                            return Err(RetrievalError::Rejected(event.message));
                        }
                        RetrievalStatus::Cancelled => {
                            return Err(RetrievalError::Cancelled(event.message));
                        }
                        RetrievalStatus::NotFound | RetrievalStatus::Errored => {
                            return Err(RetrievalError::Failed(event.message));
                        }
                        _ => {}
                    }
                }
            }
        }

        self.node
            .export_content(
                ExportRef {
                    root_cid: payload_cid.to_string(),
                    retrieval_id: Some(retrieval_id),
                    local_car_path: None,
                },
                dest,
            )
            .await?;

        Ok(())
    }

    /// Best-effort cancellation of an abandoned retrieval.
    ///
    /// Waits the configured grace period so the transfer can register with
    /// the transport layer, cancels every matching retrieval deal, then
    /// sweeps data-transfer channels carrying the same content. The sweep
    /// runs detached under a time box; a slow channel never stalls the
    /// caller past that bound.
    pub async fn cancel_retrieval(&self, payload_cid: &str) -> Result<(), RetrievalError> {
        tokio::time::sleep(self.config.cancel_grace).await;

        let mut found = false;
        for retrieval in self.node.list_retrievals().await? {
            if retrieval.payload_cid != payload_cid
                || retrieval.status.is_cancelled_or_cancelling()
            {
                continue;
            }
            if let Err(e) = self.node.cancel_retrieval(retrieval.id).await {
                warn!("cancelling retrieval {} failed: {e}", retrieval.id);
            }
            found = true;
        }

        let node = Arc::clone(&self.node);
        let cid = payload_cid.to_string();
        let sweep = tokio::spawn(async move { sweep_transfers(node, &cid).await });

        if tokio::time::timeout(self.config.cancel_sweep_timeout, sweep)
            .await
            .is_err()
        {
            debug!("cancelling transfers timed out");
        }

        if !found {
            return Err(RetrievalError::NoMatchingRetrieval);
        }
        Ok(())
    }

    async fn find_local_import(
        &self,
        payload_cid: &str,
    ) -> Result<Option<String>, RetrievalError> {
        let imports = self.node.list_local_imports().await?;
        Ok(imports.into_iter().find_map(|import| {
            (import.root_cid.as_deref() == Some(payload_cid))
                .then_some(import.car_path)
                .flatten()
        }))
    }
}

/// Cancel every non-settled data-transfer channel carrying `base_cid`.
async fn sweep_transfers(node: Arc<dyn NodeClient>, base_cid: &str) {
    let transfers = match node.list_data_transfers().await {
        Ok(transfers) => transfers,
        Err(e) => {
            warn!("listing transfers failed: {e}");
            return;
        }
    };

    for transfer in transfers {
        if transfer.base_cid != base_cid || transfer.status.is_cancelled_or_cancelling() {
            continue;
        }
        debug!("cancelling data transfer channel {}", transfer.transfer_id);
        if let Err(e) = node
            .cancel_data_transfer(
                transfer.transfer_id,
                &transfer.other_peer,
                transfer.is_initiator,
            )
            .await
        {
            warn!(
                "cancelling data transfer {} failed: {e}",
                transfer.transfer_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DataTransfer, RetrievalEvent, TransferStatus};
    use crate::testing::MockNodeClient;
    use tempfile::TempDir;

    fn fast_config() -> RetrievalMonitorConfig {
        RetrievalMonitorConfig {
            max_price_attofil: 0,
            inactivity_timeout: Duration::from_millis(200),
            poll_tick: Duration::from_millis(20),
            cancel_grace: Duration::from_millis(10),
            cancel_sweep_timeout: Duration::from_millis(100),
        }
    }

    fn dest(dir: &TempDir) -> std::path::PathBuf {
        dir.path().join("piece.car")
    }

    #[tokio::test]
    async fn test_retrieve_completes_and_exports() {
        let node = Arc::new(MockNodeClient::new());
        let dir = TempDir::new().unwrap();

        node.script_retrieval_events(vec![
            (RetrievalStatus::Accepted, ""),
            (RetrievalStatus::Ongoing, ""),
            (RetrievalStatus::Completed, ""),
        ])
        .await;

        let monitor = RetrievalMonitor::new(Arc::clone(&node) as _, fast_config());
        monitor
            .retrieve("f01000", "bafypayload", &dest(&dir))
            .await
            .unwrap();

        let exports = node.exported().await;
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].0.root_cid, "bafypayload");
        assert!(exports[0].0.retrieval_id.is_some());
    }

    #[tokio::test]
    async fn test_retrieve_rejected_carries_provider_message() {
        let node = Arc::new(MockNodeClient::new());
        let dir = TempDir::new().unwrap();

        node.script_retrieval_events(vec![(RetrievalStatus::Rejected, "no unsealed copy")])
            .await;

        let monitor = RetrievalMonitor::new(Arc::clone(&node) as _, fast_config());
        let err = monitor
            .retrieve("f01000", "bafypayload", &dest(&dir))
            .await
            .unwrap_err();

        match err {
            RetrievalError::Rejected(message) => assert_eq!(message, "no unsealed copy"),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retrieve_inactivity_timeout() {
        let node = Arc::new(MockNodeClient::new());
        let dir = TempDir::new().unwrap();

        // No events at all: the deadline must fire.
        node.script_retrieval_events(vec![]).await;
        node.hold_event_stream_open().await;

        let monitor = RetrievalMonitor::new(Arc::clone(&node) as _, fast_config());
        let err = monitor
            .retrieve("f01000", "bafypayload", &dest(&dir))
            .await
            .unwrap_err();

        assert!(matches!(err, RetrievalError::InactivityTimeout(_)));
    }

    #[tokio::test]
    async fn test_retrieve_ignores_other_deals_events() {
        let node = Arc::new(MockNodeClient::new());
        let dir = TempDir::new().unwrap();

        // Events for an unrelated deal id must be discarded, then ours
        // completes.
        node.push_foreign_event(RetrievalEvent {
            retrieval_id: 9999,
            status: RetrievalStatus::Errored,
            bytes_received: 0,
            total_paid_attofil: 0,
            message: "other deal".to_string(),
        })
        .await;
        node.script_retrieval_events(vec![(RetrievalStatus::Completed, "")])
            .await;

        let monitor = RetrievalMonitor::new(Arc::clone(&node) as _, fast_config());
        monitor
            .retrieve("f01000", "bafypayload", &dest(&dir))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retrieve_price_above_max_fails() {
        let node = Arc::new(MockNodeClient::new());
        let dir = TempDir::new().unwrap();

        node.set_offer_price(25).await;

        let monitor = RetrievalMonitor::new(Arc::clone(&node) as _, fast_config());
        let err = monitor
            .retrieve("f01000", "bafypayload", &dest(&dir))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RetrievalError::PriceTooHigh { price: 25, max: 0 }
        ));
        assert!(node.started_retrievals().await.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_local_import_short_circuits() {
        let node = Arc::new(MockNodeClient::new());
        let dir = TempDir::new().unwrap();

        node.add_local_import("bafypayload", "/store/bafypayload.car")
            .await;

        let monitor = RetrievalMonitor::new(Arc::clone(&node) as _, fast_config());
        monitor
            .retrieve("f01000", "bafypayload", &dest(&dir))
            .await
            .unwrap();

        assert!(node.started_retrievals().await.is_empty());
        let exports = node.exported().await;
        assert_eq!(
            exports[0].0.local_car_path.as_deref(),
            Some("/store/bafypayload.car")
        );
    }

    #[tokio::test]
    async fn test_cancel_sweeps_matching_transfers_only() {
        let node = Arc::new(MockNodeClient::new());

        node.add_retrieval_state(7, "bafypayload", RetrievalStatus::Ongoing)
            .await;
        node.add_data_transfer(DataTransfer {
            transfer_id: 1,
            base_cid: "bafypayload".to_string(),
            status: TransferStatus::Ongoing,
            other_peer: "peer-a".to_string(),
            is_initiator: true,
        })
        .await;
        node.add_data_transfer(DataTransfer {
            transfer_id: 2,
            base_cid: "bafyother".to_string(),
            status: TransferStatus::Ongoing,
            other_peer: "peer-b".to_string(),
            is_initiator: true,
        })
        .await;
        node.add_data_transfer(DataTransfer {
            transfer_id: 3,
            base_cid: "bafypayload".to_string(),
            status: TransferStatus::Cancelling,
            other_peer: "peer-c".to_string(),
            is_initiator: false,
        })
        .await;

        let monitor = RetrievalMonitor::new(Arc::clone(&node) as _, fast_config());
        monitor.cancel_retrieval("bafypayload").await.unwrap();

        assert_eq!(node.cancelled_retrievals().await, vec![7]);
        assert_eq!(node.cancelled_transfers().await, vec![1]);
    }

    #[tokio::test]
    async fn test_cancel_without_matching_retrieval_errors() {
        let node = Arc::new(MockNodeClient::new());
        let monitor = RetrievalMonitor::new(Arc::clone(&node) as _, fast_config());

        let err = monitor.cancel_retrieval("bafypayload").await.unwrap_err();
        assert!(matches!(err, RetrievalError::NoMatchingRetrieval));
    }

    #[tokio::test]
    async fn test_cancel_sweep_is_time_boxed() {
        let node = Arc::new(MockNodeClient::new());
        node.add_retrieval_state(7, "bafypayload", RetrievalStatus::Ongoing)
            .await;
        node.set_transfer_list_delay(Duration::from_secs(60)).await;

        let monitor = RetrievalMonitor::new(Arc::clone(&node) as _, fast_config());
        let started = Instant::now();
        monitor.cancel_retrieval("bafypayload").await.unwrap();

        // Grace (10ms) + sweep box (100ms) with generous slack
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

//! Mock chain node for testing.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::node::{
    BeaconEntry, DataTransfer, ExportRef, LocalImport, NodeClient, NodeError, RetrievalEvent,
    RetrievalOffer, RetrievalOrder, RetrievalState, RetrievalStatus, Signature,
};

/// Mock implementation of the NodeClient trait.
///
/// Provides controllable behavior for testing:
/// - Scripted offers, retrieval events and local imports
/// - Recorded retrieval starts, exports and cancellations
/// - Simulated slowness on transfer listing
///
/// Scripted events are tagged with the deal id of the next
/// `start_retrieval` call and delivered on the channel handed out by
/// `subscribe_retrieval_events`, so the subscribe-then-start ordering of
/// real consumers works unchanged.
#[derive(Debug)]
pub struct MockNodeClient {
    worker_key: Arc<RwLock<String>>,
    beacon_data: Arc<RwLock<Vec<u8>>>,
    signed_messages: Arc<RwLock<Vec<Vec<u8>>>>,
    offer_price: Arc<RwLock<u128>>,
    /// Per-provider offer errors; an entry makes the offer unusable.
    offer_errors: Arc<RwLock<HashMap<String, String>>>,
    local_imports: Arc<RwLock<Vec<LocalImport>>>,
    /// Event scripts, one per started retrieval, consumed in order.
    scripted_events: Arc<RwLock<VecDeque<Vec<(RetrievalStatus, String)>>>>,
    /// Events for unrelated deals, replayed before the scripted ones.
    foreign_events: Arc<RwLock<Vec<RetrievalEvent>>>,
    /// Keep the event channel open after the script runs out.
    hold_stream: Arc<RwLock<bool>>,
    pending_tx: Arc<RwLock<Option<mpsc::Sender<RetrievalEvent>>>>,
    held_tx: Arc<RwLock<Option<mpsc::Sender<RetrievalEvent>>>>,
    started: Arc<RwLock<Vec<RetrievalOrder>>>,
    next_id: Arc<RwLock<u64>>,
    exports: Arc<RwLock<Vec<(ExportRef, PathBuf)>>>,
    retrieval_states: Arc<RwLock<Vec<RetrievalState>>>,
    transfers: Arc<RwLock<Vec<DataTransfer>>>,
    cancelled_retrievals: Arc<RwLock<Vec<u64>>>,
    cancelled_transfers: Arc<RwLock<Vec<u64>>>,
    transfer_list_delay: Arc<RwLock<Option<Duration>>>,
}

impl Default for MockNodeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNodeClient {
    pub fn new() -> Self {
        Self {
            worker_key: Arc::new(RwLock::new("f3workerkey".to_string())),
            beacon_data: Arc::new(RwLock::new(vec![0x42])),
            signed_messages: Arc::new(RwLock::new(Vec::new())),
            offer_price: Arc::new(RwLock::new(0)),
            offer_errors: Arc::new(RwLock::new(HashMap::new())),
            local_imports: Arc::new(RwLock::new(Vec::new())),
            scripted_events: Arc::new(RwLock::new(VecDeque::new())),
            foreign_events: Arc::new(RwLock::new(Vec::new())),
            hold_stream: Arc::new(RwLock::new(false)),
            pending_tx: Arc::new(RwLock::new(None)),
            held_tx: Arc::new(RwLock::new(None)),
            started: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(RwLock::new(1)),
            exports: Arc::new(RwLock::new(Vec::new())),
            retrieval_states: Arc::new(RwLock::new(Vec::new())),
            transfers: Arc::new(RwLock::new(Vec::new())),
            cancelled_retrievals: Arc::new(RwLock::new(Vec::new())),
            cancelled_transfers: Arc::new(RwLock::new(Vec::new())),
            transfer_list_delay: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_worker_key(&self, key: &str) {
        *self.worker_key.write().await = key.to_string();
    }

    pub async fn set_beacon_data(&self, data: Vec<u8>) {
        *self.beacon_data.write().await = data;
    }

    /// Last message passed to wallet_sign.
    pub async fn last_signed_message(&self) -> Option<Vec<u8>> {
        self.signed_messages.read().await.last().cloned()
    }

    pub async fn set_offer_price(&self, price: u128) {
        *self.offer_price.write().await = price;
    }

    /// Make offers from `provider` carry a provider-side error.
    pub async fn set_offer_error_for(&self, provider: &str, message: &str) {
        self.offer_errors
            .write()
            .await
            .insert(provider.to_string(), message.to_string());
    }

    pub async fn add_local_import(&self, root_cid: &str, car_path: &str) {
        self.local_imports.write().await.push(LocalImport {
            root_cid: Some(root_cid.to_string()),
            car_path: Some(car_path.to_string()),
        });
    }

    /// Script the events replayed for the next unscripted retrieval.
    ///
    /// Each call queues one script; successive `start_retrieval` calls
    /// consume scripts in order, so multi-source failovers can give every
    /// retrieval its own event sequence.
    pub async fn script_retrieval_events(&self, events: Vec<(RetrievalStatus, &str)>) {
        self.scripted_events.write().await.push_back(
            events
                .into_iter()
                .map(|(status, message)| (status, message.to_string()))
                .collect(),
        );
    }

    /// Queue an event for an unrelated deal id.
    pub async fn push_foreign_event(&self, event: RetrievalEvent) {
        self.foreign_events.write().await.push(event);
    }

    /// Keep the event channel open after scripted events run out, so
    /// consumers block instead of seeing the stream close.
    pub async fn hold_event_stream_open(&self) {
        *self.hold_stream.write().await = true;
    }

    /// Orders passed to start_retrieval.
    pub async fn started_retrievals(&self) -> Vec<RetrievalOrder> {
        self.started.read().await.clone()
    }

    /// Recorded export_content calls.
    pub async fn exported(&self) -> Vec<(ExportRef, PathBuf)> {
        self.exports.read().await.clone()
    }

    pub async fn add_retrieval_state(&self, id: u64, payload_cid: &str, status: RetrievalStatus) {
        self.retrieval_states.write().await.push(RetrievalState {
            id,
            payload_cid: payload_cid.to_string(),
            status,
            message: String::new(),
        });
    }

    pub async fn add_data_transfer(&self, transfer: DataTransfer) {
        self.transfers.write().await.push(transfer);
    }

    /// Deal ids passed to cancel_retrieval.
    pub async fn cancelled_retrievals(&self) -> Vec<u64> {
        self.cancelled_retrievals.read().await.clone()
    }

    /// Channel ids passed to cancel_data_transfer.
    pub async fn cancelled_transfers(&self) -> Vec<u64> {
        self.cancelled_transfers.read().await.clone()
    }

    /// Delay every list_data_transfers call by `delay`.
    pub async fn set_transfer_list_delay(&self, delay: Duration) {
        *self.transfer_list_delay.write().await = Some(delay);
    }
}

#[async_trait]
impl NodeClient for MockNodeClient {
    fn name(&self) -> &str {
        "mock-node"
    }

    async fn provider_address(&self) -> Result<String, NodeError> {
        Ok("f09999".to_string())
    }

    async fn wallet_default_address(&self) -> Result<String, NodeError> {
        Ok("f1wallet".to_string())
    }

    async fn query_offer(
        &self,
        provider: &str,
        payload_cid: &str,
    ) -> Result<RetrievalOffer, NodeError> {
        let error = self
            .offer_errors
            .read()
            .await
            .get(provider)
            .cloned()
            .unwrap_or_default();
        Ok(RetrievalOffer {
            provider: provider.to_string(),
            payload_cid: payload_cid.to_string(),
            min_price_attofil: *self.offer_price.read().await,
            size_bytes: 2048,
            error,
        })
    }

    async fn start_retrieval(&self, order: RetrievalOrder) -> Result<u64, NodeError> {
        let id = {
            let mut next = self.next_id.write().await;
            let id = *next;
            *next += 1;
            id
        };
        self.started.write().await.push(order);

        if let Some(tx) = self.pending_tx.write().await.take() {
            for event in self.foreign_events.write().await.drain(..) {
                let _ = tx.send(event).await;
            }
            let scripted = self
                .scripted_events
                .write()
                .await
                .pop_front()
                .unwrap_or_default();
            for (i, (status, message)) in scripted.into_iter().enumerate() {
                let _ = tx
                    .send(RetrievalEvent {
                        retrieval_id: id,
                        status,
                        bytes_received: (i as u64 + 1) * 100,
                        total_paid_attofil: 0,
                        message,
                    })
                    .await;
            }
            if *self.hold_stream.read().await {
                *self.held_tx.write().await = Some(tx);
            }
        }
        Ok(id)
    }

    async fn subscribe_retrieval_events(
        &self,
    ) -> Result<mpsc::Receiver<RetrievalEvent>, NodeError> {
        let (tx, rx) = mpsc::channel(64);
        *self.pending_tx.write().await = Some(tx);
        Ok(rx)
    }

    async fn list_local_imports(&self) -> Result<Vec<LocalImport>, NodeError> {
        Ok(self.local_imports.read().await.clone())
    }

    async fn export_content(&self, export: ExportRef, dest: &Path) -> Result<(), NodeError> {
        self.exports
            .write()
            .await
            .push((export, dest.to_path_buf()));
        Ok(())
    }

    async fn list_retrievals(&self) -> Result<Vec<RetrievalState>, NodeError> {
        Ok(self.retrieval_states.read().await.clone())
    }

    async fn cancel_retrieval(&self, id: u64) -> Result<(), NodeError> {
        self.cancelled_retrievals.write().await.push(id);
        Ok(())
    }

    async fn list_data_transfers(&self) -> Result<Vec<DataTransfer>, NodeError> {
        let delay = *self.transfer_list_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.transfers.read().await.clone())
    }

    async fn cancel_data_transfer(
        &self,
        transfer_id: u64,
        _other_peer: &str,
        _is_initiator: bool,
    ) -> Result<(), NodeError> {
        self.cancelled_transfers.write().await.push(transfer_id);
        Ok(())
    }

    async fn finalized_worker_key(
        &self,
        _provider: &str,
        _finalized_epoch: i64,
    ) -> Result<String, NodeError> {
        Ok(self.worker_key.read().await.clone())
    }

    async fn beacon_entry(&self, epoch: i64) -> Result<BeaconEntry, NodeError> {
        Ok(BeaconEntry {
            round: epoch.max(0) as u64,
            data: self.beacon_data.read().await.clone(),
        })
    }

    async fn wallet_sign(&self, _address: &str, data: &[u8]) -> Result<Signature, NodeError> {
        self.signed_messages.write().await.push(data.to_vec());
        Ok(Signature {
            sig_type: 2,
            data: vec![0xab; 64],
        })
    }
}

//! JSON-RPC implementation of the chain node client.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use super::types::{
    BeaconEntry, DataTransfer, ExportRef, LocalImport, NodeClient, NodeError, RetrievalEvent,
    RetrievalOffer, RetrievalOrder, RetrievalState, Signature,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const EVENT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Chain node client over JSON-RPC 2.0.
///
/// The node pushes no events over plain HTTP, so
/// `subscribe_retrieval_events` is realized as a background poll-diff loop
/// over the retrieval listing; each status or byte-count change becomes one
/// event on the subscriber's channel.
pub struct RpcNodeClient {
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

impl RpcNodeClient {
    /// Create a client against the given RPC endpoint.
    pub fn new(rpc_url: impl Into<String>, token: impl Into<String>) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NodeError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            rpc_url: rpc_url.into(),
            token: token.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.rpc_url).json(&body);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NodeError::Timeout
            } else {
                NodeError::ConnectionFailed(e.to_string())
            }
        })?;

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| NodeError::MalformedResponse(e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(NodeError::RpcError(format!(
                "{} (code {})",
                err.message, err.code
            )));
        }

        serde_json::from_value(envelope.result)
            .map_err(|e| NodeError::MalformedResponse(format!("{method}: {e}")))
    }

    /// Spawn the poll-diff loop backing one event subscription.
    fn spawn_event_poller(&self, tx: mpsc::Sender<RetrievalEvent>) {
        let poller = Self {
            rpc_url: self.rpc_url.clone(),
            token: self.token.clone(),
            client: self.client.clone(),
            next_id: AtomicU64::new(1 << 32),
        };

        tokio::spawn(async move {
            let mut seen: std::collections::HashMap<u64, (super::RetrievalStatus, u64)> =
                std::collections::HashMap::new();
            let mut tick = tokio::time::interval(EVENT_POLL_INTERVAL);

            loop {
                tick.tick().await;
                if tx.is_closed() {
                    break;
                }

                let states: Vec<RetrievalState> =
                    match poller.call("Filecoin.ClientListRetrievals", json!([])).await {
                        Ok(states) => states,
                        Err(e) => {
                            debug!("retrieval event poll failed: {e}");
                            continue;
                        }
                    };

                for state in states {
                    let bytes = state_bytes_received(&state);
                    let changed = match seen.get(&state.id) {
                        Some((status, last_bytes)) => {
                            *status != state.status || *last_bytes != bytes
                        }
                        None => true,
                    };
                    if !changed {
                        continue;
                    }
                    seen.insert(state.id, (state.status, bytes));

                    let event = RetrievalEvent {
                        retrieval_id: state.id,
                        status: state.status,
                        bytes_received: bytes,
                        total_paid_attofil: 0,
                        message: state.message,
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });
    }
}

// The listing does not report byte counts; progress is inferred from
// status changes alone.
fn state_bytes_received(_state: &RetrievalState) -> u64 {
    0
}

#[async_trait]
impl NodeClient for RpcNodeClient {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn provider_address(&self) -> Result<String, NodeError> {
        self.call("Filecoin.ActorAddress", json!([])).await
    }

    async fn wallet_default_address(&self) -> Result<String, NodeError> {
        self.call("Filecoin.WalletDefaultAddress", json!([])).await
    }

    async fn query_offer(
        &self,
        provider: &str,
        payload_cid: &str,
    ) -> Result<RetrievalOffer, NodeError> {
        self.call(
            "Filecoin.ClientMinerQueryOffer",
            json!([provider, payload_cid, null]),
        )
        .await
    }

    async fn start_retrieval(&self, order: RetrievalOrder) -> Result<u64, NodeError> {
        #[derive(serde::Deserialize)]
        struct RetrieveResult {
            #[serde(rename = "deal_id")]
            deal_id: u64,
        }
        let result: RetrieveResult = self.call("Filecoin.ClientRetrieve", json!([order])).await?;
        Ok(result.deal_id)
    }

    async fn subscribe_retrieval_events(
        &self,
    ) -> Result<mpsc::Receiver<RetrievalEvent>, NodeError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.spawn_event_poller(tx);
        Ok(rx)
    }

    async fn list_local_imports(&self) -> Result<Vec<LocalImport>, NodeError> {
        self.call("Filecoin.ClientListImports", json!([])).await
    }

    async fn export_content(&self, export: ExportRef, dest: &Path) -> Result<(), NodeError> {
        debug!("exporting archive to {}", dest.display());
        let export_ref = json!({
            "root_cid": export.root_cid,
            "retrieval_id": export.retrieval_id,
            "local_car_path": export.local_car_path,
        });
        let file_ref = json!({
            "path": dest.to_string_lossy(),
            "is_car": true,
        });
        let _: Value = self
            .call("Filecoin.ClientExport", json!([export_ref, file_ref]))
            .await
            .map_err(|e| NodeError::ExportFailed(e.to_string()))?;
        Ok(())
    }

    async fn list_retrievals(&self) -> Result<Vec<RetrievalState>, NodeError> {
        self.call("Filecoin.ClientListRetrievals", json!([])).await
    }

    async fn cancel_retrieval(&self, id: u64) -> Result<(), NodeError> {
        let _: Value = self
            .call("Filecoin.ClientCancelRetrievalDeal", json!([id]))
            .await?;
        Ok(())
    }

    async fn list_data_transfers(&self) -> Result<Vec<DataTransfer>, NodeError> {
        self.call("Filecoin.ClientListDataTransfers", json!([])).await
    }

    async fn cancel_data_transfer(
        &self,
        transfer_id: u64,
        other_peer: &str,
        is_initiator: bool,
    ) -> Result<(), NodeError> {
        let _: Value = self
            .call(
                "Filecoin.ClientCancelDataTransfer",
                json!([transfer_id, other_peer, is_initiator]),
            )
            .await?;
        Ok(())
    }

    async fn finalized_worker_key(
        &self,
        provider: &str,
        finalized_epoch: i64,
    ) -> Result<String, NodeError> {
        #[derive(serde::Deserialize)]
        struct MinerInfo {
            #[serde(rename = "worker")]
            worker: String,
        }
        let tipset: Value = self
            .call(
                "Filecoin.ChainGetTipSetByHeight",
                json!([finalized_epoch, []]),
            )
            .await?;
        let key = tipset.get("cids").cloned().unwrap_or_else(|| json!([]));
        let info: MinerInfo = self
            .call("Filecoin.StateMinerInfo", json!([provider, key]))
            .await?;
        Ok(info.worker)
    }

    async fn beacon_entry(&self, epoch: i64) -> Result<BeaconEntry, NodeError> {
        self.call("Filecoin.StateGetBeaconEntry", json!([epoch])).await
    }

    async fn wallet_sign(&self, address: &str, data: &[u8]) -> Result<Signature, NodeError> {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        self.call("Filecoin.WalletSign", json!([address, encoded]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_envelope_result() {
        let json = r#"{"jsonrpc":"2.0","id":1,"result":"f01234"}"#;
        let envelope: RpcEnvelope = serde_json::from_str(json).unwrap();
        assert!(envelope.error.is_none());
        assert_eq!(envelope.result, serde_json::json!("f01234"));
    }

    #[test]
    fn test_rpc_envelope_error() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#;
        let envelope: RpcEnvelope = serde_json::from_str(json).unwrap();
        let err = envelope.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "method not found");
    }

    #[tokio::test]
    async fn test_subscribe_returns_channel_immediately() {
        let client = RpcNodeClient::new("http://127.0.0.1:0/rpc/v1", "").unwrap();
        // The poller task cannot reach a node, but subscription itself
        // must not block or fail.
        let rx = client.subscribe_retrieval_events().await.unwrap();
        assert!(!rx.is_closed());
    }
}

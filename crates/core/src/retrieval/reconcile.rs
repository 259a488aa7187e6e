use std::sync::Arc;

use tracing::{info, warn};

use crate::node::NodeClient;

use super::RetrievalError;

/// Clear in-flight retrieval state left over from a previous run.
///
/// The process keeps no durable record of which retrievals it owns, so
/// after a restart every non-settled retrieval deal and data-transfer
/// channel on the node is cancelled. Individual cancellation failures are
/// logged and skipped; only listing failures abort the sweep.
pub async fn reconcile_on_startup(node: Arc<dyn NodeClient>) -> Result<(), RetrievalError> {
    let mut retrievals = 0usize;
    for retrieval in node.list_retrievals().await? {
        if retrieval.status.is_terminal() || retrieval.status.is_cancelled_or_cancelling() {
            continue;
        }
        if let Err(e) = node.cancel_retrieval(retrieval.id).await {
            warn!("cancelling leftover retrieval {} failed: {e}", retrieval.id);
            continue;
        }
        retrievals += 1;
    }

    let mut transfers = 0usize;
    for transfer in node.list_data_transfers().await? {
        if transfer.status.is_terminal() || transfer.status.is_cancelled_or_cancelling() {
            continue;
        }
        if let Err(e) = node
            .cancel_data_transfer(
                transfer.transfer_id,
                &transfer.other_peer,
                transfer.is_initiator,
            )
            .await
        {
            warn!(
                "cancelling leftover transfer {} failed: {e}",
                transfer.transfer_id
            );
            continue;
        }
        transfers += 1;
    }

    info!("startup sweep cancelled {retrievals} retrievals and {transfers} transfers");
    Ok(())
}

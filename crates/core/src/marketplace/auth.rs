//! Marketplace authentication tokens.
//!
//! The coordinator authenticates providers with a time-boxed token signed
//! by the provider's worker key: the current beacon entry, prefixed with a
//! base64 space pad so the payload can never parse as valid CBOR, signed
//! and assembled as `FIL-SPID-V0 <epoch>;<provider>;<sigtype>;<sig>`.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use tracing::debug;

use crate::node::{NodeClient, NodeError};

use super::types::MarketplaceError;

/// Unix timestamp of the chain genesis block.
const GENESIS_UNIX: i64 = 1_598_306_400;
/// Seconds per chain epoch.
const EPOCH_SECONDS: i64 = 30;
/// Epochs behind head considered finalized.
const FINALITY_EPOCHS: i64 = 900;
/// Base64 of three ASCII spaces, prepended to the beacon payload.
const SPACE_PAD_B64: &str = "ICAg";

/// Produces a fresh `Authorization` header value per request.
#[async_trait]
pub trait AuthTokenProvider: Send + Sync {
    /// Compute a token authenticating `provider` right now.
    async fn token(&self, provider: &str) -> Result<String, MarketplaceError>;
}

/// Token provider backed by the chain node's wallet.
pub struct SpidAuthProvider {
    node: Arc<dyn NodeClient>,
}

impl SpidAuthProvider {
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self { node }
    }

    fn current_epoch() -> i64 {
        let now = chrono::Utc::now().timestamp();
        (now - 1 - GENESIS_UNIX) / EPOCH_SECONDS
    }
}

#[async_trait]
impl AuthTokenProvider for SpidAuthProvider {
    async fn token(&self, provider: &str) -> Result<String, MarketplaceError> {
        let epoch = Self::current_epoch();

        let worker = self
            .node
            .finalized_worker_key(provider, epoch - FINALITY_EPOCHS)
            .await
            .map_err(auth_err)?;

        let beacon = self.node.beacon_entry(epoch).await.map_err(auth_err)?;

        // The pad and the beacon bytes must be concatenated as base64 and
        // decoded back before signing.
        let b64 = base64::engine::general_purpose::STANDARD;
        let payload_b64 = format!("{SPACE_PAD_B64}{}", b64.encode(&beacon.data));
        let message = b64
            .decode(&payload_b64)
            .map_err(|e| MarketplaceError::AuthenticationFailed(e.to_string()))?;

        let signature = self
            .node
            .wallet_sign(&worker, &message)
            .await
            .map_err(auth_err)?;

        debug!("minted auth token for {provider} at epoch {epoch}");

        Ok(format!(
            "FIL-SPID-V0 {epoch};{provider};{};{}",
            signature.sig_type,
            b64.encode(&signature.data)
        ))
    }
}

fn auth_err(e: NodeError) -> MarketplaceError {
    MarketplaceError::AuthenticationFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNodeClient;

    #[test]
    fn test_current_epoch_positive() {
        assert!(SpidAuthProvider::current_epoch() > 0);
    }

    #[tokio::test]
    async fn test_token_format() {
        let node = Arc::new(MockNodeClient::new());
        node.set_worker_key("f3workerkey").await;
        node.set_beacon_data(vec![0xde, 0xad, 0xbe, 0xef]).await;

        let provider = SpidAuthProvider::new(node);
        let token = provider.token("f01234").await.unwrap();

        assert!(token.starts_with("FIL-SPID-V0 "));
        let fields: Vec<&str> = token
            .trim_start_matches("FIL-SPID-V0 ")
            .split(';')
            .collect();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[1], "f01234");
        // epoch parses as a number
        assert!(fields[0].parse::<i64>().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_signed_message_is_space_padded_beacon() {
        let node = Arc::new(MockNodeClient::new());
        node.set_beacon_data(vec![1, 2, 3]).await;

        let provider = SpidAuthProvider::new(Arc::clone(&node) as Arc<dyn NodeClient>);
        provider.token("f01234").await.unwrap();

        let signed = node.last_signed_message().await.unwrap();
        assert_eq!(&signed[..3], b"   ");
        assert_eq!(&signed[3..], &[1, 2, 3]);
    }
}

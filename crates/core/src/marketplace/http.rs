//! HTTP implementation of the marketplace coordinator client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::auth::AuthTokenProvider;
use super::types::{
    DealCandidate, Marketplace, MarketplaceError, PendingProposal, RequestDealOutcome,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Marketplace client speaking the coordinator's REST API.
///
/// Every request carries a freshly minted `Authorization` token; the
/// coordinator rejects tokens older than a few epochs, so they are never
/// cached.
pub struct HttpMarketplace {
    api_url: String,
    provider: String,
    auth: Arc<dyn AuthTokenProvider>,
    client: reqwest::Client,
}

/// Envelope around the open-deal listing.
#[derive(Debug, Deserialize)]
struct OpenDealsResponse {
    response_code: i64,
    #[serde(default)]
    info_lines: Vec<String>,
    #[serde(default)]
    response: Vec<DealCandidate>,
}

/// Envelope around a deal request.
#[derive(Debug, Deserialize)]
struct RequestDealResponse {
    response_code: i64,
    #[serde(default)]
    info_lines: Vec<String>,
}

/// Envelope around the pending-proposal listing.
#[derive(Debug, Deserialize)]
struct PendingProposalsResponse {
    response_code: i64,
    #[serde(default)]
    info_lines: Vec<String>,
    response: PendingProposalsBody,
}

#[derive(Debug, Deserialize)]
struct PendingProposalsBody {
    #[serde(default)]
    pending_proposals: Vec<PendingProposal>,
}

impl HttpMarketplace {
    /// Create a client for `provider` against the given coordinator URL.
    pub fn new(
        api_url: impl Into<String>,
        provider: impl Into<String>,
        auth: Arc<dyn AuthTokenProvider>,
    ) -> Result<Self, MarketplaceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MarketplaceError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            provider: provider.into(),
            auth,
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, MarketplaceError> {
        let token = self.auth.token(&self.provider).await?;
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, token.trim_end())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MarketplaceError::Timeout
                } else {
                    MarketplaceError::ConnectionFailed(e.to_string())
                }
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MarketplaceError::AuthenticationFailed(
                "coordinator rejected the signed token".to_string(),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MarketplaceError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl Marketplace for HttpMarketplace {
    fn name(&self) -> &str {
        "http"
    }

    async fn list_open_deals(&self) -> Result<Vec<DealCandidate>, MarketplaceError> {
        debug!("querying coordinator for open deals");
        let envelope: OpenDealsResponse = self.get_json("/sp/eligible_pieces?limit=100000").await?;

        if envelope.response_code != 200 {
            return Err(MarketplaceError::ApiError {
                code: envelope.response_code,
                message: envelope.info_lines.join("; "),
            });
        }

        Ok(envelope.response)
    }

    async fn request_deal(
        &self,
        _provider: &str,
        piece_cid: &str,
    ) -> Result<RequestDealOutcome, MarketplaceError> {
        let envelope: RequestDealResponse = self
            .get_json(&format!("/sp/request_piece/{piece_cid}"))
            .await?;

        // A non-200 here usually means the deal was taken while we were
        // downloading; the caller treats it as contention, not an error.
        Ok(RequestDealOutcome {
            accepted: envelope.response_code == 200,
            response_code: envelope.response_code,
            info_lines: envelope.info_lines,
        })
    }

    async fn pending_proposals(
        &self,
        _provider: &str,
    ) -> Result<Vec<PendingProposal>, MarketplaceError> {
        let envelope: PendingProposalsResponse = self.get_json("/sp/pending_proposals").await?;

        if envelope.response_code != 200 {
            return Err(MarketplaceError::ApiError {
                code: envelope.response_code,
                message: envelope.info_lines.join("; "),
            });
        }

        Ok(envelope.response.pending_proposals)
    }
}

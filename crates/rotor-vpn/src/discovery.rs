//! Discovery Service Client
//!
//! Fetches the raw proposal listing (`GET <discovery-url>` returning a
//! JSON array of proposals).

use crate::catalog::Proposal;
use async_trait::async_trait;
use rotor_network::{HttpClient, HttpError};
use tracing::debug;

/// Discovery errors
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Failed to fetch proposals: {0}")]
    Http(#[from] HttpError),

    #[error("Discovery service returned HTTP {0}")]
    Status(u16),

    #[error("Malformed proposal listing: {0}")]
    Malformed(String),
}

/// Anything that can produce the current proposal listing
#[async_trait]
pub trait ProposalSource: Send + Sync {
    async fn fetch_proposals(&self) -> Result<Vec<Proposal>, DiscoveryError>;
}

/// HTTP discovery service client
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http: HttpClient,
    url: String,
}

impl DiscoveryClient {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ProposalSource for DiscoveryClient {
    async fn fetch_proposals(&self) -> Result<Vec<Proposal>, DiscoveryError> {
        let response = self.http.get(&self.url).await?;
        if !response.is_success() {
            return Err(DiscoveryError::Status(response.status.as_u16()));
        }

        let proposals: Vec<Proposal> = serde_json::from_slice(&response.body)
            .map_err(|e| DiscoveryError::Malformed(e.to_string()))?;

        debug!(
            "Fetched {} proposals from {} in {:?}",
            proposals.len(),
            self.url,
            response.total_time
        );
        Ok(proposals)
    }
}

//! Proposal Catalog
//!
//! The set of network-exit offers currently advertised by the discovery
//! service. The catalog is a plain value: it is refreshed wholesale and
//! passed explicitly to whoever needs to select from it.

use crate::discovery::{DiscoveryError, ProposalSource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// An advertised exit offer. Only `provider_id` is interpreted; every
/// other field from the discovery listing is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Provider identity
    pub provider_id: String,
    /// Remaining listing fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Proposal {
    /// Create a proposal with no extra fields
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Look up an opaque listing field
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

/// In-memory list of known proposals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposalCatalog {
    proposals: Vec<Proposal>,
}

impl ProposalCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog from already fetched proposals
    pub fn from_proposals(proposals: Vec<Proposal>) -> Self {
        Self { proposals }
    }

    /// Replace the whole catalog with the latest listing from `source`.
    /// On failure the previous contents are kept.
    pub async fn refresh(&mut self, source: &dyn ProposalSource) -> Result<(), DiscoveryError> {
        let proposals = source.fetch_proposals().await?;
        self.proposals = proposals;
        info!("Proposals updated, length: {}", self.proposals.len());
        Ok(())
    }

    /// Write a pretty-printed JSON snapshot for external inspection.
    /// Failures are logged, never raised.
    pub async fn write_snapshot(&self, path: &Path) {
        let json = match serde_json::to_string_pretty(&self.proposals) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize proposal snapshot: {}", e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(path, json).await {
            warn!("Failed to write proposal snapshot {}: {}", path.display(), e);
        }
    }

    /// All proposals, in listing order
    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    /// Proposal at `index`
    pub fn get(&self, index: usize) -> Option<&Proposal> {
        self.proposals.get(index)
    }

    /// Number of proposals
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    /// Whether the catalog holds no proposals
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}

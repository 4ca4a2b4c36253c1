//! Proposal Selector
//!
//! Picks a random proposal whose provider has never been selected
//! before, and records the provider as excluded before handing the
//! proposal out. Selection itself is the point of exclusion: a provider
//! that later fails to connect is not offered again.

use crate::catalog::{Proposal, ProposalCatalog};
use crate::exclusion::{is_valid_id, ExclusionStore, StoreError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

/// Selection errors
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("No proposals available")]
    EmptyCatalog,

    #[error("All {0} proposals belong to excluded providers")]
    ExhaustedProposals(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Random, exclusion-aware proposal selector
pub struct ProposalSelector {
    rng: StdRng,
}

impl ProposalSelector {
    /// Create a selector seeded from the OS
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a deterministic selector
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Select a proposal from `catalog` whose provider is not in
    /// `providers`, then add that provider to `providers`.
    ///
    /// Candidates are visited in a random permutation, which draws
    /// uniformly among the non-excluded entries and never revisits a
    /// rejected index. The store is read once per call. Entries whose
    /// provider id cannot be stored are skipped.
    pub async fn select(
        &mut self,
        catalog: &ProposalCatalog,
        providers: &dyn ExclusionStore,
    ) -> Result<Proposal, SelectError> {
        if catalog.is_empty() {
            return Err(SelectError::EmptyCatalog);
        }

        let excluded = providers.load().await?;
        let mut order: Vec<usize> = (0..catalog.len()).collect();
        order.shuffle(&mut self.rng);

        for index in order {
            let Some(proposal) = catalog.get(index) else {
                continue;
            };
            if !is_valid_id(&proposal.provider_id) {
                debug!("Skipping proposal with invalid provider id {:?}", proposal.provider_id);
                continue;
            }
            if excluded.contains(proposal.provider_id.trim()) {
                debug!("Skipping excluded provider {}", proposal.provider_id);
                continue;
            }

            providers.add(&proposal.provider_id).await?;
            info!("Random proposal: {}", proposal.provider_id);
            return Ok(proposal.clone());
        }

        Err(SelectError::ExhaustedProposals(catalog.len()))
    }
}

impl Default for ProposalSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusion::{ExclusionSet, MemoryExclusionStore};
    use std::collections::HashSet;

    fn catalog(ids: &[&str]) -> ProposalCatalog {
        ProposalCatalog::from_proposals(ids.iter().map(|id| Proposal::new(*id)).collect())
    }

    #[tokio::test]
    async fn test_empty_catalog() {
        let mut selector = ProposalSelector::with_seed(1);
        let store = MemoryExclusionStore::new(ExclusionSet::Providers);

        let result = selector.select(&ProposalCatalog::new(), &store).await;
        assert!(matches!(result, Err(SelectError::EmptyCatalog)));
    }

    #[tokio::test]
    async fn test_selection_registers_provider() {
        let mut selector = ProposalSelector::with_seed(7);
        let store = MemoryExclusionStore::new(ExclusionSet::Providers);

        let picked = selector.select(&catalog(&["A"]), &store).await.unwrap();

        assert_eq!(picked.provider_id, "A");
        assert_eq!(store.entries().await, vec!["A"]);
    }

    #[tokio::test]
    async fn test_never_returns_excluded_provider() {
        let store = MemoryExclusionStore::with_entries(ExclusionSet::Providers, ["A"]);
        let cat = catalog(&["A", "B"]);

        for seed in 0..32 {
            let store = MemoryExclusionStore::with_entries(ExclusionSet::Providers, ["A"]);
            let mut selector = ProposalSelector::with_seed(seed);
            let picked = selector.select(&cat, &store).await.unwrap();
            assert_eq!(picked.provider_id, "B");
        }

        let mut selector = ProposalSelector::with_seed(0);
        selector.select(&cat, &store).await.unwrap();
        let result = selector.select(&cat, &store).await;
        assert!(matches!(result, Err(SelectError::ExhaustedProposals(2))));
    }

    #[tokio::test]
    async fn test_each_provider_selected_once() {
        let ids: Vec<String> = (0..50).map(|i| format!("0x{:02x}", i)).collect();
        // Providers may advertise several services; duplicates share an identity
        let mut proposals: Vec<Proposal> = ids.iter().map(Proposal::new).collect();
        proposals.extend(ids.iter().take(10).map(Proposal::new));
        let cat = ProposalCatalog::from_proposals(proposals);

        let store = MemoryExclusionStore::new(ExclusionSet::Providers);
        let mut selector = ProposalSelector::with_seed(42);
        let mut seen = HashSet::new();

        loop {
            match selector.select(&cat, &store).await {
                Ok(p) => assert!(seen.insert(p.provider_id), "provider returned twice"),
                Err(SelectError::ExhaustedProposals(_)) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(seen.len(), ids.len());
        assert_eq!(store.entries().await.len(), ids.len());
    }

    #[tokio::test]
    async fn test_invalid_provider_ids_skipped() {
        let cat = ProposalCatalog::from_proposals(vec![
            Proposal::new(""),
            Proposal::new("B"),
            Proposal::new("x\ny"),
        ]);

        for seed in 0..32 {
            let store = MemoryExclusionStore::new(ExclusionSet::Providers);
            let mut selector = ProposalSelector::with_seed(seed);

            let picked = selector.select(&cat, &store).await.unwrap();
            assert_eq!(picked.provider_id, "B", "seed {seed}");

            let result = selector.select(&cat, &store).await;
            assert!(matches!(result, Err(SelectError::ExhaustedProposals(3))), "seed {seed}");
            assert_eq!(store.entries().await, vec!["B"]);
        }
    }

    #[tokio::test]
    async fn test_selection_spreads_over_candidates() {
        let cat = catalog(&["A", "B", "C"]);
        let mut counts = std::collections::HashMap::new();

        for seed in 0..300 {
            let store = MemoryExclusionStore::new(ExclusionSet::Providers);
            let mut selector = ProposalSelector::with_seed(seed);
            let picked = selector.select(&cat, &store).await.unwrap();
            *counts.entry(picked.provider_id).or_insert(0u32) += 1;
        }

        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&c| c > 50));
    }
}

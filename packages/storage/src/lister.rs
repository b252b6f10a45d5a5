//! Merged listings across every tier.

use carledger::Entity;
use serde::Serialize;
use tracing::warn;

use crate::chain::TierChain;
use crate::error::TierFailure;
use crate::policy::KeyCollision;
use crate::storage::StorageError;

/// The deduplicated union of every answering tier's records.
#[derive(Debug, Clone, Serialize)]
pub struct MergedList<T> {
    /// Stronger tiers' records first, each tier in its own order.
    pub items: Vec<T>,
    /// Distinct records that shared a natural key; the weaker one was
    /// dropped from `items`.
    pub collisions: Vec<KeyCollision>,
    /// Tiers whose listing failed and were left out.
    pub warnings: Vec<TierFailure>,
}

impl<T> MergedList<T> {
    /// Keep only the items matching `keep`.
    pub fn filter(mut self, keep: impl FnMut(&T) -> bool) -> Self {
        self.items.retain(keep);
        self
    }
}

/// List every tier and merge the results with the chain's
/// [`ReconciliationPolicy`](crate::ReconciliationPolicy).
///
/// A tier that fails, for any reason, is logged and left out. Only when no
/// tier produced a listing does this return
/// [`StorageError::AllTiersFailed`].
pub async fn list_merged<T: Entity>(chain: &TierChain<T>) -> Result<MergedList<T>, StorageError> {
    let mut per_tier = Vec::with_capacity(chain.len());
    let mut warnings = Vec::new();

    for tier in chain.tiers() {
        match tier.observe(tier.store().list_all().await) {
            Ok(records) => per_tier.push((tier.durability(), records)),
            Err(e) => {
                warn!(
                    "{}: listing {} failed: {e}",
                    tier.durability().short_name(),
                    T::COLLECTION
                );
                warnings.push(TierFailure::new(tier.durability(), e.to_string()));
            }
        }
    }

    if per_tier.is_empty() {
        return Err(StorageError::AllTiersFailed(warnings));
    }

    let (items, collisions) = chain.policy().merge(per_tier);
    for c in &collisions {
        warn!(
            "{}: duplicate key {:?} ({} in {}, {} in {})",
            T::COLLECTION,
            c.key,
            c.kept_id,
            c.kept_from.short_name(),
            c.shadowed_id,
            c.shadowed_from.short_name()
        );
    }

    Ok(MergedList {
        items,
        collisions,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryTier;
    use crate::storage::{Durability, TierStore};
    use crate::test_support::Offline;
    use carledger::UserRecord;
    use std::sync::Arc;

    #[tokio::test]
    async fn union_deduplicates_by_key() {
        let remote = Arc::new(MemoryTier::<UserRecord>::new());
        let memory = Arc::new(MemoryTier::<UserRecord>::new());
        let shared = UserRecord::new("shared@example.com", "Shared", "hash");
        remote.create(&shared).await.unwrap();
        memory.create(&shared).await.unwrap();
        memory
            .create(&UserRecord::new("degraded@example.com", "Degraded", "hash"))
            .await
            .unwrap();

        let c: TierChain<UserRecord> = TierChain::new()
            .with_tier(Durability::DurableRemote, remote)
            .with_tier(Durability::VolatileMemory, memory);
        let merged = list_merged(&c).await.unwrap();

        let emails: Vec<_> = merged.items.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["shared@example.com", "degraded@example.com"]);
        assert!(merged.collisions.is_empty());
        assert!(merged.warnings.is_empty());
    }

    #[tokio::test]
    async fn failing_tier_is_left_out() {
        let memory = Arc::new(MemoryTier::<UserRecord>::new());
        memory
            .create(&UserRecord::new("a@example.com", "A", "hash"))
            .await
            .unwrap();
        let c: TierChain<UserRecord> = TierChain::new()
            .with_tier(Durability::DurableRemote, Arc::new(Offline))
            .with_tier(Durability::VolatileMemory, memory);

        let merged = list_merged(&c).await.unwrap();
        assert_eq!(merged.items.len(), 1);
        assert_eq!(merged.warnings[0].tier, Durability::DurableRemote);
    }

    #[tokio::test]
    async fn all_failing_is_aggregate_failure() {
        let c: TierChain<UserRecord> =
            TierChain::new().with_tier(Durability::DurableRemote, Arc::new(Offline));
        assert!(matches!(
            list_merged(&c).await,
            Err(StorageError::AllTiersFailed(f)) if f.len() == 1
        ));
    }

    #[tokio::test]
    async fn empty_tiers_give_empty_list() {
        let c: TierChain<UserRecord> = TierChain::new()
            .with_tier(Durability::DurableLocal, Arc::new(MemoryTier::<UserRecord>::new()))
            .with_tier(
                Durability::VolatileMemory,
                Arc::new(MemoryTier::<UserRecord>::new()),
            );
        assert!(list_merged(&c).await.unwrap().items.is_empty());
    }
}

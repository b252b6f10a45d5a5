//! Aggregations computed against a single authoritative tier.
//!
//! Sums over a merged listing would double-count records that lack a
//! natural key whenever two tiers diverge, so aggregations read exactly one
//! tier: the first, in priority order, whose listing succeeds.

use carledger::Entity;
use serde::Serialize;
use tracing::warn;

use crate::chain::TierChain;
use crate::error::TierFailure;
use crate::storage::{Durability, StorageError};

/// A value computed from one tier's full listing.
#[derive(Debug, Clone, Serialize)]
pub struct Authoritative<R> {
    pub value: R,
    pub served_by: Durability,
    /// Stronger tiers that could not be listed.
    pub warnings: Vec<TierFailure>,
}

/// Fold the records of the first tier that can list them.
pub async fn aggregate<T, R, F>(
    chain: &TierChain<T>,
    fold: F,
) -> Result<Authoritative<R>, StorageError>
where
    T: Entity,
    F: FnOnce(Vec<T>) -> R + Send,
    R: Send,
{
    let mut warnings = Vec::new();

    for tier in chain.tiers() {
        match tier.observe(tier.store().list_all().await) {
            Ok(records) => {
                return Ok(Authoritative {
                    value: fold(records),
                    served_by: tier.durability(),
                    warnings,
                })
            }
            Err(e) => {
                warn!(
                    "{}: {} unavailable for aggregation: {e}",
                    tier.durability().short_name(),
                    T::COLLECTION
                );
                warnings.push(TierFailure::new(tier.durability(), e.to_string()));
            }
        }
    }

    Err(StorageError::AllTiersFailed(warnings))
}

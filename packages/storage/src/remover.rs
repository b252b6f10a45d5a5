//! Record removal.

use carledger::Entity;
use serde::Serialize;
use tracing::{debug, warn};

use crate::chain::TierChain;
use crate::error::TierFailure;
use crate::reader::Lookup;
use crate::storage::{Durability, StorageError};

/// Which tiers a delete touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteScope {
    /// Only the first tier, in priority order, that holds the record.
    /// Copies in weaker tiers survive and show up again in reads once the
    /// stronger tier has dropped its copy.
    #[default]
    ServingTier,
    /// Every tier holding a copy.
    EveryTier,
}

/// Outcome of [`delete`].
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub deleted_from: Vec<Durability>,
    pub warnings: Vec<TierFailure>,
}

/// Remove the record identified by `lookup` from the tiers `scope` selects.
///
/// Returns `Ok(None)` when some tier answered and none held the record,
/// and [`StorageError::AllTiersFailed`] when no tier answered at all.
pub async fn delete<T: Entity>(
    chain: &TierChain<T>,
    lookup: &Lookup,
    scope: DeleteScope,
) -> Result<Option<DeleteResult>, StorageError> {
    let mut deleted_from = Vec::new();
    let mut warnings = Vec::new();
    let mut answered = false;

    for tier in chain.tiers() {
        let name = tier.durability().short_name();
        let outcome = match tier.observe(lookup.run(tier.store()).await) {
            Ok(Some(current)) => tier.observe(tier.store().delete(current.id()).await),
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(true) => {
                answered = true;
                debug!("{name}: deleted {} {lookup}", T::COLLECTION);
                deleted_from.push(tier.durability());
                if scope == DeleteScope::ServingTier {
                    break;
                }
            }
            Ok(false) => answered = true,
            Err(e) => {
                warn!("{name}: deleting {} {lookup} failed: {e}", T::COLLECTION);
                warnings.push(TierFailure::new(tier.durability(), e.to_string()));
            }
        }
    }

    if !deleted_from.is_empty() {
        Ok(Some(DeleteResult {
            deleted_from,
            warnings,
        }))
    } else if answered {
        Ok(None)
    } else {
        Err(StorageError::AllTiersFailed(warnings))
    }
}

//! Partial updates applied across every tier that holds a record.

use carledger::{Entity, MergePatch};
use serde::Serialize;
use tracing::{debug, warn};

use crate::chain::TierChain;
use crate::error::TierFailure;
use crate::reader::Lookup;
use crate::storage::{Durability, StorageError};

/// Outcome of [`patch`].
#[derive(Debug, Clone, Serialize)]
pub struct PatchResult<T> {
    /// The record as updated by the authoritative tier.
    pub record: T,
    /// First tier, in priority order, that held the record and applied the
    /// patch.
    pub source: Durability,
    /// Other tiers holding the record that applied the patch too.
    pub replicas: Vec<Durability>,
    pub warnings: Vec<TierFailure>,
}

/// Apply `patch` to the record identified by `lookup`.
///
/// Every tier is visited in priority order. The first tier that holds the
/// record and applies the patch is authoritative: its result is returned,
/// and a conflict or rejected patch from it fails the whole operation.
/// Each weaker tier that also holds a copy then gets the same patch applied
/// to its own copy. Their failures, and tiers that could not be reached, are
/// reported as warnings. Tiers without a copy are left alone; a patch never
/// creates a record.
///
/// Returns `Ok(None)` when some tier answered and none held the record.
pub async fn patch<T: Entity>(
    chain: &TierChain<T>,
    lookup: &Lookup,
    patch: &MergePatch,
) -> Result<Option<PatchResult<T>>, StorageError> {
    if patch.is_empty() {
        return Err(StorageError::Invalid("patch has no fields".into()));
    }

    let mut authoritative: Option<(Durability, T)> = None;
    let mut replicas = Vec::new();
    let mut warnings = Vec::new();
    let mut answered = false;

    for tier in chain.tiers() {
        let name = tier.durability().short_name();

        let current = match tier.observe(lookup.run(tier.store()).await) {
            Ok(Some(current)) => current,
            Ok(None) => {
                answered = true;
                continue;
            }
            Err(e) if authoritative.is_some() || e.is_unavailable() => {
                warn!("{name}: {} lookup by {lookup} failed: {e}", T::COLLECTION);
                warnings.push(TierFailure::new(tier.durability(), e.to_string()));
                continue;
            }
            Err(e) => return Err(e),
        };
        answered = true;

        let first = authoritative.is_none();
        let outcome = tier.observe(tier.store().update(current.id(), patch).await);
        match (first, outcome) {
            (true, Ok(Some(updated))) => {
                debug!("{name}: patched {} {}", T::COLLECTION, updated.id());
                authoritative = Some((tier.durability(), updated));
            }
            (false, Ok(Some(_))) => replicas.push(tier.durability()),
            // Deleted between lookup and update.
            (_, Ok(None)) => {}
            (true, Err(e)) if !e.is_unavailable() => return Err(e),
            (_, Err(e)) => {
                warn!("{name}: patching {} {} failed: {e}", T::COLLECTION, current.id());
                warnings.push(TierFailure::new(tier.durability(), e.to_string()));
            }
        }
    }

    match authoritative {
        Some((source, record)) => Ok(Some(PatchResult {
            record,
            source,
            replicas,
            warnings,
        })),
        None if answered => Ok(None),
        None => Err(StorageError::AllTiersFailed(warnings)),
    }
}

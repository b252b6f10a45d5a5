//! Cascading single-record lookups.

use std::fmt;

use carledger::Entity;
use serde::Serialize;
use tracing::{debug, warn};

use crate::chain::TierChain;
use crate::error::TierFailure;
use crate::storage::{Durability, StorageError, TierStore};

/// How a caller identifies one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Id(String),
    /// Natural key as supplied by the caller; normalised per record kind
    /// before it reaches a tier.
    Key(String),
}

impl Lookup {
    pub fn id(id: impl Into<String>) -> Self {
        Lookup::Id(id.into())
    }

    pub fn key(key: impl Into<String>) -> Self {
        Lookup::Key(key.into())
    }

    pub(crate) async fn run<T: Entity>(
        &self,
        store: &dyn TierStore<T>,
    ) -> Result<Option<T>, StorageError> {
        match self {
            Lookup::Id(id) => store.find_by_id(id).await,
            Lookup::Key(key) => store.find_by_key(&T::normalize_key(key)).await,
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Id(id) => write!(f, "id {id}"),
            Lookup::Key(key) => write!(f, "key {key:?}"),
        }
    }
}

/// A record found by [`read`], with the tier that served it and the tiers
/// that were skipped because they could not answer.
#[derive(Debug, Clone, Serialize)]
pub struct LookupResult<T> {
    pub record: T,
    pub served_by: Durability,
    pub warnings: Vec<TierFailure>,
}

/// Find one record, trying tiers in priority order.
///
/// The first tier that returns a record wins. A tier that answers "not
/// found" does not stop the search, since the record may only exist in a
/// weaker tier after a degraded write. Unavailable tiers are skipped.
///
/// Returns `Ok(None)` when at least one tier answered and none had the
/// record, and [`StorageError::AllTiersFailed`] when no tier answered.
/// Conflict and validation errors from a tier are returned as-is.
pub async fn read<T: Entity>(
    chain: &TierChain<T>,
    lookup: &Lookup,
) -> Result<Option<LookupResult<T>>, StorageError> {
    let mut warnings = Vec::new();
    let mut answered = false;

    for tier in chain.tiers() {
        let name = tier.durability().short_name();
        match tier.observe(lookup.run(tier.store()).await) {
            Ok(Some(record)) => {
                debug!("{name}: served {} {lookup}", T::COLLECTION);
                return Ok(Some(LookupResult {
                    record,
                    served_by: tier.durability(),
                    warnings,
                }));
            }
            Ok(None) => answered = true,
            Err(StorageError::Unavailable(reason)) => {
                warn!("{name}: {} lookup by {lookup} skipped: {reason}", T::COLLECTION);
                warnings.push(TierFailure::new(tier.durability(), reason));
            }
            Err(e) => return Err(e),
        }
    }

    if answered {
        Ok(None)
    } else {
        Err(StorageError::AllTiersFailed(warnings))
    }
}

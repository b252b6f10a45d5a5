//! Cascading creation with best-effort replication.

use carledger::Entity;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chain::TierChain;
use crate::error::TierFailure;
use crate::reader::{self, Lookup};
use crate::storage::{Durability, StorageError};

/// Outcome of [`create`].
#[derive(Debug, Clone, Serialize)]
pub struct WriteResult<T> {
    /// The record as stored by the accepting tier.
    pub record: T,
    /// Strongest tier that accepted the write.
    pub source: Durability,
    /// Weaker tiers the record was copied to.
    pub replicas: Vec<Durability>,
    /// `true` when a stronger tier was skipped, i.e. `source` is not the
    /// chain's primary.
    pub degraded: bool,
    /// Skipped stronger tiers followed by failed replications.
    pub warnings: Vec<TierFailure>,
}

/// Persist a new record.
///
/// 1. The record is validated before any tier is touched.
/// 2. If the kind has a natural key, the merged view is checked for it; a
///    record already holding the key anywhere is a conflict.
/// 3. Tiers are tried in priority order. An unavailable tier is skipped;
///    any other error (a conflict, a rejected record) is definitive and
///    returned without trying weaker tiers.
/// 4. The record the accepting tier returned, same id included, is then
///    copied to every weaker tier. Replication failures only produce
///    warnings.
pub async fn create<T: Entity>(
    chain: &TierChain<T>,
    record: &T,
) -> Result<WriteResult<T>, StorageError> {
    record.validate()?;

    if let Some(key) = record.natural_key() {
        if let Some(existing) = reader::read(chain, &Lookup::Key(key.clone())).await? {
            return Err(StorageError::Conflict(format!(
                "{} with key {key:?} already exists (id {}, {} tier)",
                T::COLLECTION,
                existing.record.id(),
                existing.served_by.short_name()
            )));
        }
    }

    let mut warnings = Vec::new();
    let mut accepted = None;

    for (idx, tier) in chain.tiers().iter().enumerate() {
        match tier.observe(tier.store().create(record).await) {
            Ok(stored) => {
                accepted = Some((idx, stored));
                break;
            }
            Err(StorageError::Unavailable(reason)) => {
                warn!(
                    "{}: create {} {} skipped: {reason}",
                    tier.durability().short_name(),
                    T::COLLECTION,
                    record.id()
                );
                warnings.push(TierFailure::new(tier.durability(), reason));
            }
            Err(e) => return Err(e),
        }
    }

    let Some((idx, stored)) = accepted else {
        return Err(StorageError::AllTiersFailed(warnings));
    };
    let source = chain.tiers()[idx].durability();
    if idx > 0 {
        info!(
            "{} {} written to {} tier (degraded)",
            T::COLLECTION,
            stored.id(),
            source.short_name()
        );
    }

    let mut replicas = Vec::new();
    for tier in &chain.tiers()[idx + 1..] {
        match tier.observe(tier.store().create(&stored).await) {
            Ok(_) => {
                debug!(
                    "{}: replicated {} {}",
                    tier.durability().short_name(),
                    T::COLLECTION,
                    stored.id()
                );
                replicas.push(tier.durability());
            }
            Err(e) => {
                warn!(
                    "{}: replicating {} {} failed: {e}",
                    tier.durability().short_name(),
                    T::COLLECTION,
                    stored.id()
                );
                warnings.push(TierFailure::new(tier.durability(), e.to_string()));
            }
        }
    }

    Ok(WriteResult {
        record: stored,
        source,
        replicas,
        degraded: idx > 0,
        warnings,
    })
}

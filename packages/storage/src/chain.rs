//! Ordered tier chains.
//!
//! A [`TierChain`] is the priority-ordered list of tiers holding one record
//! kind, strongest first. Its composition is fixed when it is built (see
//! [`Topology`](crate::Topology)); the engine operations always walk every
//! tier in order, whatever the last-known health, because availability can
//! change between calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use carledger::{Entity, MergePatch};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{self, Authoritative};
use crate::lister::{self, MergedList};
use crate::policy::ReconciliationPolicy;
use crate::propagator::{self, PatchResult};
use crate::reader::{self, Lookup, LookupResult};
use crate::remover::{self, DeleteResult, DeleteScope};
use crate::storage::{Durability, StorageError, TierStore};
use crate::writer::{self, WriteResult};

// ---------------------------------------------------------------------------
// TierDescriptor
// ---------------------------------------------------------------------------

/// Identity and last-observed health of one tier.
///
/// `reachable` is diagnostics only. It flips after every call based on
/// whether the tier answered, and is never consulted for routing.
#[derive(Debug)]
pub struct TierDescriptor {
    durability: Durability,
    reachable: AtomicBool,
}

impl TierDescriptor {
    pub fn new(durability: Durability) -> Self {
        Self {
            durability,
            reachable: AtomicBool::new(true),
        }
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    fn record(&self, reachable: bool) {
        let previous = self.reachable.swap(reachable, Ordering::Relaxed);
        if previous != reachable {
            if reachable {
                info!("tier {}: reachable again", self.durability.short_name());
            } else {
                warn!("tier {}: marked unreachable", self.durability.short_name());
            }
        }
    }
}

/// Snapshot of a tier's health, for diagnostics output.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TierStatus {
    pub tier: Durability,
    pub reachable: bool,
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// One backend in a chain.
pub struct Tier<T> {
    descriptor: TierDescriptor,
    store: Arc<dyn TierStore<T>>,
}

impl<T: Entity> Tier<T> {
    pub fn new(durability: Durability, store: Arc<dyn TierStore<T>>) -> Self {
        Self {
            descriptor: TierDescriptor::new(durability),
            store,
        }
    }

    pub fn durability(&self) -> Durability {
        self.descriptor.durability()
    }

    pub fn descriptor(&self) -> &TierDescriptor {
        &self.descriptor
    }

    pub fn store(&self) -> &dyn TierStore<T> {
        self.store.as_ref()
    }

    /// Update the health flag from an operation's outcome and pass it on.
    /// Only [`StorageError::Unavailable`] counts as unreachable; a conflict
    /// or a rejected patch means the tier did answer.
    pub(crate) fn observe<R>(&self, result: Result<R, StorageError>) -> Result<R, StorageError> {
        self.descriptor.record(!matches!(result, Err(StorageError::Unavailable(_))));
        result
    }
}

// ---------------------------------------------------------------------------
// TierChain
// ---------------------------------------------------------------------------

/// Priority-ordered tiers for records of type `T`, plus the policy used to
/// reconcile their views.
pub struct TierChain<T> {
    tiers: Vec<Tier<T>>,
    policy: ReconciliationPolicy<T>,
}

impl<T: Entity> TierChain<T> {
    /// An empty chain using the natural-key reconciliation policy. Every
    /// operation on an empty chain fails with
    /// [`StorageError::AllTiersFailed`].
    pub fn new() -> Self {
        Self {
            tiers: Vec::new(),
            policy: ReconciliationPolicy::natural_key(),
        }
    }

    /// Append a tier with lower priority than those already present.
    pub fn with_tier(mut self, durability: Durability, store: Arc<dyn TierStore<T>>) -> Self {
        self.tiers.push(Tier::new(durability, store));
        self
    }

    pub fn with_policy(mut self, policy: ReconciliationPolicy<T>) -> Self {
        self.policy = policy;
        self
    }

    pub fn tiers(&self) -> &[Tier<T>] {
        &self.tiers
    }

    pub fn policy(&self) -> &ReconciliationPolicy<T> {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Last-observed health of every tier, in priority order.
    pub fn status(&self) -> Vec<TierStatus> {
        self.tiers
            .iter()
            .map(|t| TierStatus {
                tier: t.durability(),
                reachable: t.descriptor().is_reachable(),
            })
            .collect()
    }

    /// Refresh every tier's health with a listing call and return it.
    pub async fn probe(&self) -> Vec<TierStatus> {
        for tier in &self.tiers {
            let _ = tier.observe(tier.store().list_all().await);
        }
        self.status()
    }

    // --- Engine operations --------------------------------------------------

    /// See [`reader::read`].
    pub async fn read(&self, lookup: &Lookup) -> Result<Option<LookupResult<T>>, StorageError> {
        reader::read(self, lookup).await
    }

    /// See [`lister::list_merged`].
    pub async fn list_merged(&self) -> Result<MergedList<T>, StorageError> {
        lister::list_merged(self).await
    }

    /// See [`writer::create`].
    pub async fn create(&self, record: &T) -> Result<WriteResult<T>, StorageError> {
        writer::create(self, record).await
    }

    /// See [`propagator::patch`].
    pub async fn patch(
        &self,
        lookup: &Lookup,
        patch: &MergePatch,
    ) -> Result<Option<PatchResult<T>>, StorageError> {
        propagator::patch(self, lookup, patch).await
    }

    /// See [`remover::delete`].
    pub async fn delete(
        &self,
        lookup: &Lookup,
        scope: DeleteScope,
    ) -> Result<Option<DeleteResult>, StorageError> {
        remover::delete(self, lookup, scope).await
    }

    /// See [`aggregate::aggregate`].
    pub async fn aggregate<R, F>(&self, fold: F) -> Result<Authoritative<R>, StorageError>
    where
        F: FnOnce(Vec<T>) -> R + Send,
        R: Send,
    {
        aggregate::aggregate(self, fold).await
    }
}

impl<T: Entity> Default for TierChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

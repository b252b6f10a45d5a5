//! Public surface for the `carledger-storage` crate.
//!
//! Records live in up to three tiers (remote database, local SQLite file,
//! process memory). Each record kind gets a [`TierChain`] ordering those
//! tiers strongest first, and the engine modules implement the cascade:
//!
//! | Module | Operation |
//! |--------|-----------|
//! | [`reader`] | Single-record lookup, first tier holding the record wins |
//! | [`lister`] | Union of every tier's listing, deduplicated by [`policy`] |
//! | [`writer`] | Create in the strongest available tier, copy to weaker ones |
//! | [`propagator`] | Patch the authoritative copy, then every other copy |
//! | [`remover`] | Delete from the serving tier or from every tier |
//! | [`aggregate`] | Fold one authoritative tier's full listing |
//!
//! [`Records`] wraps the chains for users, vehicles and expenses, and
//! [`Topology`] builds them from a [`StoreConfig`].

pub mod aggregate;
pub mod chain;
pub mod config;
pub mod error;
pub mod lister;
pub mod policy;
pub mod propagator;
pub mod reader;
pub mod records;
pub mod remover;
pub mod storage;
pub mod topology;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use aggregate::Authoritative;
pub use chain::{Tier, TierChain, TierDescriptor, TierStatus};
pub use config::{ConfigError, Environment, StoreConfig};
pub use error::{StorageError, TierFailure};
pub use lister::MergedList;
pub use policy::{KeyCollision, ReconciliationPolicy};
pub use propagator::PatchResult;
pub use reader::{Lookup, LookupResult};
pub use records::{degraded_notice, CategoryTotal, ExpenseSummary, Records};
pub use remover::{DeleteResult, DeleteScope};
pub use storage::memory::MemoryTier;
pub use storage::remote::{RemoteClient, RemoteTier};
pub use storage::sqlite::SqliteTier;
pub use storage::{Durability, TierStore};
pub use topology::Topology;
pub use writer::WriteResult;

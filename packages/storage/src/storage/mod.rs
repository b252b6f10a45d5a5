//! The per-backend storage contract and its three implementations.
//!
//! The [`TierStore`] trait is the uniform capability every physical backend
//! offers. It is deliberately narrow: create, point lookups, patch, delete,
//! and a full listing. Fallback, replication and merging live in the engine
//! modules, never in a tier.
//!
//! # Implementations
//!
//! | Type | Durability | When present |
//! |------|------------|--------------|
//! | [`RemoteTier`] | `durable-remote` | Production and development; unavailable when unconfigured |
//! | [`SqliteTier`] | `durable-local` | Development only |
//! | [`MemoryTier`] | `volatile-memory` | Every environment, last resort |
//!
//! # Failure contract
//!
//! "Not found" is never an error: lookups return `Ok(None)`, `delete`
//! returns `Ok(false)`. A backend that cannot answer (unreachable,
//! misconfigured, timed out, corrupt row) returns
//! [`StorageError::Unavailable`], which tells the engine to try the next
//! tier. A definitive constraint violation returns
//! [`StorageError::Conflict`], which stops the cascade.
//!
//! [`RemoteTier`]: remote::RemoteTier
//! [`SqliteTier`]: sqlite::SqliteTier
//! [`MemoryTier`]: memory::MemoryTier

pub mod memory;
pub mod remote;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use carledger::{Entity, MergePatch};
use serde::Serialize;

pub use crate::error::StorageError;

// ---------------------------------------------------------------------------
// Durability
// ---------------------------------------------------------------------------

/// Durability class of a tier. Chains are ordered strongest first.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Durability {
    DurableRemote,
    DurableLocal,
    VolatileMemory,
}

impl Durability {
    /// Short name used in logs and warnings (`"remote"`, `"local"`, `"memory"`).
    pub fn short_name(self) -> &'static str {
        match self {
            Durability::DurableRemote => "remote",
            Durability::DurableLocal => "local",
            Durability::VolatileMemory => "memory",
        }
    }
}

/// Formats the durability class as its kebab-case name (e.g. `"durable-local"`).
impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Durability::DurableRemote => write!(f, "durable-remote"),
            Durability::DurableLocal => write!(f, "durable-local"),
            Durability::VolatileMemory => write!(f, "volatile-memory"),
        }
    }
}

/// Accepts either the kebab-case class name or the short name.
impl FromStr for Durability {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "durable-remote" | "remote" => Ok(Durability::DurableRemote),
            "durable-local" | "local" => Ok(Durability::DurableLocal),
            "volatile-memory" | "memory" => Ok(Durability::VolatileMemory),
            _ => Err(format!(
                "unknown tier {s:?}; expected one of: remote, local, memory"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// TierStore trait
// ---------------------------------------------------------------------------

/// The persistence contract for one physical backend holding records of
/// type `T`.
///
/// Implementations must be `Send + Sync + 'static` so they can be held in an
/// `Arc<dyn TierStore<T>>` inside a [`TierChain`](crate::TierChain).
#[async_trait]
pub trait TierStore<T: Entity>: Send + Sync + 'static {
    /// Persist a new record, keeping its id. Returns
    /// [`StorageError::Conflict`] if this tier already holds a record with
    /// the same id or natural key.
    async fn create(&self, record: &T) -> Result<T, StorageError>;

    /// Retrieve a record by its opaque id. Returns `None` if absent.
    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StorageError>;

    /// Retrieve a record by its normalised natural key. Always `None` for
    /// kinds without one.
    async fn find_by_key(&self, key: &str) -> Result<Option<T>, StorageError>;

    /// Apply `patch` to this tier's copy of the record and return the
    /// result. Returns `None` if this tier does not hold the record.
    async fn update(&self, id: &str, patch: &MergePatch) -> Result<Option<T>, StorageError>;

    /// Remove a record. Returns `false` if this tier did not hold it.
    async fn delete(&self, id: &str) -> Result<bool, StorageError>;

    /// Every record in this tier, oldest first.
    async fn list_all(&self) -> Result<Vec<T>, StorageError>;
}

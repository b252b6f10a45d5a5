//! Error and failure-report types shared by the tiers and the engine.

use std::fmt;

use carledger::{PatchError, ValidationError};
use serde::Serialize;

use crate::storage::Durability;

/// One tier's failure, kept for observability.
///
/// Displays as `"remote: connection refused"`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TierFailure {
    pub tier: Durability,
    pub reason: String,
}

impl TierFailure {
    pub fn new(tier: Durability, reason: impl Into<String>) -> Self {
        Self {
            tier,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tier.short_name(), self.reason)
    }
}

fn join_failures(failures: &[TierFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that tiers and engine operations can return.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No tier holds the requested record.
    #[error("not found")]
    NotFound,

    /// The backend cannot answer right now. Tier-specific and transient:
    /// the engine moves on to the next tier.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A definitive constraint violation (e.g. duplicate natural key). Never
    /// cascades to weaker tiers.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The record or patch was rejected before any tier accepted it.
    #[error("invalid record: {0}")]
    Invalid(String),

    /// Every tier in the chain was unavailable.
    #[error("all tiers failed: {}", join_failures(.0))]
    AllTiersFailed(Vec<TierFailure>),
}

impl StorageError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<ValidationError> for StorageError {
    fn from(e: ValidationError) -> Self {
        StorageError::Invalid(e.to_string())
    }
}

impl From<PatchError> for StorageError {
    fn from(e: PatchError) -> Self {
        StorageError::Invalid(e.to_string())
    }
}

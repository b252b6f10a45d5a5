//! The [`Entity`] contract shared by every record kind the store persists.
//!
//! The storage tiers are generic over this trait: they only need a stable
//! opaque id, an optional natural key for cross-tier deduplication, a
//! creation timestamp, and a JSON representation.

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

use crate::validation::ValidationError;

/// A record that can be stored in any tier.
///
/// Implementations must serialise to a JSON object whose `id` and
/// `created_at` members mirror [`Entity::id`] and [`Entity::created_at`];
/// merge patches and the remote tier's column filters rely on those names.
pub trait Entity: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Collection (table) name used by the durable tiers, e.g. `"users"`.
    const COLLECTION: &'static str;

    /// JSON member holding the natural key, or `None` for list-only records.
    const KEY_FIELD: Option<&'static str>;

    /// Opaque identifier assigned at creation time.
    fn id(&self) -> &str;

    /// Normalised natural key, or `None` when the kind has none.
    fn natural_key(&self) -> Option<String>;

    /// RFC 3339 creation timestamp.
    fn created_at(&self) -> &str;

    /// Bring a caller-supplied key into the form stored in the tiers.
    fn normalize_key(raw: &str) -> String {
        raw.trim().to_string()
    }

    /// Check field-level invariants. Called before the first tier is touched
    /// and after every patch application.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

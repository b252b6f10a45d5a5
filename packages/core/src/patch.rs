//! Partial updates expressed as JSON merge patches (RFC 7386).
//!
//! A [`MergePatch`] is what travels through the storage tiers: each tier
//! reapplies it to its own copy of the record instead of receiving a full
//! replacement, so members a tier holds that the patch does not mention are
//! left alone. The typed builders ([`UserPatch`], [`ShopApplicationPatch`],
//! [`VehiclePatch`], [`ExpensePatch`]) convert into a `MergePatch`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::entity::Entity;
use crate::types::{ExpenseCategory, ShopStatus, UserType};
use crate::validation::ValidationError;

/// Members a patch may never change.
const IMMUTABLE_FIELDS: [&str; 2] = ["id", "created_at"];

/// Errors produced while applying a [`MergePatch`].
#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("field {0:?} cannot be changed by a patch")]
    ImmutableField(String),

    #[error("record did not serialise to a JSON object")]
    NotAnObject,

    #[error("patched record is malformed: {0}")]
    Malformed(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

// ---------------------------------------------------------------------------
// MergePatch
// ---------------------------------------------------------------------------

/// A set of top-level members to merge into a record.
///
/// Nested objects merge recursively; a `null` value removes the member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergePatch(Map<String, Value>);

impl MergePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a top-level member. Builder style.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of the top-level members this patch touches.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Apply the patch to `record`, returning the validated result.
    ///
    /// `id` and `created_at` may appear in the patch only with their current
    /// values.
    pub fn apply<T: Entity>(&self, record: &T) -> Result<T, PatchError> {
        let mut doc =
            serde_json::to_value(record).map_err(|e| PatchError::Malformed(e.to_string()))?;
        let obj = doc.as_object().ok_or(PatchError::NotAnObject)?;

        for field in IMMUTABLE_FIELDS {
            if let Some(v) = self.0.get(field) {
                if obj.get(field) != Some(v) {
                    return Err(PatchError::ImmutableField(field.to_string()));
                }
            }
        }

        merge_object(&mut doc, &self.0);
        normalize_key_field::<T>(&mut doc);

        let patched: T =
            serde_json::from_value(doc).map_err(|e| PatchError::Malformed(e.to_string()))?;
        patched.validate()?;
        Ok(patched)
    }
}

impl From<Map<String, Value>> for MergePatch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn merge_object(target: &mut Value, patch: &Map<String, Value>) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Some(obj) = target.as_object_mut() else {
        return;
    };
    for (key, value) in patch {
        match value {
            Value::Null => {
                obj.remove(key);
            }
            Value::Object(inner) => {
                let slot = obj.entry(key.clone()).or_insert(Value::Null);
                merge_object(slot, inner);
            }
            other => {
                obj.insert(key.clone(), other.clone());
            }
        }
    }
}

/// Store the natural-key member in the same form constructors do.
fn normalize_key_field<T: Entity>(doc: &mut Value) {
    let Some(field) = T::KEY_FIELD else {
        return;
    };
    if let Some(Value::String(raw)) = doc.get_mut(field) {
        *raw = T::normalize_key(raw);
    }
}

/// Serialise a typed patch builder, keeping only the members it sets.
fn to_patch<P: Serialize>(p: &P) -> MergePatch {
    match serde_json::to_value(p) {
        Ok(Value::Object(map)) => MergePatch(map),
        _ => MergePatch::default(),
    }
}

// ---------------------------------------------------------------------------
// Typed builders
// ---------------------------------------------------------------------------

/// Patchable members of a [`UserRecord`](crate::UserRecord).
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_application: Option<ShopApplicationPatch>,
}

impl From<UserPatch> for MergePatch {
    fn from(p: UserPatch) -> Self {
        to_patch(&p)
    }
}

/// Patchable members of the embedded
/// [`ShopApplication`](crate::ShopApplication).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShopApplicationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ShopStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
}

impl From<ShopApplicationPatch> for MergePatch {
    fn from(p: ShopApplicationPatch) -> Self {
        MergePatch::new().set("shop_application", Value::Object(to_patch(&p).0))
    }
}

/// Patchable members of a [`Vehicle`](crate::Vehicle).
#[derive(Debug, Clone, Default, Serialize)]
pub struct VehiclePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mileage_km: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_total_cents: Option<i64>,

    /// Free-form attributes; `null` removes one.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl From<VehiclePatch> for MergePatch {
    fn from(p: VehiclePatch) -> Self {
        to_patch(&p)
    }
}

/// Patchable members of an [`ExpenseEntry`](crate::ExpenseEntry).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpensePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ExpenseCategory>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mileage_km: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spent_on: Option<NaiveDate>,
}

impl From<ExpensePatch> for MergePatch {
    fn from(p: ExpensePatch) -> Self {
        to_patch(&p)
    }
}

//! Record types for the carledger store.
//!
//! This crate defines what the storage tiers persist: accounts with an
//! optional embedded shop application, vehicles, and expense entries, plus
//! the merge patches used to update them. It knows nothing about where the
//! records live; see the `carledger-storage` crate for that.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`entity`] | The [`Entity`] trait every stored record implements |
//! | [`types`] | [`UserRecord`], [`ShopApplication`], [`Vehicle`], [`ExpenseEntry`] and their enums |
//! | [`patch`] | [`MergePatch`] and the typed patch builders |
//! | [`validation`] | Field-level checks run before writes and after patches |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use carledger::{MergePatch, UserPatch, UserRecord, UserType};
//!
//! let user = UserRecord::new("Owner@Example.com", "Owner", "$argon2id$...");
//! assert_eq!(user.email, "owner@example.com");
//!
//! let patch: MergePatch = UserPatch {
//!     user_type: Some(UserType::Admin),
//!     ..Default::default()
//! }
//! .into();
//! let admin = patch.apply(&user)?;
//! ```

pub mod entity;
pub mod patch;
pub mod types;
pub mod validation;

pub use entity::Entity;
pub use patch::{
    ExpensePatch, MergePatch, PatchError, ShopApplicationPatch, UserPatch, VehiclePatch,
};
pub use types::{
    ExpenseCategory, ExpenseEntry, ShopApplication, ShopStatus, UserRecord, UserType, Vehicle,
};
pub use validation::{
    validate_expense, validate_user, validate_vehicle, ValidationError, MAX_AMOUNT_CENTS,
};

//! Record types persisted by the carledger store.
//!
//! Four kinds share the store: [`UserRecord`] (with an optional embedded
//! [`ShopApplication`]), [`Vehicle`], and [`ExpenseEntry`]. All of them
//! serialise as flat JSON objects with snake_case members. Fields a tier
//! knows about but this version of the types does not are kept in the
//! flattened `extensions`/`attributes` maps so they survive a round trip.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::Entity;
use crate::validation::{self, ValidationError};

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ---------------------------------------------------------------------------
// UserType
// ---------------------------------------------------------------------------

/// The role of an account.
///
/// Serialises as an upper-case string (e.g. `"ADMIN"`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    /// A vehicle owner tracking their own cars. Default.
    #[default]
    Customer,
    /// A repair shop whose application has been approved.
    Shop,
    /// An operator allowed to review shop applications.
    Admin,
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserType::Customer => write!(f, "CUSTOMER"),
            UserType::Shop => write!(f, "SHOP"),
            UserType::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Parses a [`UserType`], ignoring ASCII case.
impl FromStr for UserType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CUSTOMER" => Ok(UserType::Customer),
            "SHOP" => Ok(UserType::Shop),
            "ADMIN" => Ok(UserType::Admin),
            _ => Err(format!(
                "unknown user type {s:?}; expected one of: CUSTOMER, SHOP, ADMIN"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// ShopStatus / ShopApplication
// ---------------------------------------------------------------------------

/// Review state of a shop application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShopStatus {
    Pending,
    Approved,
    Rejected,
}

impl ShopStatus {
    /// Whether a reviewer may move an application from `self` to `next`.
    ///
    /// Allowed: `PENDING -> APPROVED`, `PENDING -> REJECTED`, and
    /// `REJECTED -> PENDING` (re-application). Approval is final.
    pub fn can_transition_to(self, next: ShopStatus) -> bool {
        matches!(
            (self, next),
            (ShopStatus::Pending, ShopStatus::Approved)
                | (ShopStatus::Pending, ShopStatus::Rejected)
                | (ShopStatus::Rejected, ShopStatus::Pending)
        )
    }
}

impl fmt::Display for ShopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShopStatus::Pending => write!(f, "PENDING"),
            ShopStatus::Approved => write!(f, "APPROVED"),
            ShopStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl FromStr for ShopStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ShopStatus::Pending),
            "APPROVED" | "APPROVE" => Ok(ShopStatus::Approved),
            "REJECTED" | "REJECT" => Ok(ShopStatus::Rejected),
            _ => Err(format!(
                "unknown shop status {s:?}; expected one of: PENDING, APPROVED, REJECTED"
            )),
        }
    }
}

/// A request by a user to be listed as a repair shop.
///
/// Embedded in the owning [`UserRecord`]; status transitions are merge
/// patches against the `shop_application` member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopApplication {
    pub shop_name: String,
    pub address: String,
    pub phone: String,

    /// Business registration number, when the applicant supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_number: Option<String>,

    pub status: ShopStatus,

    /// RFC 3339 timestamp of the (latest) application.
    pub applied_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
}

impl ShopApplication {
    /// A fresh `PENDING` application stamped with the current time.
    pub fn new(
        shop_name: impl Into<String>,
        address: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            shop_name: shop_name.into(),
            address: address.into(),
            phone: phone.into(),
            business_number: None,
            status: ShopStatus::Pending,
            applied_at: now_rfc3339(),
            reviewed_at: None,
            review_note: None,
        }
    }
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// An account. The natural key is the (lower-cased) email address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,

    #[serde(default)]
    pub user_type: UserType,

    /// Present once the user has applied to be listed as a shop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_application: Option<ShopApplication>,

    pub created_at: String,

    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl UserRecord {
    /// Create a customer account with a fresh UUIDv7 id and current timestamp.
    pub fn new(
        email: impl AsRef<str>,
        name: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            email: Self::normalize_key(email.as_ref()),
            password_hash: password_hash.into(),
            name: name.into(),
            user_type: UserType::Customer,
            shop_application: None,
            created_at: now_rfc3339(),
            extensions: Map::new(),
        }
    }
}

impl Entity for UserRecord {
    const COLLECTION: &'static str = "users";
    const KEY_FIELD: Option<&'static str> = Some("email");

    fn id(&self) -> &str {
        &self.id
    }

    fn natural_key(&self) -> Option<String> {
        Some(Self::normalize_key(&self.email))
    }

    fn created_at(&self) -> &str {
        &self.created_at
    }

    fn normalize_key(raw: &str) -> String {
        raw.trim().to_lowercase()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_user(self)
    }
}

// ---------------------------------------------------------------------------
// Vehicle
// ---------------------------------------------------------------------------

/// A car owned by a user. The natural key is the normalised license plate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: String,

    /// Id of the owning [`UserRecord`].
    pub owner_id: String,

    pub license_plate: String,
    pub make: String,
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default)]
    pub mileage_km: u64,

    /// Running total of maintenance spending, in minor currency units.
    #[serde(default)]
    pub maintenance_total_cents: i64,

    pub created_at: String,

    /// Free-form attributes (colour, fuel type, VIN, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Vehicle {
    pub fn new(
        owner_id: impl Into<String>,
        license_plate: impl AsRef<str>,
        make: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            owner_id: owner_id.into(),
            license_plate: Self::normalize_key(license_plate.as_ref()),
            make: make.into(),
            model: model.into(),
            year: None,
            mileage_km: 0,
            maintenance_total_cents: 0,
            created_at: now_rfc3339(),
            attributes: Map::new(),
        }
    }
}

impl Entity for Vehicle {
    const COLLECTION: &'static str = "vehicles";
    const KEY_FIELD: Option<&'static str> = Some("license_plate");

    fn id(&self) -> &str {
        &self.id
    }

    fn natural_key(&self) -> Option<String> {
        Some(Self::normalize_key(&self.license_plate))
    }

    fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Upper-case with whitespace and hyphens removed: `"12 ga-3456"` and
    /// `"12GA3456"` name the same car.
    fn normalize_key(raw: &str) -> String {
        raw.chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .flat_map(char::to_uppercase)
            .collect()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_vehicle(self)
    }
}

// ---------------------------------------------------------------------------
// ExpenseEntry
// ---------------------------------------------------------------------------

/// Spending category of an [`ExpenseEntry`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Fuel,
    Maintenance,
    Repair,
    Insurance,
    Tax,
    Parking,
    Toll,
    Wash,
    Other,
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExpenseCategory::Fuel => "fuel",
            ExpenseCategory::Maintenance => "maintenance",
            ExpenseCategory::Repair => "repair",
            ExpenseCategory::Insurance => "insurance",
            ExpenseCategory::Tax => "tax",
            ExpenseCategory::Parking => "parking",
            ExpenseCategory::Toll => "toll",
            ExpenseCategory::Wash => "wash",
            ExpenseCategory::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for ExpenseCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fuel" => Ok(ExpenseCategory::Fuel),
            "maintenance" => Ok(ExpenseCategory::Maintenance),
            "repair" => Ok(ExpenseCategory::Repair),
            "insurance" => Ok(ExpenseCategory::Insurance),
            "tax" => Ok(ExpenseCategory::Tax),
            "parking" => Ok(ExpenseCategory::Parking),
            "toll" => Ok(ExpenseCategory::Toll),
            "wash" => Ok(ExpenseCategory::Wash),
            "other" => Ok(ExpenseCategory::Other),
            _ => Err(format!(
                "unknown expense category {s:?}; expected one of: fuel, maintenance, \
                 repair, insurance, tax, parking, toll, wash, other"
            )),
        }
    }
}

/// A single spending entry against a vehicle. Has no natural key: entries
/// are listed by owner and car, and deduplicated across tiers by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseEntry {
    pub id: String,
    pub user_id: String,
    pub car_id: String,
    pub category: ExpenseCategory,

    /// Amount in minor currency units. Always positive.
    pub amount_cents: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Odometer reading at the time of the expense, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mileage_km: Option<u64>,

    pub spent_on: NaiveDate,
    pub created_at: String,

    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl ExpenseEntry {
    pub fn new(
        user_id: impl Into<String>,
        car_id: impl Into<String>,
        category: ExpenseCategory,
        amount_cents: i64,
        spent_on: NaiveDate,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            car_id: car_id.into(),
            category,
            amount_cents,
            description: None,
            mileage_km: None,
            spent_on,
            created_at: now_rfc3339(),
            extensions: Map::new(),
        }
    }
}

impl Entity for ExpenseEntry {
    const COLLECTION: &'static str = "expenses";
    const KEY_FIELD: Option<&'static str> = None;

    fn id(&self) -> &str {
        &self.id
    }

    fn natural_key(&self) -> Option<String> {
        None
    }

    fn created_at(&self) -> &str {
        &self.created_at
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_expense(self)
    }
}

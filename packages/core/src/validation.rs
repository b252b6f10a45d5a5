use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use thiserror::Error;

use crate::types::{ExpenseEntry, ShopApplication, UserRecord, Vehicle};

/// Largest amount a single expense may record, in minor currency units.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

/// Errors returned when a record fails field-level validation.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("id must be a UUID, got: {0:?}")]
    InvalidId(String),

    #[error("created_at must be a valid RFC 3339 date-time, got: {0:?}")]
    InvalidTimestamp(String),

    #[error("email address is not valid: {0:?}")]
    InvalidEmail(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("license plate {0:?} must be 2-16 letters or digits")]
    InvalidLicensePlate(String),

    #[error("model year {0} is out of range")]
    InvalidYear(i32),

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("amount {0} exceeds the per-expense limit of {MAX_AMOUNT_CENTS}")]
    AmountTooLarge(i64),

    #[error("maintenance total must not be negative, got {0}")]
    NegativeMaintenanceTotal(i64),
}

/// Validate a [`UserRecord`], including its embedded shop application.
pub fn validate_user(user: &UserRecord) -> Result<(), ValidationError> {
    validate_id(&user.id)?;

    if !EMAIL_RE.is_match(&user.email) {
        return Err(ValidationError::InvalidEmail(user.email.clone()));
    }
    if user.name.trim().is_empty() {
        return Err(ValidationError::EmptyField("name"));
    }
    if user.password_hash.is_empty() {
        return Err(ValidationError::EmptyField("password_hash"));
    }

    validate_timestamp(&user.created_at)?;

    if let Some(app) = &user.shop_application {
        validate_shop_application(app)?;
    }

    Ok(())
}

fn validate_shop_application(app: &ShopApplication) -> Result<(), ValidationError> {
    if app.shop_name.trim().is_empty() {
        return Err(ValidationError::EmptyField("shop_name"));
    }
    if app.address.trim().is_empty() {
        return Err(ValidationError::EmptyField("address"));
    }
    if app.phone.trim().is_empty() {
        return Err(ValidationError::EmptyField("phone"));
    }
    validate_timestamp(&app.applied_at)?;
    if let Some(reviewed_at) = &app.reviewed_at {
        validate_timestamp(reviewed_at)?;
    }
    Ok(())
}

/// Validate a [`Vehicle`].
pub fn validate_vehicle(vehicle: &Vehicle) -> Result<(), ValidationError> {
    validate_id(&vehicle.id)?;

    if vehicle.owner_id.is_empty() {
        return Err(ValidationError::EmptyField("owner_id"));
    }

    let plate = &vehicle.license_plate;
    let len = plate.chars().count();
    if !(2..=16).contains(&len) || !plate.chars().all(char::is_alphanumeric) {
        return Err(ValidationError::InvalidLicensePlate(plate.clone()));
    }

    if vehicle.make.trim().is_empty() {
        return Err(ValidationError::EmptyField("make"));
    }
    if vehicle.model.trim().is_empty() {
        return Err(ValidationError::EmptyField("model"));
    }

    if let Some(year) = vehicle.year {
        // One model year ahead of the calendar is normal for new cars.
        let latest = chrono::Utc::now().year() + 1;
        if !(1886..=latest).contains(&year) {
            return Err(ValidationError::InvalidYear(year));
        }
    }

    if vehicle.maintenance_total_cents < 0 {
        return Err(ValidationError::NegativeMaintenanceTotal(
            vehicle.maintenance_total_cents,
        ));
    }

    validate_timestamp(&vehicle.created_at)
}

/// Validate an [`ExpenseEntry`].
pub fn validate_expense(expense: &ExpenseEntry) -> Result<(), ValidationError> {
    validate_id(&expense.id)?;

    if expense.user_id.is_empty() {
        return Err(ValidationError::EmptyField("user_id"));
    }
    if expense.car_id.is_empty() {
        return Err(ValidationError::EmptyField("car_id"));
    }
    if expense.amount_cents <= 0 {
        return Err(ValidationError::NonPositiveAmount(expense.amount_cents));
    }
    if expense.amount_cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::AmountTooLarge(expense.amount_cents));
    }

    validate_timestamp(&expense.created_at)
}

// --- helpers -----------------------------------------------------------------

fn validate_id(id: &str) -> Result<(), ValidationError> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidId(id.to_string()))
}

fn validate_timestamp(s: &str) -> Result<(), ValidationError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidTimestamp(s.to_string()))
}

/// Deliberately loose: one `@`, no whitespace, a dot in the domain.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("invalid email regex")
});

// --- tests -------------------------------------------------------------------

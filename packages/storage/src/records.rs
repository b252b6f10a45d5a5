//! Typed record operations over one chain per record kind.
//!
//! [`Records`] is what applications use. Each method is a short
//! composition of the engine operations plus the cross-record rules:
//! vehicles need an existing owner, expenses need a vehicle owned by the
//! spender, and shop applications follow the review state machine in
//! [`ShopStatus::can_transition_to`].

use std::collections::BTreeMap;

use carledger::{
    Entity, ExpenseCategory, ExpenseEntry, ExpensePatch, MergePatch, ShopApplication,
    ShopApplicationPatch, ShopStatus, UserPatch, UserRecord, UserType, Vehicle, VehiclePatch,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::aggregate::Authoritative;
use crate::chain::{TierChain, TierStatus};
use crate::config::{Environment, StoreConfig};
use crate::error::TierFailure;
use crate::lister::MergedList;
use crate::propagator::PatchResult;
use crate::reader::{Lookup, LookupResult};
use crate::remover::{DeleteResult, DeleteScope};
use crate::storage::{Durability, StorageError};
use crate::topology::Topology;
use crate::writer::WriteResult;

// ---------------------------------------------------------------------------
// Expense summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CategoryTotal {
    pub total_cents: i64,
    pub count: usize,
}

/// Spending totals over one set of expenses.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ExpenseSummary {
    pub total_cents: i64,
    pub count: usize,
    pub by_category: BTreeMap<ExpenseCategory, CategoryTotal>,
}

impl ExpenseSummary {
    /// Sum `entries`. Fails with [`StorageError::Invalid`] if a total does
    /// not fit in an `i64`.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a ExpenseEntry>,
    ) -> Result<Self, StorageError> {
        let mut summary = Self::default();
        for e in entries {
            summary.total_cents = add_cents(summary.total_cents, e.amount_cents)?;
            summary.count += 1;
            let slot = summary.by_category.entry(e.category).or_default();
            slot.total_cents = add_cents(slot.total_cents, e.amount_cents)?;
            slot.count += 1;
        }
        Ok(summary)
    }
}

fn add_cents(total: i64, amount: i64) -> Result<i64, StorageError> {
    total
        .checked_add(amount)
        .ok_or_else(|| StorageError::Invalid(format!("total {total} + {amount} overflows")))
}

/// Amount an expense contributes to its vehicle's maintenance total.
fn maintenance_share(e: &ExpenseEntry) -> i64 {
    match e.category {
        ExpenseCategory::Maintenance | ExpenseCategory::Repair => e.amount_cents,
        _ => 0,
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One tier chain per record kind.
pub struct Records {
    users: TierChain<UserRecord>,
    vehicles: TierChain<Vehicle>,
    expenses: TierChain<ExpenseEntry>,
}

impl Records {
    pub fn new(
        users: TierChain<UserRecord>,
        vehicles: TierChain<Vehicle>,
        expenses: TierChain<ExpenseEntry>,
    ) -> Self {
        Self {
            users,
            vehicles,
            expenses,
        }
    }

    pub fn from_topology(topology: &Topology) -> Self {
        Self::new(topology.chain(), topology.chain(), topology.chain())
    }

    /// Build the chains `config` describes.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::from_topology(&Topology::from_config(config))
    }

    /// Memory-only chains, as used by the `test` environment.
    pub fn in_memory() -> Self {
        Self::from_config(&StoreConfig {
            environment: Environment::Test,
            ..StoreConfig::default()
        })
    }

    pub fn users(&self) -> &TierChain<UserRecord> {
        &self.users
    }

    pub fn vehicles(&self) -> &TierChain<Vehicle> {
        &self.vehicles
    }

    pub fn expenses(&self) -> &TierChain<ExpenseEntry> {
        &self.expenses
    }

    /// Refresh and report the health of every chain's tiers.
    pub async fn probe(&self) -> BTreeMap<&'static str, Vec<TierStatus>> {
        BTreeMap::from([
            (UserRecord::COLLECTION, self.users.probe().await),
            (Vehicle::COLLECTION, self.vehicles.probe().await),
            (ExpenseEntry::COLLECTION, self.expenses.probe().await),
        ])
    }

    // --- Users --------------------------------------------------------------

    pub async fn register_user(
        &self,
        user: &UserRecord,
    ) -> Result<WriteResult<UserRecord>, StorageError> {
        self.users.create(user).await
    }

    pub async fn user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<LookupResult<UserRecord>>, StorageError> {
        self.users.read(&Lookup::key(email)).await
    }

    pub async fn user_by_id(
        &self,
        id: &str,
    ) -> Result<Option<LookupResult<UserRecord>>, StorageError> {
        self.users.read(&Lookup::id(id)).await
    }

    pub async fn list_users(&self) -> Result<MergedList<UserRecord>, StorageError> {
        self.users.list_merged().await
    }

    pub async fn update_user(
        &self,
        id: &str,
        patch: UserPatch,
    ) -> Result<PatchResult<UserRecord>, StorageError> {
        self.users
            .patch(&Lookup::id(id), &patch.into())
            .await?
            .ok_or(StorageError::NotFound)
    }

    pub async fn delete_user(
        &self,
        id: &str,
        scope: DeleteScope,
    ) -> Result<DeleteResult, StorageError> {
        self.users
            .delete(&Lookup::id(id), scope)
            .await?
            .ok_or(StorageError::NotFound)
    }

    // --- Shop applications --------------------------------------------------

    /// File (or re-file, after a rejection) a shop application. The stored
    /// application is always `PENDING` and carries no review fields.
    pub async fn apply_for_shop(
        &self,
        user_id: &str,
        application: ShopApplication,
    ) -> Result<PatchResult<UserRecord>, StorageError> {
        let user = self.user_by_id(user_id).await?.ok_or(StorageError::NotFound)?;
        if let Some(current) = &user.record.shop_application {
            if !current.status.can_transition_to(ShopStatus::Pending) {
                return Err(StorageError::Conflict(format!(
                    "user {user_id} already has a {} shop application",
                    current.status
                )));
            }
        }

        let application = ShopApplication {
            status: ShopStatus::Pending,
            applied_at: now_rfc3339(),
            reviewed_at: None,
            review_note: None,
            ..application
        };
        let mut fields = match serde_json::to_value(&application) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                return Err(StorageError::Invalid(
                    "shop application is not a JSON object".into(),
                ))
            }
        };
        // Clear what a previous application may have left behind.
        for field in ["business_number", "reviewed_at", "review_note"] {
            fields.entry(field).or_insert(Value::Null);
        }

        let patch = MergePatch::new().set("shop_application", Value::Object(fields));
        self.users
            .patch(&Lookup::id(user_id), &patch)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Move a shop application to `decision`. Approval also makes the
    /// applicant a [`UserType::Shop`].
    pub async fn review_shop_application(
        &self,
        user_id: &str,
        decision: ShopStatus,
        note: Option<String>,
    ) -> Result<PatchResult<UserRecord>, StorageError> {
        let user = self.user_by_id(user_id).await?.ok_or(StorageError::NotFound)?;
        let Some(current) = &user.record.shop_application else {
            return Err(StorageError::Conflict(format!(
                "user {user_id} has no shop application"
            )));
        };
        if !current.status.can_transition_to(decision) {
            return Err(StorageError::Conflict(format!(
                "shop application cannot move from {} to {decision}",
                current.status
            )));
        }

        let patch = UserPatch {
            user_type: (decision == ShopStatus::Approved).then_some(UserType::Shop),
            shop_application: Some(ShopApplicationPatch {
                status: Some(decision),
                reviewed_at: Some(now_rfc3339()),
                review_note: note,
                ..Default::default()
            }),
            ..Default::default()
        };
        self.update_user(user_id, patch).await
    }

    /// Users holding an application, optionally only those in `status`.
    pub async fn list_shop_applications(
        &self,
        status: Option<ShopStatus>,
    ) -> Result<MergedList<UserRecord>, StorageError> {
        Ok(self.list_users().await?.filter(|u| {
            u.shop_application
                .as_ref()
                .is_some_and(|app| status.is_none_or(|s| app.status == s))
        }))
    }

    // --- Vehicles -----------------------------------------------------------

    /// Register a vehicle. Its owner must exist.
    pub async fn add_vehicle(
        &self,
        vehicle: &Vehicle,
    ) -> Result<WriteResult<Vehicle>, StorageError> {
        if self.user_by_id(&vehicle.owner_id).await?.is_none() {
            return Err(StorageError::Invalid(format!(
                "owner {} does not exist",
                vehicle.owner_id
            )));
        }
        self.vehicles.create(vehicle).await
    }

    pub async fn vehicle_by_plate(
        &self,
        plate: &str,
    ) -> Result<Option<LookupResult<Vehicle>>, StorageError> {
        self.vehicles.read(&Lookup::key(plate)).await
    }

    pub async fn vehicle_by_id(
        &self,
        id: &str,
    ) -> Result<Option<LookupResult<Vehicle>>, StorageError> {
        self.vehicles.read(&Lookup::id(id)).await
    }

    pub async fn list_vehicles(
        &self,
        owner_id: Option<&str>,
    ) -> Result<MergedList<Vehicle>, StorageError> {
        Ok(self
            .vehicles
            .list_merged()
            .await?
            .filter(|v| owner_id.is_none_or(|owner| v.owner_id == owner)))
    }

    pub async fn update_vehicle(
        &self,
        id: &str,
        patch: VehiclePatch,
    ) -> Result<PatchResult<Vehicle>, StorageError> {
        self.vehicles
            .patch(&Lookup::id(id), &patch.into())
            .await?
            .ok_or(StorageError::NotFound)
    }

    pub async fn delete_vehicle(
        &self,
        id: &str,
        scope: DeleteScope,
    ) -> Result<DeleteResult, StorageError> {
        self.vehicles
            .delete(&Lookup::id(id), scope)
            .await?
            .ok_or(StorageError::NotFound)
    }

    // --- Expenses -----------------------------------------------------------

    /// Record an expense against a vehicle owned by the spender.
    /// Maintenance and repair amounts are added to the vehicle's running
    /// total.
    pub async fn add_expense(
        &self,
        expense: &ExpenseEntry,
    ) -> Result<WriteResult<ExpenseEntry>, StorageError> {
        let vehicle = self
            .vehicle_by_id(&expense.car_id)
            .await?
            .ok_or_else(|| {
                StorageError::Invalid(format!("vehicle {} does not exist", expense.car_id))
            })?;
        if vehicle.record.owner_id != expense.user_id {
            return Err(StorageError::Invalid(format!(
                "vehicle {} does not belong to user {}",
                expense.car_id, expense.user_id
            )));
        }

        add_cents(
            vehicle.record.maintenance_total_cents,
            maintenance_share(expense),
        )?;

        let written = self.expenses.create(expense).await?;
        self.adjust_maintenance_total(&expense.car_id, maintenance_share(&written.record))
            .await;
        Ok(written)
    }

    pub async fn expense_by_id(
        &self,
        id: &str,
    ) -> Result<Option<LookupResult<ExpenseEntry>>, StorageError> {
        self.expenses.read(&Lookup::id(id)).await
    }

    /// A user's expenses, optionally for one vehicle, oldest first.
    pub async fn list_expenses(
        &self,
        user_id: &str,
        car_id: Option<&str>,
    ) -> Result<MergedList<ExpenseEntry>, StorageError> {
        let mut list = self.expenses.list_merged().await?.filter(|e| {
            e.user_id == user_id && car_id.is_none_or(|car| e.car_id == car)
        });
        list.items
            .sort_by(|a, b| (a.spent_on, &a.created_at).cmp(&(b.spent_on, &b.created_at)));
        Ok(list)
    }

    /// Spending totals computed from the authoritative tier only.
    pub async fn expense_summary(
        &self,
        user_id: &str,
        car_id: Option<&str>,
    ) -> Result<Authoritative<ExpenseSummary>, StorageError> {
        let computed = self
            .expenses
            .aggregate(|entries| {
                ExpenseSummary::from_entries(entries.iter().filter(|e| {
                    e.user_id == user_id && car_id.is_none_or(|car| e.car_id == car)
                }))
            })
            .await?;
        Ok(Authoritative {
            value: computed.value?,
            served_by: computed.served_by,
            warnings: computed.warnings,
        })
    }

    pub async fn update_expense(
        &self,
        id: &str,
        patch: ExpensePatch,
    ) -> Result<PatchResult<ExpenseEntry>, StorageError> {
        let before = self.expense_by_id(id).await?.ok_or(StorageError::NotFound)?;
        let updated = self
            .expenses
            .patch(&Lookup::id(id), &patch.into())
            .await?
            .ok_or(StorageError::NotFound)?;
        let delta = maintenance_share(&updated.record) - maintenance_share(&before.record);
        self.adjust_maintenance_total(&updated.record.car_id, delta)
            .await;
        Ok(updated)
    }

    pub async fn delete_expense(
        &self,
        id: &str,
        scope: DeleteScope,
    ) -> Result<DeleteResult, StorageError> {
        let before = self.expense_by_id(id).await?.ok_or(StorageError::NotFound)?;
        let deleted = self
            .expenses
            .delete(&Lookup::id(id), scope)
            .await?
            .ok_or(StorageError::NotFound)?;
        self.adjust_maintenance_total(&before.record.car_id, -maintenance_share(&before.record))
            .await;
        Ok(deleted)
    }

    /// Best-effort: the expense write already succeeded, so a failure here
    /// is only logged.
    async fn adjust_maintenance_total(&self, car_id: &str, delta: i64) {
        if delta == 0 {
            return;
        }
        let vehicle = match self.vehicle_by_id(car_id).await {
            Ok(Some(found)) => found.record,
            Ok(None) => {
                warn!("vehicles: {car_id} gone, maintenance total not adjusted");
                return;
            }
            Err(e) => {
                warn!("vehicles: maintenance total for {car_id} not adjusted: {e}");
                return;
            }
        };
        let total = match add_cents(vehicle.maintenance_total_cents, delta) {
            Ok(total) => total.max(0),
            Err(e) => {
                warn!("vehicles: maintenance total for {car_id} not adjusted: {e}");
                return;
            }
        };
        let patch = VehiclePatch {
            maintenance_total_cents: Some(total),
            ..Default::default()
        };
        if let Err(e) = self.update_vehicle(car_id, patch).await {
            warn!("vehicles: maintenance total for {car_id} not adjusted: {e}");
        }
    }
}

/// Tiers named in a result's warnings, for one-line degraded-write notices.
pub fn degraded_notice(source: Durability, failures: &[TierFailure]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    let failed: Vec<String> = failures.iter().map(ToString::to_string).collect();
    Some(format!(
        "served by {} tier; {}",
        source.short_name(),
        failed.join("; ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    async fn owner_with_car(records: &Records) -> (UserRecord, Vehicle) {
        let user = UserRecord::new("owner@example.com", "Owner", "hash");
        records.register_user(&user).await.unwrap();
        let car = Vehicle::new(&user.id, "12가 3456", "Hyundai", "Avante");
        records.add_vehicle(&car).await.unwrap();
        (user, car)
    }

    #[tokio::test]
    async fn shop_application_lifecycle() {
        let records = Records::in_memory();
        let user = UserRecord::new("shop@example.com", "Kim", "hash");
        records.register_user(&user).await.unwrap();

        let applied = records
            .apply_for_shop(&user.id, ShopApplication::new("Kim Motors", "1 Main St", "010-1"))
            .await
            .unwrap();
        let app = applied.record.shop_application.unwrap();
        assert_eq!(app.status, ShopStatus::Pending);

        let err = records
            .apply_for_shop(&user.id, ShopApplication::new("Again", "2 Main St", "010-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let rejected = records
            .review_shop_application(&user.id, ShopStatus::Rejected, Some("no licence".into()))
            .await
            .unwrap();
        let app = rejected.record.shop_application.unwrap();
        assert_eq!(app.status, ShopStatus::Rejected);
        assert_eq!(app.review_note.as_deref(), Some("no licence"));
        assert_eq!(rejected.record.user_type, UserType::Customer);

        let reapplied = records
            .apply_for_shop(&user.id, ShopApplication::new("Kim Motors", "1 Main St", "010-1"))
            .await
            .unwrap();
        let app = reapplied.record.shop_application.unwrap();
        assert_eq!(app.status, ShopStatus::Pending);
        assert!(app.review_note.is_none());
        assert!(app.reviewed_at.is_none());

        let approved = records
            .review_shop_application(&user.id, ShopStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(approved.record.user_type, UserType::Shop);

        let err = records
            .review_shop_application(&user.id, ShopStatus::Rejected, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn review_without_application_conflicts() {
        let records = Records::in_memory();
        let user = UserRecord::new("a@example.com", "A", "hash");
        records.register_user(&user).await.unwrap();
        let err = records
            .review_shop_application(&user.id, ShopStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn lists_applications_by_status() {
        let records = Records::in_memory();
        for (email, status) in [
            ("p@example.com", None),
            ("q@example.com", Some(ShopStatus::Approved)),
            ("r@example.com", Some(ShopStatus::Pending)),
        ] {
            let user = UserRecord::new(email, "U", "hash");
            records.register_user(&user).await.unwrap();
            if let Some(status) = status {
                records
                    .apply_for_shop(&user.id, ShopApplication::new("Shop", "Addr", "010"))
                    .await
                    .unwrap();
                if status == ShopStatus::Approved {
                    records
                        .review_shop_application(&user.id, status, None)
                        .await
                        .unwrap();
                }
            }
        }

        let all = records.list_shop_applications(None).await.unwrap();
        assert_eq!(all.items.len(), 2);
        let pending = records
            .list_shop_applications(Some(ShopStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.items.len(), 1);
        assert_eq!(pending.items[0].email, "r@example.com");
    }

    #[tokio::test]
    async fn vehicle_needs_existing_owner() {
        let records = Records::in_memory();
        let err = records
            .add_vehicle(&Vehicle::new("nobody", "34나 5678", "Kia", "K5"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));
    }

    #[tokio::test]
    async fn vehicle_lookup_by_plate_normalises() {
        let records = Records::in_memory();
        let (user, car) = owner_with_car(&records).await;
        let found = records.vehicle_by_plate("12가3456").await.unwrap().unwrap();
        assert_eq!(found.record.id, car.id);

        let duplicate = Vehicle::new(&user.id, "12가-3456", "Kia", "Ray");
        let err = records.add_vehicle(&duplicate).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let mine = records.list_vehicles(Some(&user.id)).await.unwrap();
        assert_eq!(mine.items.len(), 1);
        assert!(records
            .list_vehicles(Some("someone-else"))
            .await
            .unwrap()
            .items
            .is_empty());
    }

    #[tokio::test]
    async fn expense_must_match_vehicle_owner() {
        let records = Records::in_memory();
        let (_, car) = owner_with_car(&records).await;
        let stranger = UserRecord::new("stranger@example.com", "S", "hash");
        records.register_user(&stranger).await.unwrap();

        let e = ExpenseEntry::new(&stranger.id, &car.id, ExpenseCategory::Fuel, 1000, day(1));
        let err = records.add_expense(&e).await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));

        let e = ExpenseEntry::new(&stranger.id, "no-car", ExpenseCategory::Fuel, 1000, day(1));
        let err = records.add_expense(&e).await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));
    }

    #[tokio::test]
    async fn expenses_sorted_and_summarised() {
        let records = Records::in_memory();
        let (user, car) = owner_with_car(&records).await;

        let late = ExpenseEntry::new(&user.id, &car.id, ExpenseCategory::Fuel, 6000, day(20));
        let early = ExpenseEntry::new(&user.id, &car.id, ExpenseCategory::Repair, 15000, day(2));
        let mid = ExpenseEntry::new(&user.id, &car.id, ExpenseCategory::Fuel, 4000, day(10));
        for e in [&late, &early, &mid] {
            records.add_expense(e).await.unwrap();
        }

        let list = records.list_expenses(&user.id, Some(&car.id)).await.unwrap();
        let ids: Vec<_> = list.items.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![early.id.clone(), mid.id.clone(), late.id.clone()]);

        let summary = records.expense_summary(&user.id, None).await.unwrap();
        assert_eq!(summary.served_by, Durability::VolatileMemory);
        assert_eq!(summary.value.total_cents, 25000);
        assert_eq!(summary.value.count, 3);
        assert_eq!(
            summary.value.by_category[&ExpenseCategory::Fuel],
            CategoryTotal {
                total_cents: 10000,
                count: 2
            }
        );
    }

    #[test]
    fn summary_overflow_is_invalid() {
        let big = ExpenseEntry::new("u", "c", ExpenseCategory::Fuel, i64::MAX, day(1));
        let one = ExpenseEntry::new("u", "c", ExpenseCategory::Fuel, 1, day(2));
        let err = ExpenseSummary::from_entries([&big, &one]).unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));
    }

    #[tokio::test]
    async fn oversized_expense_is_rejected() {
        let records = Records::in_memory();
        let (user, car) = owner_with_car(&records).await;

        let huge = ExpenseEntry::new(&user.id, &car.id, ExpenseCategory::Repair, i64::MAX, day(1));
        let err = records.add_expense(&huge).await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));
        assert_eq!(maintenance_total(&records, &car.id).await, 0);

        let one = ExpenseEntry::new(&user.id, &car.id, ExpenseCategory::Repair, 1, day(2));
        records.add_expense(&one).await.unwrap();
        let summary = records.expense_summary(&user.id, None).await.unwrap();
        assert_eq!(summary.value.total_cents, 1);
    }

    #[tokio::test]
    async fn maintenance_total_overflow_rejected_before_write() {
        let records = Records::in_memory();
        let user = UserRecord::new("fleet@example.com", "Fleet", "hash");
        records.register_user(&user).await.unwrap();
        let mut car = Vehicle::new(&user.id, "99다 9999", "Hyundai", "Porter");
        car.maintenance_total_cents = i64::MAX - 10;
        records.add_vehicle(&car).await.unwrap();

        let repair = ExpenseEntry::new(&user.id, &car.id, ExpenseCategory::Repair, 100, day(5));
        let err = records.add_expense(&repair).await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));

        assert!(records
            .list_expenses(&user.id, None)
            .await
            .unwrap()
            .items
            .is_empty());
        assert_eq!(maintenance_total(&records, &car.id).await, i64::MAX - 10);
    }

    async fn maintenance_total(records: &Records, car_id: &str) -> i64 {
        records
            .vehicle_by_id(car_id)
            .await
            .unwrap()
            .unwrap()
            .record
            .maintenance_total_cents
    }

    #[tokio::test]
    async fn maintenance_total_follows_expenses() {
        let records = Records::in_memory();
        let (user, car) = owner_with_car(&records).await;

        let repair = ExpenseEntry::new(&user.id, &car.id, ExpenseCategory::Repair, 20000, day(3));
        records.add_expense(&repair).await.unwrap();
        let fuel = ExpenseEntry::new(&user.id, &car.id, ExpenseCategory::Fuel, 5000, day(4));
        records.add_expense(&fuel).await.unwrap();
        assert_eq!(maintenance_total(&records, &car.id).await, 20000);

        records
            .update_expense(
                &repair.id,
                ExpensePatch {
                    amount_cents: Some(25000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(maintenance_total(&records, &car.id).await, 25000);

        records
            .delete_expense(&repair.id, DeleteScope::EveryTier)
            .await
            .unwrap();
        assert_eq!(maintenance_total(&records, &car.id).await, 0);
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let records = Records::in_memory();
        assert!(matches!(
            records.update_user("nope", UserPatch::default()).await,
            Err(StorageError::Invalid(_))
        ));
        let patch = UserPatch {
            name: Some("X".into()),
            ..Default::default()
        };
        assert!(matches!(
            records.update_user("nope", patch).await,
            Err(StorageError::NotFound)
        ));
        assert!(matches!(
            records.delete_vehicle("nope", DeleteScope::default()).await,
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn degraded_notice_names_tiers() {
        assert_eq!(degraded_notice(Durability::DurableRemote, &[]), None);
        let notice = degraded_notice(
            Durability::DurableLocal,
            &[TierFailure::new(Durability::DurableRemote, "timeout")],
        )
        .unwrap();
        assert_eq!(notice, "served by local tier; remote: timeout");
    }
}

//! Reconciliation of per-tier listings into one view.

use std::collections::{HashMap, HashSet};

use carledger::Entity;
use serde::Serialize;

use crate::storage::Durability;

/// Two different records sharing one natural key across tiers. The record
/// from the stronger tier is kept; the other is shadowed until someone
/// repairs the divergence.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KeyCollision {
    pub key: String,
    pub kept_id: String,
    pub kept_from: Durability,
    pub shadowed_id: String,
    pub shadowed_from: Durability,
}

/// Decides which records from a multi-tier listing are the same logical
/// record.
///
/// A record is a duplicate when its id, or its dedup key, was already seen
/// in an earlier (stronger) tier or earlier in the same tier. The first
/// occurrence wins, so tier priority decides and order within a tier is
/// preserved.
pub struct ReconciliationPolicy<T> {
    key: fn(&T) -> Option<String>,
}

impl<T: Entity> ReconciliationPolicy<T> {
    /// Deduplicate by [`Entity::natural_key`], falling back to the id for
    /// kinds without one.
    pub fn natural_key() -> Self {
        Self {
            key: T::natural_key,
        }
    }

    /// Deduplicate on ids alone.
    pub fn by_id() -> Self {
        Self { key: |_| None }
    }

    /// Deduplicate with a custom key extractor.
    pub fn with_key(key: fn(&T) -> Option<String>) -> Self {
        Self { key }
    }

    /// The key used to recognise a record, if the policy has one for it.
    pub fn key_of(&self, record: &T) -> Option<String> {
        (self.key)(record)
    }

    /// Merge per-tier listings given in priority order.
    pub fn merge(&self, per_tier: Vec<(Durability, Vec<T>)>) -> (Vec<T>, Vec<KeyCollision>) {
        let mut items = Vec::new();
        let mut collisions = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        // key -> (id, tier) of the kept record
        let mut seen_keys: HashMap<String, (String, Durability)> = HashMap::new();

        for (tier, records) in per_tier {
            for record in records {
                if seen_ids.contains(record.id()) {
                    continue;
                }
                let key = self.key_of(&record);
                if let Some(key) = &key {
                    if let Some((kept_id, kept_from)) = seen_keys.get(key) {
                        collisions.push(KeyCollision {
                            key: key.clone(),
                            kept_id: kept_id.clone(),
                            kept_from: *kept_from,
                            shadowed_id: record.id().to_string(),
                            shadowed_from: tier,
                        });
                        seen_ids.insert(record.id().to_string());
                        continue;
                    }
                }
                seen_ids.insert(record.id().to_string());
                if let Some(key) = key {
                    seen_keys.insert(key, (record.id().to_string(), tier));
                }
                items.push(record);
            }
        }
        (items, collisions)
    }
}

impl<T: Entity> Default for ReconciliationPolicy<T> {
    fn default() -> Self {
        Self::natural_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carledger::{ExpenseCategory, ExpenseEntry, MergePatch, UserRecord};
    use chrono::NaiveDate;

    fn user(email: &str, name: &str) -> UserRecord {
        UserRecord::new(email, name, "hash")
    }

    #[test]
    fn stronger_tier_wins_on_key() {
        let remote = user("a@example.com", "Remote");
        let local = user("a@example.com", "Local");
        let other = user("b@example.com", "Other");

        let (items, collisions) = ReconciliationPolicy::natural_key().merge(vec![
            (Durability::DurableRemote, vec![remote.clone()]),
            (Durability::DurableLocal, vec![local.clone(), other.clone()]),
        ]);

        let names: Vec<_> = items.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Remote", "Other"]);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].kept_id, remote.id);
        assert_eq!(collisions[0].shadowed_id, local.id);
        assert_eq!(collisions[0].shadowed_from, Durability::DurableLocal);
    }

    #[test]
    fn replicas_are_not_collisions() {
        let u = user("a@example.com", "Same");
        let (items, collisions) = ReconciliationPolicy::natural_key().merge(vec![
            (Durability::DurableLocal, vec![u.clone()]),
            (Durability::VolatileMemory, vec![u.clone()]),
        ]);
        assert_eq!(items.len(), 1);
        assert!(collisions.is_empty());
    }

    #[test]
    fn replica_with_diverged_key_is_still_one_record() {
        let u = user("a@example.com", "Same");
        let renamed = MergePatch::new().set("email", "z@example.com").apply(&u).unwrap();
        let (items, _) = ReconciliationPolicy::natural_key().merge(vec![
            (Durability::DurableRemote, vec![renamed]),
            (Durability::DurableLocal, vec![u]),
        ]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].email, "z@example.com");
    }

    #[test]
    fn keyless_records_dedup_by_id() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let a = ExpenseEntry::new("u", "c", ExpenseCategory::Fuel, 5000, day);
        let b = ExpenseEntry::new("u", "c", ExpenseCategory::Fuel, 5000, day);
        let (items, collisions) = ReconciliationPolicy::natural_key().merge(vec![
            (Durability::DurableRemote, vec![a.clone()]),
            (Durability::VolatileMemory, vec![a.clone(), b.clone()]),
        ]);
        let ids: Vec<_> = items.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!(collisions.is_empty());
    }

    #[test]
    fn shadowed_record_in_weaker_tiers_is_reported_once() {
        let remote = user("a@example.com", "Remote");
        let local = user("a@example.com", "Local");
        let (items, collisions) = ReconciliationPolicy::natural_key().merge(vec![
            (Durability::DurableRemote, vec![remote.clone()]),
            (Durability::DurableLocal, vec![local.clone()]),
            (Durability::VolatileMemory, vec![local.clone()]),
        ]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, remote.id);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].shadowed_from, Durability::DurableLocal);
    }

    #[test]
    fn first_within_tier_is_kept() {
        let first = user("a@example.com", "First");
        let second = user("a@example.com", "Second");
        let (items, collisions) = ReconciliationPolicy::natural_key()
            .merge(vec![(Durability::DurableRemote, vec![first, second])]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "First");
        assert_eq!(collisions.len(), 1);
    }
}

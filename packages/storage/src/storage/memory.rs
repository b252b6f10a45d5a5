//! In-memory tier.
//!
//! All data is held in RAM behind a [`RwLock`] and is lost when the process
//! exits. One instance per record kind is created when the chain is built
//! and injected into it; nothing is shared implicitly between instances.
//!
//! Records are stored in a [`BTreeMap`] keyed by UUIDv7 id. Because UUIDv7
//! ids sort lexicographically in creation order, `list_all` is simply an
//! in-order walk. A second map indexes natural keys.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use carledger::{Entity, MergePatch};

use super::{StorageError, TierStore};

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct Inner<T> {
    records: BTreeMap<String, T>,
    /// Natural key -> id.
    keys: HashMap<String, String>,
}

impl<T> Inner<T> {
    fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryTier
// ---------------------------------------------------------------------------

/// Thread-safe, in-memory implementation of [`TierStore`].
pub struct MemoryTier<T> {
    inner: RwLock<Inner<T>>,
}

impl<T: Entity> MemoryTier<T> {
    /// An empty tier.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
        }
    }

    /// Number of records held. Counts through a poisoned lock, where
    /// the trait operations report `Unavailable`.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner<T>>, StorageError> {
        self.inner
            .read()
            .map_err(|_| StorageError::Unavailable("memory tier lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner<T>>, StorageError> {
        self.inner
            .write()
            .map_err(|_| StorageError::Unavailable("memory tier lock poisoned".into()))
    }
}

impl<T: Entity> Default for MemoryTier<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TierStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl<T: Entity> TierStore<T> for MemoryTier<T> {
    async fn create(&self, record: &T) -> Result<T, StorageError> {
        let mut inner = self.write()?;
        if inner.records.contains_key(record.id()) {
            return Err(StorageError::Conflict(format!(
                "{} {} already exists",
                T::COLLECTION,
                record.id()
            )));
        }
        if let Some(key) = record.natural_key() {
            if inner.keys.contains_key(&key) {
                return Err(StorageError::Conflict(format!(
                    "{} with key {key:?} already exists",
                    T::COLLECTION
                )));
            }
            inner.keys.insert(key, record.id().to_string());
        }
        inner
            .records
            .insert(record.id().to_string(), record.clone());
        Ok(record.clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StorageError> {
        let inner = self.read()?;
        Ok(inner.records.get(id).cloned())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<T>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .keys
            .get(key)
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    async fn update(&self, id: &str, patch: &MergePatch) -> Result<Option<T>, StorageError> {
        let mut inner = self.write()?;
        let Some(current) = inner.records.get(id) else {
            return Ok(None);
        };

        let old_key = current.natural_key();
        let updated = patch.apply(current)?;
        let new_key = updated.natural_key();

        if new_key != old_key {
            if let Some(key) = &new_key {
                if inner.keys.get(key).is_some_and(|owner| owner != id) {
                    return Err(StorageError::Conflict(format!(
                        "{} with key {key:?} already exists",
                        T::COLLECTION
                    )));
                }
            }
            if let Some(key) = old_key {
                inner.keys.remove(&key);
            }
            if let Some(key) = new_key {
                inner.keys.insert(key, id.to_string());
            }
        }

        inner.records.insert(id.to_string(), updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut inner = self.write()?;
        match inner.records.remove(id) {
            Some(removed) => {
                if let Some(key) = removed.natural_key() {
                    inner.keys.remove(&key);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_all(&self) -> Result<Vec<T>, StorageError> {
        let inner = self.read()?;
        Ok(inner.records.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

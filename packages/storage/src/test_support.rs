use async_trait::async_trait;
use carledger::{Entity, MergePatch};

use crate::storage::{StorageError, TierStore};

/// A tier that never answers.
pub struct Offline;

fn down() -> StorageError {
    StorageError::Unavailable("connection refused".into())
}

#[async_trait]
impl<T: Entity> TierStore<T> for Offline {
    async fn create(&self, _record: &T) -> Result<T, StorageError> {
        Err(down())
    }

    async fn find_by_id(&self, _id: &str) -> Result<Option<T>, StorageError> {
        Err(down())
    }

    async fn find_by_key(&self, _key: &str) -> Result<Option<T>, StorageError> {
        Err(down())
    }

    async fn update(&self, _id: &str, _patch: &MergePatch) -> Result<Option<T>, StorageError> {
        Err(down())
    }

    async fn delete(&self, _id: &str) -> Result<bool, StorageError> {
        Err(down())
    }

    async fn list_all(&self) -> Result<Vec<T>, StorageError> {
        Err(down())
    }
}

/// A tier that answers lookups (always empty) but cannot accept writes.
pub struct ReadOnly;

#[async_trait]
impl<T: Entity> TierStore<T> for ReadOnly {
    async fn create(&self, _record: &T) -> Result<T, StorageError> {
        Err(StorageError::Unavailable("read-only replica".into()))
    }

    async fn find_by_id(&self, _id: &str) -> Result<Option<T>, StorageError> {
        Ok(None)
    }

    async fn find_by_key(&self, _key: &str) -> Result<Option<T>, StorageError> {
        Ok(None)
    }

    async fn update(&self, _id: &str, _patch: &MergePatch) -> Result<Option<T>, StorageError> {
        Ok(None)
    }

    async fn delete(&self, _id: &str) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn list_all(&self) -> Result<Vec<T>, StorageError> {
        Ok(Vec::new())
    }
}

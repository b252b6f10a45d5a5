//! SQLite-backed local durable tier.
//!
//! Uses `rusqlite` (with bundled SQLite) wrapped in an `Arc<Mutex<Connection>>`
//! to satisfy the `Send + Sync` requirements. All blocking calls are offloaded
//! to a thread-pool via `tokio::task::spawn_blocking`.
//!
//! # Schema
//!
//! One table per record kind, named after [`Entity::COLLECTION`]:
//!
//! - `id`: primary key.
//! - `natural_key`: unique, `NULL` for kinds without one.
//! - `created_at`: indexed; listings are ordered by it.
//! - `data`: the full JSON document.
//!
//! Several tiers (one per kind) may share a single connection.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use carledger::{Entity, MergePatch};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{StorageError, TierStore};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

fn schema(table: &str) -> String {
    format!(
        "
CREATE TABLE IF NOT EXISTS {table} (
    id          TEXT PRIMARY KEY,
    natural_key TEXT UNIQUE,
    created_at  TEXT NOT NULL,
    data        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_{table}_created_at ON {table}(created_at);
"
    )
}

// ---------------------------------------------------------------------------
// SqliteTier
// ---------------------------------------------------------------------------

/// Shared handle to an open SQLite database.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Open (or create) the SQLite database at `path`.
pub fn open_shared(path: &str) -> Result<SharedConnection, rusqlite::Error> {
    let conn = Connection::open(path)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// SQLite-backed implementation of [`TierStore`] for records of type `T`.
///
/// A tier whose database could not be opened stays usable as a value: every
/// call reports [`StorageError::Unavailable`] with the original reason.
pub struct SqliteTier<T> {
    conn: Result<SharedConnection, String>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Entity> SqliteTier<T> {
    /// Open (or create) the database at `path` and apply the schema for `T`.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        Self::from_shared(open_shared(path)?)
    }

    /// Open an in-memory SQLite database (data is lost when dropped).
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::from_shared(Arc::new(Mutex::new(conn)))
    }

    /// Use an already-open connection, creating `T`'s table if needed.
    pub fn from_shared(conn: SharedConnection) -> Result<Self, rusqlite::Error> {
        conn.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .execute_batch(&schema(T::COLLECTION))?;
        Ok(Self {
            conn: Ok(conn),
            _kind: PhantomData,
        })
    }

    /// A tier that could not be provisioned. Every call fails with `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            conn: Err(reason.into()),
            _kind: PhantomData,
        }
    }

    /// Run `f` against the connection on the blocking thread-pool.
    async fn with_conn<R, F>(&self, f: F) -> Result<R, StorageError>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> Result<R, StorageError> + Send + 'static,
    {
        let conn = match &self.conn {
            Ok(conn) => Arc::clone(conn),
            Err(reason) => return Err(StorageError::Unavailable(reason.clone())),
        };

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("task join error: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// Error conversions
// ---------------------------------------------------------------------------

fn map_err(e: rusqlite::Error) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

fn map_json_err(e: serde_json::Error) -> StorageError {
    StorageError::Unavailable(format!("malformed row: {e}"))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn decode<T: Entity>(data: &str) -> Result<T, StorageError> {
    serde_json::from_str(data).map_err(map_json_err)
}

fn select_one<T: Entity>(
    conn: &Connection,
    column: &str,
    value: &str,
) -> Result<Option<T>, StorageError> {
    let sql = format!("SELECT data FROM {} WHERE {column} = ?1", T::COLLECTION);
    let data = conn
        .query_row(&sql, params![value], |row| row.get::<_, String>(0))
        .optional()
        .map_err(map_err)?;
    data.as_deref().map(decode).transpose()
}

// ---------------------------------------------------------------------------
// TierStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl<T: Entity> TierStore<T> for SqliteTier<T> {
    async fn create(&self, record: &T) -> Result<T, StorageError> {
        let record = record.clone();

        self.with_conn(move |conn| {
            let data = serde_json::to_string(&record).map_err(map_json_err)?;
            let result = conn.execute(
                &format!(
                    "INSERT INTO {} (id, natural_key, created_at, data) VALUES (?1, ?2, ?3, ?4)",
                    T::COLLECTION
                ),
                params![record.id(), record.natural_key(), record.created_at(), data],
            );
            match result {
                Ok(_) => Ok(record),
                Err(e) if is_constraint_violation(&e) => Err(StorageError::Conflict(format!(
                    "{} {} (key {:?}) already exists",
                    T::COLLECTION,
                    record.id(),
                    record.natural_key().unwrap_or_default()
                ))),
                Err(e) => Err(map_err(e)),
            }
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| select_one(conn, "id", &id)).await
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<T>, StorageError> {
        if T::KEY_FIELD.is_none() {
            return Ok(None);
        }
        let key = key.to_string();
        self.with_conn(move |conn| select_one(conn, "natural_key", &key))
            .await
    }

    async fn update(&self, id: &str, patch: &MergePatch) -> Result<Option<T>, StorageError> {
        let id = id.to_string();
        let patch = patch.clone();

        self.with_conn(move |conn| {
            let Some(current) = select_one::<T>(conn, "id", &id)? else {
                return Ok(None);
            };
            let updated = patch.apply(&current)?;
            let data = serde_json::to_string(&updated).map_err(map_json_err)?;

            let result = conn.execute(
                &format!(
                    "UPDATE {} SET natural_key = ?2, data = ?3 WHERE id = ?1",
                    T::COLLECTION
                ),
                params![id, updated.natural_key(), data],
            );
            match result {
                Ok(0) => Ok(None),
                Ok(_) => Ok(Some(updated)),
                Err(e) if is_constraint_violation(&e) => Err(StorageError::Conflict(format!(
                    "{} with key {:?} already exists",
                    T::COLLECTION,
                    updated.natural_key().unwrap_or_default()
                ))),
                Err(e) => Err(map_err(e)),
            }
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let removed = conn
                .execute(
                    &format!("DELETE FROM {} WHERE id = ?1", T::COLLECTION),
                    params![id],
                )
                .map_err(map_err)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<T>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT data FROM {} ORDER BY created_at ASC, id ASC",
                    T::COLLECTION
                ))
                .map_err(map_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(map_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_err)?;
            rows.iter().map(|data| decode(data)).collect()
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

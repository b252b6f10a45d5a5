//! Shared helpers for the carledger conformance test suite.
//!
//! Provides:
//!
//! - [`FaultyTier`]: a tier wrapper whose failures can be switched on and
//!   off at runtime, so tests can take a tier "down" between operations.
//! - [`faulty_chain`]: a remote/local/memory chain built from three
//!   in-memory [`FaultyTier`]s, with handles to each.
//! - [`MockRemote`]: an in-process PostgREST-style HTTP server for driving
//!   the real remote tier end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use carledger::{Entity, MergePatch};
use carledger_storage::{Durability, MemoryTier, StorageError, TierChain, TierStore};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// FaultyTier
// ---------------------------------------------------------------------------

/// Wraps another tier and injects failures on demand.
///
/// - `set_down(true)`: every call fails with [`StorageError::Unavailable`].
/// - `fail_creates(true)`: only `create` fails with `Unavailable`.
/// - `reject_creates(true)`: `create` fails with [`StorageError::Conflict`],
///   as a backend with a stricter constraint would.
///
/// Every call, failed or not, is counted.
pub struct FaultyTier<T> {
    inner: Arc<dyn TierStore<T>>,
    down: AtomicBool,
    fail_creates: AtomicBool,
    reject_creates: AtomicBool,
    calls: AtomicUsize,
}

impl<T: Entity> FaultyTier<T> {
    pub fn wrap(inner: Arc<dyn TierStore<T>>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            fail_creates: AtomicBool::new(false),
            reject_creates: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// A healthy tier backed by a fresh [`MemoryTier`].
    pub fn memory() -> Self {
        Self::wrap(Arc::new(MemoryTier::<T>::new()))
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    /// Number of calls made to this tier so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The wrapped tier, bypassing fault injection.
    pub fn inner(&self) -> &dyn TierStore<T> {
        self.inner.as_ref()
    }

    fn enter(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Entity> TierStore<T> for FaultyTier<T> {
    async fn create(&self, record: &T) -> Result<T, StorageError> {
        self.enter()?;
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected create failure".into()));
        }
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(StorageError::Conflict("injected constraint violation".into()));
        }
        self.inner.create(record).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StorageError> {
        self.enter()?;
        self.inner.find_by_id(id).await
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.enter()?;
        self.inner.find_by_key(key).await
    }

    async fn update(&self, id: &str, patch: &MergePatch) -> Result<Option<T>, StorageError> {
        self.enter()?;
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.enter()?;
        self.inner.delete(id).await
    }

    async fn list_all(&self) -> Result<Vec<T>, StorageError> {
        self.enter()?;
        self.inner.list_all().await
    }
}

/// A three-tier chain with a handle on each tier.
pub struct FaultyChain<T> {
    pub chain: TierChain<T>,
    pub remote: Arc<FaultyTier<T>>,
    pub local: Arc<FaultyTier<T>>,
    pub memory: Arc<FaultyTier<T>>,
}

/// Build `[remote, local, memory]`, every tier healthy and in-memory.
pub fn faulty_chain<T: Entity>() -> FaultyChain<T> {
    let remote = Arc::new(FaultyTier::<T>::memory());
    let local = Arc::new(FaultyTier::<T>::memory());
    let memory = Arc::new(FaultyTier::<T>::memory());
    let chain: TierChain<T> = TierChain::new()
        .with_tier(Durability::DurableRemote, remote.clone())
        .with_tier(Durability::DurableLocal, local.clone())
        .with_tier(Durability::VolatileMemory, memory.clone());
    FaultyChain {
        chain,
        remote,
        local,
        memory,
    }
}

// ---------------------------------------------------------------------------
// MockRemote
// ---------------------------------------------------------------------------

type Row = Map<String, Value>;

struct MockState {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    /// Table -> columns that must be unique besides `id`.
    unique: HashMap<String, Vec<String>>,
    down: AtomicBool,
}

/// A loopback HTTP server speaking the subset of PostgREST the remote tier
/// uses: `eq.` filters, `limit`, `order=created_at.asc`, and
/// `Prefer: return=representation` bodies. Duplicate `id` or unique column
/// values yield `409`; `set_down(true)` makes every request `503`.
pub struct MockRemote {
    base_url: String,
    state: Arc<MockState>,
}

impl MockRemote {
    /// Start the server. `unique` lists `(table, column)` constraints.
    ///
    /// # Panics
    ///
    /// Panics if the loopback listener cannot be bound.
    pub async fn spawn(unique: &[(&str, &str)]) -> Self {
        let mut constraints: HashMap<String, Vec<String>> = HashMap::new();
        for (table, column) in unique {
            constraints
                .entry(table.to_string())
                .or_default()
                .push(column.to_string());
        }
        let state = Arc::new(MockState {
            tables: Mutex::new(HashMap::new()),
            unique: constraints,
            down: AtomicBool::new(false),
        });

        let router = Router::new()
            .route(
                "/rest/v1/{table}",
                get(select_rows)
                    .post(insert_row)
                    .patch(update_rows)
                    .delete(delete_rows),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("get local addr");
        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("mock remote error");
        });

        Self {
            base_url: format!("http://{addr}/rest/v1"),
            state,
        }
    }

    /// The base URL to configure the remote tier with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_down(&self, down: bool) {
        self.state.down.store(down, Ordering::SeqCst);
    }

    /// Rows currently stored in `table`.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

fn cell_matches(row: &Row, column: &str, expected: &str) -> bool {
    match row.get(column) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == expected,
    }
}

fn row_filter(query: &HashMap<String, String>) -> Vec<(String, String)> {
    query
        .iter()
        .filter_map(|(column, value)| {
            value
                .strip_prefix("eq.")
                .map(|v| (column.clone(), v.to_string()))
        })
        .collect()
}

fn matches_all(row: &Row, filter: &[(String, String)]) -> bool {
    filter.iter().all(|(c, v)| cell_matches(row, c, v))
}

fn violates_unique(
    state: &MockState,
    table: &str,
    rows: &[Row],
    candidate: &Row,
    skip: Option<usize>,
) -> bool {
    let mut columns = vec!["id".to_string()];
    columns.extend(state.unique.get(table).cloned().unwrap_or_default());
    rows.iter().enumerate().any(|(i, row)| {
        Some(i) != skip
            && columns.iter().any(|c| {
                candidate
                    .get(c)
                    .is_some_and(|v| !v.is_null() && row.get(c) == Some(v))
            })
    })
}

fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "mock remote down").into_response()
}

async fn select_rows(
    State(state): State<Arc<MockState>>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if state.down.load(Ordering::SeqCst) {
        return unavailable();
    }
    let filter = row_filter(&query);
    let tables = state.tables.lock().unwrap_or_else(PoisonError::into_inner);
    let mut rows: Vec<Row> = tables
        .get(&table)
        .map(|rows| {
            rows.iter()
                .filter(|r| matches_all(r, &filter))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    if query.get("order").is_some_and(|o| o == "created_at.asc") {
        let created = |r: &Row| -> String {
            r.get("created_at")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        rows.sort_by_key(created);
    }
    if let Some(limit) = query.get("limit").and_then(|l| l.parse::<usize>().ok()) {
        rows.truncate(limit);
    }
    Json(rows).into_response()
}

async fn insert_row(
    State(state): State<Arc<MockState>>,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if state.down.load(Ordering::SeqCst) {
        return unavailable();
    }
    let Value::Object(row) = body else {
        return (StatusCode::BAD_REQUEST, "expected a JSON object").into_response();
    };
    let mut tables = state.tables.lock().unwrap_or_else(PoisonError::into_inner);
    let rows = tables.entry(table.clone()).or_default();
    if violates_unique(&state, &table, rows, &row, None) {
        return (StatusCode::CONFLICT, "duplicate key value").into_response();
    }
    rows.push(row.clone());
    (StatusCode::CREATED, Json(vec![row])).into_response()
}

async fn update_rows(
    State(state): State<Arc<MockState>>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if state.down.load(Ordering::SeqCst) {
        return unavailable();
    }
    let Value::Object(columns) = body else {
        return (StatusCode::BAD_REQUEST, "expected a JSON object").into_response();
    };
    let filter = row_filter(&query);
    let mut tables = state.tables.lock().unwrap_or_else(PoisonError::into_inner);
    let rows = tables.entry(table.clone()).or_default();

    let mut updated = Vec::new();
    for i in 0..rows.len() {
        if !matches_all(&rows[i], &filter) {
            continue;
        }
        let mut candidate = rows[i].clone();
        for (column, value) in &columns {
            candidate.insert(column.clone(), value.clone());
        }
        if violates_unique(&state, &table, rows, &candidate, Some(i)) {
            return (StatusCode::CONFLICT, "duplicate key value").into_response();
        }
        rows[i] = candidate.clone();
        updated.push(candidate);
    }
    Json(updated).into_response()
}

async fn delete_rows(
    State(state): State<Arc<MockState>>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if state.down.load(Ordering::SeqCst) {
        return unavailable();
    }
    let filter = row_filter(&query);
    let mut tables = state.tables.lock().unwrap_or_else(PoisonError::into_inner);
    let rows = tables.entry(table).or_default();
    let (removed, kept): (Vec<Row>, Vec<Row>) =
        rows.drain(..).partition(|r| matches_all(r, &filter));
    *rows = kept;
    Json(removed).into_response()
}

//! Remote durable tier over a PostgREST-style HTTP API.
//!
//! Each record kind maps to one table exposed at `{base_url}/{collection}`.
//! Requests follow PostgREST conventions:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `create` | `POST /{collection}` with `Prefer: return=representation` |
//! | `find_by_id` | `GET /{collection}?id=eq.{id}&limit=1` |
//! | `find_by_key` | `GET /{collection}?{key_field}=eq.{key}&limit=1` |
//! | `update` | `GET` the row, reapply the patch, `PATCH /{collection}?id=eq.{id}` with the touched columns |
//! | `delete` | `DELETE /{collection}?id=eq.{id}` with `Prefer: return=representation` |
//! | `list_all` | `GET /{collection}?order=created_at.asc` |
//!
//! # Error mapping
//!
//! `409 Conflict` is a definitive [`StorageError::Conflict`]. Every other
//! failure (transport error, timeout, 5xx, auth or schema 4xx, undecodable
//! body) is [`StorageError::Unavailable`]: the tier cannot answer, so the
//! engine should try the next one.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use carledger::{Entity, MergePatch};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{Map, Value};
use tracing::debug;

use super::{StorageError, TierStore};

// ---------------------------------------------------------------------------
// RemoteClient
// ---------------------------------------------------------------------------

/// Connection settings shared by every remote tier of one process.
///
/// Cheap to clone: [`reqwest::Client`] pools connections internally.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteClient {
    /// Build a client with a per-request `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, collection: &str) -> RequestBuilder {
        let url = format!("{}/{collection}", self.base_url);
        let mut req = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            req = req.header("apikey", key.as_str()).bearer_auth(key);
        }
        req
    }
}

// ---------------------------------------------------------------------------
// RemoteTier
// ---------------------------------------------------------------------------

/// Remote implementation of [`TierStore`] for records of type `T`.
pub struct RemoteTier<T> {
    client: Option<RemoteClient>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Entity> RemoteTier<T> {
    pub fn new(client: RemoteClient) -> Self {
        Self {
            client: Some(client),
            _kind: PhantomData,
        }
    }

    /// A remote tier with no endpoint configured. Every call reports
    /// [`StorageError::Unavailable`].
    pub fn unconfigured() -> Self {
        Self {
            client: None,
            _kind: PhantomData,
        }
    }

    fn request(&self, method: Method) -> Result<RequestBuilder, StorageError> {
        self.client
            .as_ref()
            .map(|c| c.request(method, T::COLLECTION))
            .ok_or_else(|| StorageError::Unavailable("remote tier not configured".into()))
    }

    fn lookup(&self, column: &str, value: &str) -> Result<RequestBuilder, StorageError> {
        Ok(self
            .request(Method::GET)?
            .query(&[(column, format!("eq.{value}"))])
            .query(&[("limit", "1")]))
    }
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

/// Send `req` and decode a PostgREST row array.
async fn fetch_rows<T: Entity>(req: RequestBuilder) -> Result<Vec<T>, StorageError> {
    let response = req
        .send()
        .await
        .map_err(|e| StorageError::Unavailable(format!("remote request failed: {e}")))?;

    let status = response.status();
    if status == StatusCode::CONFLICT {
        let body = response.text().await.unwrap_or_default();
        return Err(StorageError::Conflict(format!(
            "remote rejected duplicate {}: {body}",
            T::COLLECTION
        )));
    }
    if !status.is_success() {
        return Err(StorageError::Unavailable(format!(
            "remote returned status {}",
            status.as_u16()
        )));
    }

    response
        .json::<Vec<T>>()
        .await
        .map_err(|e| StorageError::Unavailable(format!("malformed remote response: {e}")))
}

/// The top-level members of `updated` named by `patch`, as a column update.
/// Members the patch removed are sent as `null`.
fn touched_columns<T: Entity>(
    updated: &T,
    patch: &MergePatch,
) -> Result<Map<String, Value>, StorageError> {
    let doc = serde_json::to_value(updated)
        .map_err(|e| StorageError::Invalid(format!("cannot serialise record: {e}")))?;
    let mut columns = Map::new();
    for field in patch.fields() {
        let value = doc.get(field).cloned().unwrap_or(Value::Null);
        columns.insert(field.to_string(), value);
    }
    Ok(columns)
}

// ---------------------------------------------------------------------------
// TierStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl<T: Entity> TierStore<T> for RemoteTier<T> {
    async fn create(&self, record: &T) -> Result<T, StorageError> {
        let req = self
            .request(Method::POST)?
            .header("Prefer", "return=representation")
            .json(record);
        fetch_rows::<T>(req)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Unavailable("remote insert returned no row".into()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StorageError> {
        let rows = fetch_rows::<T>(self.lookup("id", id)?).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(field) = T::KEY_FIELD else {
            return Ok(None);
        };
        let rows = fetch_rows::<T>(self.lookup(field, key)?).await?;
        Ok(rows.into_iter().next())
    }

    async fn update(&self, id: &str, patch: &MergePatch) -> Result<Option<T>, StorageError> {
        let Some(current) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let updated = patch.apply(&current)?;
        let columns = touched_columns(&updated, patch)?;
        debug!(
            "remote: patching {} {id} ({} columns)",
            T::COLLECTION,
            columns.len()
        );

        let req = self
            .request(Method::PATCH)?
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&columns);
        let rows = fetch_rows::<T>(req).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let req = self
            .request(Method::DELETE)?
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");
        let rows = fetch_rows::<T>(req).await?;
        Ok(!rows.is_empty())
    }

    async fn list_all(&self) -> Result<Vec<T>, StorageError> {
        let req = self
            .request(Method::GET)?
            .query(&[("order", "created_at.asc")]);
        fetch_rows::<T>(req).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Key-value store abstraction shared by every component.
//!
//! All mutation is a full-value overwrite of a single key. The only
//! conditional write is `set_if_absent`, used to guard group finalization.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// A shared, externally durable string key-value map.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a single key.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Reads several keys at once; the result is aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// Overwrites a key unconditionally.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Writes a key only if it does not exist yet.
    ///
    /// Returns `true` when this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Lists every key starting with `prefix`, in no particular order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Removes a key. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Reads and deserializes a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(raw) => decode(key, &raw).map(Some),
        None => Ok(None),
    }
}

/// Serializes and writes a JSON value.
pub async fn set_json<T: Serialize + Sync>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}

/// Decodes a raw JSON value, naming the key on failure.
pub fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

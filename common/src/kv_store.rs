//! Key-value store abstraction.
//!
//! Small persistent lookups (the geocoding cache) go through [`KvStore`] so
//! callers can pick a backend: in-memory, a JSON file on disk, or Redis.
//! Values are JSON. Entries are only ever added.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use redis::aio::ConnectionManager as RedisConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::{AppError, AppResult};

/// Minimal async key-value interface.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the stored value, if any.
    async fn get(&self, key: &str) -> AppResult<Option<Value>>;

    /// Stores `value` under `key` and persists it.
    async fn put(&self, key: &str, value: Value) -> AppResult<()>;

    /// Number of stored entries.
    async fn len(&self) -> AppResult<usize>;
}

/// Process-local store, mostly for tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> AppResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn len(&self) -> AppResult<usize> {
        Ok(self.entries.read().await.len())
    }
}

/// JSON file backed store. The whole map is rewritten on every `put`.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store, loading existing entries when the file exists.
    pub async fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if tokio::fs::try_exists(&path).await? {
            let raw = tokio::fs::read_to_string(&path).await?;
            let entries: HashMap<String, Value> = if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            };
            tracing::info!(path = %path.display(), count = entries.len(), "Cache loaded from file");
            entries
        } else {
            tracing::info!(path = %path.display(), "No cache file found, starting with an empty cache");
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, entries: &HashMap<String, Value>) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, raw).await?;
        tracing::debug!(path = %self.path.display(), "Cache saved to file");
        Ok(())
    }
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        self.save(&entries).await
    }

    async fn len(&self) -> AppResult<usize> {
        Ok(self.entries.read().await.len())
    }
}

/// Redis backed store. Keys live in a single hash.
pub struct RedisStore {
    manager: RedisConnectionManager,
    hash_key: String,
}

impl RedisStore {
    /// Connects to Redis at `url` and stores entries under `hash_key`.
    pub async fn connect(url: &str, hash_key: impl Into<String>) -> AppResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| AppError::RedisConnection(e.to_string()))?;
        let manager = RedisConnectionManager::new(client)
            .await
            .map_err(|e| AppError::RedisConnection(e.to_string()))?;
        Ok(Self {
            manager,
            hash_key: hash_key.into(),
        })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .hget(&self.hash_key, key)
            .await
            .map_err(|e| AppError::RedisOperation(e.to_string()))?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Value) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let raw = serde_json::to_string(&value)?;
        conn.hset::<_, _, _, ()>(&self.hash_key, key, raw)
            .await
            .map_err(|e| AppError::RedisOperation(e.to_string()))
    }

    async fn len(&self) -> AppResult<usize> {
        let mut conn = self.manager.clone();
        conn.hlen(&self.hash_key)
            .await
            .map_err(|e| AppError::RedisOperation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.put("a", json!([1.0, 2.0])).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!([1.0, 2.0])));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_json_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("locations.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
        store.put("Berlin", json!({"latitude": 52.5, "longitude": 13.4})).await.unwrap();
        store.put("Nowhere", Value::Null).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        assert_eq!(
            reopened.get("Berlin").await.unwrap(),
            Some(json!({"latitude": 52.5, "longitude": 13.4}))
        );
        assert_eq!(reopened.get("Nowhere").await.unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path).await, Err(AppError::Json(_))));
    }
}

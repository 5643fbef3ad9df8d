//! Config Store: a versioned key/value store persisted to
//! local durable storage. Keys of interest include `origin_policy`,
//! `jwt_config`, `ad_config`. Readers may cache; writers bump a monotonic
//! version; a read that follows a write on the same process observes the
//! new value immediately (the in-memory cache is updated synchronously
//! with the durable write, inside the same `write` lock).
//!
//! Audit emission for every write is the caller's responsibility (the
//! Admin Control Plane), to avoid a dependency cycle between this crate
//! and the audit crate; `ConfigStore::set` returns the new version so the
//! caller can describe the change (old -> new) in the audit event it
//! emits.

use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    version: i64,
}

/// Well-known keys the Config Store is expected to hold.
pub mod keys {
    pub const ORIGIN_POLICY: &str = "origin_policy";
    pub const JWT_CONFIG: &str = "jwt_config";
    pub const AD_CONFIG: &str = "ad_config";
    pub const OAUTH_PROVIDERS: &str = "oauth_providers";
}

pub struct ConfigStore {
    pool: SqlitePool,
    cache: RwLock<HashMap<String, Entry>>,
}

impl ConfigStore {
    /// Creates the backing table if absent and warms the in-memory cache
    /// from whatever is already persisted.
    pub async fn new(pool: SqlitePool) -> Result<Self, ConfigError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS config_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                version INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        let rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT key, value, version FROM config_store")
                .fetch_all(&pool)
                .await?;

        let mut cache = HashMap::new();
        for (key, raw, version) in rows {
            let value: Value = serde_json::from_str(&raw)?;
            cache.insert(key, Entry { value, version });
        }

        Ok(Self {
            pool,
            cache: RwLock::new(cache),
        })
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.cache.read().unwrap().get(key).map(|e| e.value.clone())
    }

    pub fn version(&self, key: &str) -> i64 {
        self.cache.read().unwrap().get(key).map(|e| e.version).unwrap_or(0)
    }

    /// Writes `value` under `key`, bumping its monotonic version. Returns
    /// the new version. The in-memory cache is updated before the function
    /// returns, so a subsequent `get` in the same process always observes
    /// the new value.
    pub async fn set(&self, key: &str, value: Value) -> Result<i64, ConfigError> {
        let next_version = self.version(key) + 1;
        let raw = serde_json::to_string(&value)?;

        sqlx::query(
            "INSERT INTO config_store (key, value, version) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, version = excluded.version",
        )
        .bind(key)
        .bind(&raw)
        .bind(next_version)
        .execute(&self.pool)
        .await?;

        self.cache.write().unwrap().insert(
            key.to_string(),
            Entry {
                value,
                version: next_version,
            },
        );

        Ok(next_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn set_then_get_is_read_your_writes() {
        let store = ConfigStore::new(memory_pool().await).await.unwrap();
        assert!(store.get(keys::ORIGIN_POLICY).is_none());

        let v1 = store
            .set(keys::ORIGIN_POLICY, serde_json::json!({"allowlist": ["a"]}))
            .await
            .unwrap();
        assert_eq!(v1, 1);
        assert_eq!(
            store.get(keys::ORIGIN_POLICY).unwrap(),
            serde_json::json!({"allowlist": ["a"]})
        );

        let v2 = store
            .set(keys::ORIGIN_POLICY, serde_json::json!({"allowlist": ["a", "b"]}))
            .await
            .unwrap();
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn version_is_monotonic_across_restarts() {
        let pool = memory_pool().await;
        {
            let store = ConfigStore::new(pool.clone()).await.unwrap();
            store.set(keys::JWT_CONFIG, serde_json::json!({"n": 1})).await.unwrap();
        }
        let store2 = ConfigStore::new(pool).await.unwrap();
        assert_eq!(store2.version(keys::JWT_CONFIG), 1);
    }
}

//! Durable storage for registered upstream MCP servers plus the
//! in-memory, copy-on-write snapshot the catalog reads on every request.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use gateway_core::model::{HealthStatus, Tool, UpstreamServer};
use sqlx::{Row, SqlitePool};

use crate::error::RegistryError;

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub servers: HashMap<String, UpstreamServer>,
}

pub struct RegistryStore {
    pool: SqlitePool,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl RegistryStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, RegistryError> {
        Self::create_schema(&pool).await?;
        let store = Self {
            pool,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        };
        store.reload().await?;
        Ok(store)
    }

    async fn create_schema(pool: &SqlitePool) -> Result<(), RegistryError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS upstream_servers (
                id TEXT PRIMARY KEY,
                base_endpoint_url TEXT NOT NULL,
                tools TEXT NOT NULL,
                health TEXT NOT NULL,
                last_health_check TEXT,
                consecutive_failures INTEGER NOT NULL,
                upstream_session_id TEXT
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().unwrap().clone()
    }

    pub async fn reload(&self) -> Result<(), RegistryError> {
        let rows = sqlx::query("SELECT id, base_endpoint_url, tools, health, last_health_check, consecutive_failures, upstream_session_id FROM upstream_servers")
            .fetch_all(&self.pool)
            .await?;

        let mut servers = HashMap::new();
        for row in rows {
            let tools_json: String = row.try_get("tools")?;
            let health_str: String = row.try_get("health")?;
            let last_health_check: Option<String> = row.try_get("last_health_check")?;
            let server = UpstreamServer {
                id: row.try_get("id")?,
                base_endpoint_url: row.try_get("base_endpoint_url")?,
                tools: serde_json::from_str(&tools_json)?,
                health: parse_health(&health_str),
                last_health_check: last_health_check.and_then(|s| s.parse().ok()),
                consecutive_failures: row.try_get::<i64, _>("consecutive_failures")? as u32,
                upstream_session_id: row.try_get("upstream_session_id")?,
            };
            servers.insert(server.id.clone(), server);
        }

        *self.snapshot.write().unwrap() = Arc::new(Snapshot { servers });
        Ok(())
    }

    /// Persists a freshly registered upstream and swaps the snapshot.
    pub async fn upsert(&self, server: &UpstreamServer) -> Result<(), RegistryError> {
        let tools_json = serde_json::to_string(&server.tools)?;
        sqlx::query(
            "INSERT INTO upstream_servers (id, base_endpoint_url, tools, health, last_health_check, consecutive_failures, upstream_session_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET base_endpoint_url = excluded.base_endpoint_url,
                 tools = excluded.tools, health = excluded.health,
                 last_health_check = excluded.last_health_check,
                 consecutive_failures = excluded.consecutive_failures,
                 upstream_session_id = excluded.upstream_session_id",
        )
        .bind(&server.id)
        .bind(&server.base_endpoint_url)
        .bind(&tools_json)
        .bind(health_str(server.health))
        .bind(server.last_health_check.map(|t| t.to_rfc3339()))
        .bind(server.consecutive_failures as i64)
        .bind(&server.upstream_session_id)
        .execute(&self.pool)
        .await?;

        self.reload().await
    }

    pub async fn remove(&self, server_id: &str) -> Result<(), RegistryError> {
        sqlx::query("DELETE FROM upstream_servers WHERE id = ?")
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        self.reload().await
    }

    /// Updates health/consecutive-failure bookkeeping only, without
    /// touching the tool catalog.
    pub async fn update_health(
        &self,
        server_id: &str,
        health: HealthStatus,
        consecutive_failures: u32,
    ) -> Result<(), RegistryError> {
        sqlx::query("UPDATE upstream_servers SET health = ?, last_health_check = ?, consecutive_failures = ? WHERE id = ?")
            .bind(health_str(health))
            .bind(Utc::now().to_rfc3339())
            .bind(consecutive_failures as i64)
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        self.reload().await
    }

    pub async fn update_tools(&self, server_id: &str, tools: &[Tool]) -> Result<(), RegistryError> {
        let tools_json = serde_json::to_string(tools)?;
        sqlx::query("UPDATE upstream_servers SET tools = ? WHERE id = ?")
            .bind(&tools_json)
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        self.reload().await
    }

    pub async fn update_upstream_session(&self, server_id: &str, session_id: Option<&str>) -> Result<(), RegistryError> {
        sqlx::query("UPDATE upstream_servers SET upstream_session_id = ? WHERE id = ?")
            .bind(session_id)
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        self.reload().await
    }
}

fn health_str(health: HealthStatus) -> &'static str {
    match health {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Unhealthy => "unhealthy",
        HealthStatus::Unknown => "unknown",
    }
}

fn parse_health(s: &str) -> HealthStatus {
    match s {
        "healthy" => HealthStatus::Healthy,
        "unhealthy" => HealthStatus::Unhealthy,
        _ => HealthStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn upsert_then_reload_round_trips() {
        let store = RegistryStore::new(pool().await).await.unwrap();
        let mut server = UpstreamServer::new("srv-1", "http://localhost:9000/mcp");
        server.health = HealthStatus::Healthy;
        store.upsert(&server).await.unwrap();

        let snapshot = store.snapshot();
        assert!(snapshot.servers.contains_key("srv-1"));
        assert_eq!(snapshot.servers["srv-1"].health, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn remove_drops_from_snapshot() {
        let store = RegistryStore::new(pool().await).await.unwrap();
        let server = UpstreamServer::new("srv-1", "http://localhost:9000/mcp");
        store.upsert(&server).await.unwrap();
        store.remove("srv-1").await.unwrap();
        assert!(!store.snapshot().servers.contains_key("srv-1"));
    }

    #[tokio::test]
    async fn update_health_tracks_consecutive_failures() {
        let store = RegistryStore::new(pool().await).await.unwrap();
        let server = UpstreamServer::new("srv-1", "http://localhost:9000/mcp");
        store.upsert(&server).await.unwrap();
        store.update_health("srv-1", HealthStatus::Unhealthy, 3).await.unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.servers["srv-1"].consecutive_failures, 3);
        assert_eq!(snapshot.servers["srv-1"].health, HealthStatus::Unhealthy);
    }
}

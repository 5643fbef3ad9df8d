//! Audit storage backend: a single local durable SQLite table. `AuditStorage` is a trait so tests can swap in an
//! in-memory fake the way the base codebase's audit crate swaps storage
//! backends, even though the gateway itself only ever wires the SQLite
//! implementation in production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_core::model::{AuditEvent, AuditEventKind, Severity};
use sqlx::SqlitePool;
use sqlx::Row;

use crate::error::AuditError;

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub kind: Option<AuditEventKind>,
    pub user_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Appends `event` (event_id is assigned by the store) and returns the
    /// stored event with its assigned id. Must persist before returning —
    /// the Protocol Gateway awaits this before the originating request
    /// completes.
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, AuditError>;

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError>;

    async fn get(&self, event_id: i64) -> Result<Option<AuditEvent>, AuditError>;

    /// Deletes events older than `cutoff`. Used by the retention sweep;
    /// compaction beyond deletion is explicitly out of scope.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditError>;
}

/// An audit event awaiting an assigned, monotonic id.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub occurred_at: DateTime<Utc>,
    pub kind: AuditEventKind,
    pub severity: Severity,
    pub user_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub success: bool,
    pub details: serde_json::Value,
}

pub struct SqliteAuditStorage {
    pool: SqlitePool,
}

impl SqliteAuditStorage {
    pub async fn new(pool: SqlitePool) -> Result<Self, AuditError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_log (
                event_id INTEGER PRIMARY KEY AUTOINCREMENT,
                occurred_at TEXT NOT NULL,
                kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                user_id TEXT,
                resource_type TEXT,
                resource_id TEXT,
                success INTEGER NOT NULL,
                details TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_occurred_at ON audit_log(occurred_at)")
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, AuditError> {
        let kind_raw: String = row.try_get("kind")?;
        let severity_raw: String = row.try_get("severity")?;
        let details_raw: String = row.try_get("details")?;
        Ok(AuditEvent {
            event_id: row.try_get("event_id")?,
            occurred_at: row.try_get("occurred_at")?,
            kind: serde_json::from_value(serde_json::Value::String(kind_raw))?,
            severity: serde_json::from_value(serde_json::Value::String(severity_raw))?,
            user_id: row.try_get("user_id")?,
            resource_type: row.try_get("resource_type")?,
            resource_id: row.try_get("resource_id")?,
            success: row.try_get::<i64, _>("success")? != 0,
            details: serde_json::from_str(&details_raw)?,
        })
    }
}

#[async_trait]
impl AuditStorage for SqliteAuditStorage {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, AuditError> {
        let kind_str = serde_json::to_value(event.kind)?.as_str().unwrap().to_string();
        let severity_str = serde_json::to_value(event.severity)?.as_str().unwrap().to_string();
        let details_str = serde_json::to_string(&event.details)?;

        let result = sqlx::query(
            "INSERT INTO audit_log
                (occurred_at, kind, severity, user_id, resource_type, resource_id, success, details)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.occurred_at)
        .bind(&kind_str)
        .bind(&severity_str)
        .bind(&event.user_id)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(event.success as i64)
        .bind(&details_str)
        .execute(&self.pool)
        .await?;

        Ok(AuditEvent {
            event_id: result.last_insert_rowid(),
            occurred_at: event.occurred_at,
            kind: event.kind,
            severity: event.severity,
            user_id: event.user_id,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            success: event.success,
            details: event.details,
        })
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        // Hand-built WHERE clause: the filter set is small and fixed, and
        // sqlx's query! macro needs a compile-time DB connection which the
        // per-request-config sqlite path doesn't have at build time.
        let mut sql = String::from(
            "SELECT event_id, occurred_at, kind, severity, user_id, resource_type, resource_id, success, details
             FROM audit_log WHERE 1=1",
        );
        if filter.kind.is_some() {
            sql.push_str(" AND kind = ?");
        }
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if filter.start_time.is_some() {
            sql.push_str(" AND occurred_at >= ?");
        }
        if filter.end_time.is_some() {
            sql.push_str(" AND occurred_at <= ?");
        }
        sql.push_str(" ORDER BY event_id DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        if filter.offset.is_some() {
            sql.push_str(" OFFSET ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(kind) = filter.kind {
            let kind_str = serde_json::to_value(kind)?.as_str().unwrap().to_string();
            query = query.bind(kind_str);
        }
        if let Some(user_id) = &filter.user_id {
            query = query.bind(user_id.clone());
        }
        if let Some(start) = filter.start_time {
            query = query.bind(start);
        }
        if let Some(end) = filter.end_time {
            query = query.bind(end);
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }
        if let Some(offset) = filter.offset {
            query = query.bind(offset);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn get(&self, event_id: i64) -> Result<Option<AuditEvent>, AuditError> {
        let row = sqlx::query(
            "SELECT event_id, occurred_at, kind, severity, user_id, resource_type, resource_id, success, details
             FROM audit_log WHERE event_id = ?",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_event).transpose()
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditError> {
        let result = sqlx::query("DELETE FROM audit_log WHERE occurred_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn storage() -> SqliteAuditStorage {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        SqliteAuditStorage::new(pool).await.unwrap()
    }

    fn sample(kind: AuditEventKind, user: Option<&str>) -> NewAuditEvent {
        NewAuditEvent {
            occurred_at: Utc::now(),
            kind,
            severity: Severity::Info,
            user_id: user.map(str::to_string),
            resource_type: None,
            resource_id: None,
            success: true,
            details: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn append_assigns_monotonic_ids() {
        let storage = storage().await;
        let e1 = storage.append(sample(AuditEventKind::ToolsListed, Some("u1"))).await.unwrap();
        let e2 = storage.append(sample(AuditEventKind::ToolsListed, Some("u1"))).await.unwrap();
        assert!(e2.event_id > e1.event_id);
    }

    #[tokio::test]
    async fn query_filters_by_user() {
        let storage = storage().await;
        storage.append(sample(AuditEventKind::AuthzPermissionGranted, Some("u1"))).await.unwrap();
        storage.append(sample(AuditEventKind::AuthzPermissionGranted, Some("u2"))).await.unwrap();

        let results = storage
            .query(AuditFilter {
                user_id: Some("u1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn delete_before_removes_old_rows_and_is_never_mutating() {
        let storage = storage().await;
        let old = storage.append(sample(AuditEventKind::SessionClosed, None)).await.unwrap();
        let cutoff = old.occurred_at + chrono::Duration::seconds(1);
        let removed = storage.delete_before(cutoff).await.unwrap();
        assert_eq!(removed, 1);
        assert!(storage.get(old.event_id).await.unwrap().is_none());
    }
}

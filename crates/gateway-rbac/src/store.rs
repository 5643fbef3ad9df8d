//! Durable storage for users, roles, and role->tool grants, plus the
//! in-memory, copy-on-write snapshot that [`crate::engine::RbacEngine`]
//! reads on every request.
//!
//! Every mutating method here writes through to SQLite and then rebuilds
//! and atomically swaps the snapshot, so the cache is never observably
//! stale within one process.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::Utc;
use gateway_core::model::{Grant, Permission, Role, User};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::error::RbacError;

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub users: HashMap<String, User>,
    pub users_by_email: HashMap<String, String>,
    pub roles: HashMap<String, Role>,
}

pub struct RbacStore {
    pool: SqlitePool,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl RbacStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, RbacError> {
        Self::create_schema(&pool).await?;
        let store = Self {
            pool,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        };
        store.reload().await?;
        Ok(store)
    }

    async fn create_schema(pool: &SqlitePool) -> Result<(), RbacError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                provider TEXT NOT NULL,
                password_hash TEXT,
                enabled INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_roles (
                user_id TEXT NOT NULL,
                role_id TEXT NOT NULL,
                PRIMARY KEY (user_id, role_id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                description TEXT NOT NULL,
                permissions TEXT NOT NULL,
                is_system INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS grants (
                role_id TEXT NOT NULL,
                server_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                granted_at TEXT NOT NULL,
                PRIMARY KEY (role_id, server_id, tool_name)
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().unwrap().clone()
    }

    /// Rebuilds the snapshot from durable storage and atomically swaps it
    /// in. Called after every mutation and once at startup.
    pub async fn reload(&self) -> Result<(), RbacError> {
        let mut users = HashMap::new();
        let mut users_by_email = HashMap::new();

        let user_rows = sqlx::query("SELECT id, email, display_name, provider, password_hash, enabled, created_at, updated_at FROM users")
            .fetch_all(&self.pool)
            .await?;
        for row in &user_rows {
            let id: String = row.try_get("id")?;
            let provider_raw: String = row.try_get("provider")?;
            let role_rows: Vec<(String,)> = sqlx::query_as("SELECT role_id FROM user_roles WHERE user_id = ?")
                .bind(&id)
                .fetch_all(&self.pool)
                .await?;
            let user = User {
                id: id.clone(),
                email: row.try_get("email")?,
                display_name: row.try_get("display_name")?,
                provider: serde_json::from_value(serde_json::Value::String(provider_raw))
                    .map_err(|e| RbacError::PasswordHash(e.to_string()))?,
                password_hash: row.try_get("password_hash")?,
                enabled: row.try_get::<i64, _>("enabled")? != 0,
                role_ids: role_rows.into_iter().map(|(r,)| r).collect(),
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            };
            users_by_email.insert(user.email.clone(), user.id.clone());
            users.insert(user.id.clone(), user);
        }

        let mut roles = HashMap::new();
        let role_rows = sqlx::query("SELECT id, display_name, description, permissions, is_system FROM roles")
            .fetch_all(&self.pool)
            .await?;
        for row in &role_rows {
            let id: String = row.try_get("id")?;
            let permissions_raw: String = row.try_get("permissions")?;
            let permissions: HashSet<Permission> = serde_json::from_str(&permissions_raw)?;
            let grant_rows = sqlx::query("SELECT server_id, tool_name, granted_at FROM grants WHERE role_id = ?")
                .bind(&id)
                .fetch_all(&self.pool)
                .await?;
            let grants = grant_rows
                .iter()
                .map(|g| {
                    Ok(Grant {
                        role_id: id.clone(),
                        server_id: g.try_get("server_id")?,
                        tool_name: g.try_get("tool_name")?,
                        granted_at: g.try_get("granted_at")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()?;
            roles.insert(
                id.clone(),
                Role {
                    id,
                    display_name: row.try_get("display_name")?,
                    description: row.try_get("description")?,
                    permissions,
                    is_system: row.try_get::<i64, _>("is_system")? != 0,
                    grants,
                },
            );
        }

        let next = Arc::new(Snapshot { users, users_by_email, roles });
        *self.snapshot.write().unwrap() = next;
        Ok(())
    }

    pub fn user_count(&self) -> usize {
        self.snapshot().users.len()
    }

    pub async fn upsert_system_roles(&self) -> Result<(), RbacError> {
        for role in [Role::system_admin(), Role::system_user(), Role::system_viewer()] {
            self.put_role(&role).await?;
        }
        self.reload().await
    }

    async fn put_role(&self, role: &Role) -> Result<(), RbacError> {
        let permissions_json = serde_json::to_string(&role.permissions)?;
        sqlx::query(
            "INSERT INTO roles (id, display_name, description, permissions, is_system)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&role.id)
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(&permissions_json)
        .bind(role.is_system as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_user(&self, user: User) -> Result<(), RbacError> {
        if self.snapshot().users_by_email.contains_key(&user.email) {
            return Err(RbacError::UserExists(user.email));
        }
        let provider_str = serde_json::to_value(&user.provider)?.as_str().unwrap().to_string();
        sqlx::query(
            "INSERT INTO users (id, email, display_name, provider, password_hash, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&provider_str)
        .bind(&user.password_hash)
        .bind(user.enabled as i64)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        for role_id in &user.role_ids {
            sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(&user.id)
                .bind(role_id)
                .execute(&self.pool)
                .await?;
        }

        self.reload().await
    }

    pub async fn set_roles(&self, user_id: &str, role_ids: &HashSet<String>) -> Result<(), RbacError> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        for role_id in role_ids {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(role_id)
                .execute(&self.pool)
                .await?;
        }
        self.reload().await
    }

    pub async fn set_enabled(&self, user_id: &str, enabled: bool) -> Result<(), RbacError> {
        sqlx::query("UPDATE users SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled as i64)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        self.reload().await
    }

    pub async fn set_password_hash(&self, user_id: &str, hash: &str) -> Result<(), RbacError> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        self.reload().await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), RbacError> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = ?").bind(user_id).execute(&self.pool).await?;
        sqlx::query("DELETE FROM users WHERE id = ?").bind(user_id).execute(&self.pool).await?;
        self.reload().await
    }

    pub async fn create_role(&self, role: Role) -> Result<(), RbacError> {
        let permissions_json = serde_json::to_string(&role.permissions)?;
        sqlx::query(
            "INSERT INTO roles (id, display_name, description, permissions, is_system) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&role.id)
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(&permissions_json)
        .bind(role.is_system as i64)
        .execute(&self.pool)
        .await?;
        self.reload().await
    }

    /// Updates a role's display name/description/permissions. For system
    /// roles, the permission set may only grow.
    pub async fn update_role(&self, role_id: &str, display_name: &str, description: &str, permissions: HashSet<Permission>) -> Result<(), RbacError> {
        let existing = self
            .snapshot()
            .roles
            .get(role_id)
            .cloned()
            .ok_or_else(|| RbacError::RoleNotFound(role_id.to_string()))?;

        if existing.is_system && !existing.permissions.is_subset(&permissions) {
            return Err(RbacError::SystemRolePermissionShrink(role_id.to_string()));
        }

        let permissions_json = serde_json::to_string(&permissions)?;
        sqlx::query("UPDATE roles SET display_name = ?, description = ?, permissions = ? WHERE id = ?")
            .bind(display_name)
            .bind(description)
            .bind(&permissions_json)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        self.reload().await
    }

    pub async fn delete_role(&self, role_id: &str) -> Result<(), RbacError> {
        let snapshot = self.snapshot();
        let role = snapshot.roles.get(role_id).ok_or_else(|| RbacError::RoleNotFound(role_id.to_string()))?;
        if role.is_system {
            return Err(RbacError::SystemRoleImmutable(role_id.to_string()));
        }
        sqlx::query("DELETE FROM grants WHERE role_id = ?").bind(role_id).execute(&self.pool).await?;
        sqlx::query("DELETE FROM user_roles WHERE role_id = ?").bind(role_id).execute(&self.pool).await?;
        sqlx::query("DELETE FROM roles WHERE id = ?").bind(role_id).execute(&self.pool).await?;
        self.reload().await
    }

    /// Grants (role_id, server_id, tool_name). Idempotent: granting a
    /// triple that already exists is a no-op.
    pub async fn grant(&self, role_id: &str, server_id: &str, tool_name: &str) -> Result<bool, RbacError> {
        if !self.snapshot().roles.contains_key(role_id) {
            return Err(RbacError::RoleNotFound(role_id.to_string()));
        }
        if self.snapshot().roles[role_id].has_grant(server_id, tool_name) {
            return Ok(false);
        }
        sqlx::query("INSERT OR IGNORE INTO grants (role_id, server_id, tool_name, granted_at) VALUES (?, ?, ?, ?)")
            .bind(role_id)
            .bind(server_id)
            .bind(tool_name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        self.reload().await?;
        Ok(true)
    }

    /// Revokes a grant. Revoking an absent grant is a no-op.
    pub async fn revoke(&self, role_id: &str, server_id: &str, tool_name: &str) -> Result<bool, RbacError> {
        if !self.snapshot().roles.get(role_id).map(|r| r.has_grant(server_id, tool_name)).unwrap_or(false) {
            return Ok(false);
        }
        sqlx::query("DELETE FROM grants WHERE role_id = ? AND server_id = ? AND tool_name = ?")
            .bind(role_id)
            .bind(server_id)
            .bind(tool_name)
            .execute(&self.pool)
            .await?;
        self.reload().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::model::AuthProvider;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> RbacStore {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let store = RbacStore::new(pool).await.unwrap();
        store.upsert_system_roles().await.unwrap();
        store
    }

    fn new_user(id: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            display_name: email.to_string(),
            provider: AuthProvider::Local,
            password_hash: Some("hash".to_string()),
            enabled: true,
            role_ids: HashSet::from(["user".to_string()]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_then_reload_observes_user() {
        let store = store().await;
        store.create_user(new_user("u1", "a@x.com")).await.unwrap();
        assert_eq!(store.user_count(), 1);
        assert!(store.snapshot().users.contains_key("u1"));
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let store = store().await;
        store.create_user(new_user("u1", "a@x.com")).await.unwrap();
        let err = store.create_user(new_user("u2", "a@x.com")).await.unwrap_err();
        assert!(matches!(err, RbacError::UserExists(_)));
    }

    #[tokio::test]
    async fn grant_is_idempotent() {
        let store = store().await;
        assert!(store.grant("user", "srv1", "search").await.unwrap());
        assert!(!store.grant("user", "srv1", "search").await.unwrap());
    }

    #[tokio::test]
    async fn revoke_absent_is_noop() {
        let store = store().await;
        assert!(!store.revoke("user", "srv1", "search").await.unwrap());
    }

    #[tokio::test]
    async fn system_role_cannot_shrink_permissions() {
        let store = store().await;
        let err = store
            .update_role("admin", "Administrator", "desc", HashSet::from([Permission::ToolView]))
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::SystemRolePermissionShrink(_)));
    }

    #[tokio::test]
    async fn system_role_cannot_be_deleted() {
        let store = store().await;
        let err = store.delete_role("admin").await.unwrap_err();
        assert!(matches!(err, RbacError::SystemRoleImmutable(_)));
    }
}

//! First-run bootstrap: on an
//! empty user store, auto-create a local `admin`/`admin` user and emit a
//! WARN-severity audit event instructing the operator to rotate the
//! password. Runs at most once per process lifetime of an empty store —
//! `user_count() == 0` is the only gate, so it is also correct across
//! restarts: created iff the table is empty at boot.

use std::collections::HashSet;

use chrono::Utc;
use gateway_audit::AuditLogger;
use gateway_core::model::{AuditEventKind, AuthProvider, Severity, User};
use uuid::Uuid;

use crate::engine::RbacEngine;
use crate::error::RbacError;

pub const BOOTSTRAP_ADMIN_EMAIL: &str = "admin";
pub const BOOTSTRAP_ADMIN_PASSWORD: &str = "admin";

/// Returns `true` if the bootstrap admin was created.
pub async fn bootstrap_admin_if_empty(engine: &RbacEngine, audit: &AuditLogger) -> Result<bool, RbacError> {
    engine.store().upsert_system_roles().await?;

    if engine.store().user_count() > 0 {
        return Ok(false);
    }

    let password_hash = RbacEngine::hash_password(BOOTSTRAP_ADMIN_PASSWORD)?;
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: BOOTSTRAP_ADMIN_EMAIL.to_string(),
        display_name: "Administrator".to_string(),
        provider: AuthProvider::Local,
        password_hash: Some(password_hash),
        enabled: true,
        role_ids: HashSet::from(["admin".to_string()]),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let user_id = user.id.clone();
    engine.store().create_user(user).await?;

    tracing::warn!("bootstrapped default admin/admin account; rotate its password immediately");
    audit
        .log(
            AuditEventKind::UserBootstrapped,
            Severity::Warn,
            Some(user_id),
            Some("user".to_string()),
            Some(BOOTSTRAP_ADMIN_EMAIL.to_string()),
            true,
            serde_json::json!({ "message": "default admin/admin account created; rotate the password" }),
        )
        .await
        .map_err(|e| RbacError::PasswordHash(e.to_string()))?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RbacStore;
    use gateway_audit::{AuditLogger, SqliteAuditStorage};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn setup() -> (RbacEngine, AuditLogger) {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let rbac_store = RbacStore::new(pool.clone()).await.unwrap();
        let audit_storage = SqliteAuditStorage::new(pool).await.unwrap();
        (
            RbacEngine::new(Arc::new(rbac_store)),
            AuditLogger::new(Arc::new(audit_storage), 90),
        )
    }

    #[tokio::test]
    async fn creates_admin_exactly_once() {
        let (engine, audit) = setup().await;
        assert!(bootstrap_admin_if_empty(&engine, &audit).await.unwrap());
        assert!(!bootstrap_admin_if_empty(&engine, &audit).await.unwrap());
        assert_eq!(engine.store().user_count(), 1);
    }

    #[tokio::test]
    async fn bootstrap_password_verifies() {
        let (engine, audit) = setup().await;
        bootstrap_admin_if_empty(&engine, &audit).await.unwrap();
        let user = engine.find_user_by_email(BOOTSTRAP_ADMIN_EMAIL).unwrap();
        assert!(RbacEngine::verify_password(
            BOOTSTRAP_ADMIN_PASSWORD,
            user.password_hash.as_deref().unwrap()
        ));
    }
}

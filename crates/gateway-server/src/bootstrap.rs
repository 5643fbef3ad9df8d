//! Builds the one [`GatewayState`] every route handler closes over, and
//! spawns the background sweeps (session reaper, audit retention) that
//! run for the life of the process.

use std::sync::Arc;
use std::time::Duration;

use gateway_audit::{AuditLogger, SqliteAuditStorage};
use gateway_core::config::{ConfigStore, GatewayConfig};
use gateway_identity::keys::Keyring;
use gateway_identity::token::TokenService;
use gateway_protocol::GatewayState;
use gateway_rbac::bootstrap::bootstrap_admin_if_empty;
use gateway_rbac::{RbacEngine, RbacStore};
use gateway_registry::{HealthConfig, Registry, RegistryStore};
use gateway_session::{SessionManager, SessionManagerConfig};
use gateway_transport::TransportClient;
use sqlx::sqlite::SqlitePoolOptions;

use crate::{ensure_parent_dir, sqlite_url, REAPER_SWEEP_INTERVAL, RETENTION_SWEEP_INTERVAL};

pub async fn build_state(config: &GatewayConfig) -> anyhow::Result<Arc<GatewayState>> {
    ensure_parent_dir(&config.database_path)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&sqlite_url(&config.database_path))
        .await?;

    let config_store = Arc::new(ConfigStore::new(pool.clone()).await?);
    seed_origin_policy_from_config(&config_store, config).await?;

    let audit_storage = Arc::new(SqliteAuditStorage::new(pool.clone()).await?);
    let audit = AuditLogger::new(audit_storage, config.audit.retention_days);

    let rbac_store = Arc::new(RbacStore::new(pool.clone()).await?);
    let rbac = RbacEngine::new(rbac_store);
    bootstrap_admin_if_empty(&rbac, &audit).await?;

    let encryption_key = gateway_identity::secretbox::load_or_generate_key_file(&config.encryption_key_file)?;
    let keyring = Keyring::load_or_generate(std::path::Path::new(&config.signing_key_file), &encryption_key)?;
    let tokens = Arc::new(TokenService::new(
        keyring,
        config.jwt.legacy_hs256_secret.clone(),
        config.jwt.legacy_hs256_enabled,
        config.jwt.access_token_ttl_hours,
    ));

    let transport = Arc::new(TransportClient::new(
        16,
        64,
        Duration::from_secs(config.session.unary_call_timeout_secs),
    )?);
    let registry_store = Arc::new(RegistryStore::new(pool.clone()).await?);
    let registry = Arc::new(Registry::new(registry_store, transport, audit.clone(), HealthConfig::default()));

    let sessions = Arc::new(SessionManager::new(SessionManagerConfig {
        buffer_capacity: config.session.event_buffer_capacity,
        sse_queue_capacity: config.session.sse_queue_capacity,
        idle_timeout: chrono::Duration::seconds(config.session.idle_timeout_secs as i64),
    }));
    sessions.spawn_reaper(REAPER_SWEEP_INTERVAL);
    audit.spawn_retention_sweep(RETENTION_SWEEP_INTERVAL);

    Ok(Arc::new(GatewayState {
        config: config_store,
        tokens,
        rbac,
        registry,
        sessions,
        audit,
        dev_mode: config.origin.dev_mode,
        unary_call_timeout: Duration::from_secs(config.session.unary_call_timeout_secs),
        admin_first_run_bypass_paths: config.admin.first_run_bypass_paths.clone(),
    }))
}

/// On first boot (version 0 in the store), seeds `origin_policy` from the
/// `ALLOWED_ORIGINS`/`origin.*` config-file values already folded into
/// `config` by [`GatewayConfig::load_with_fallback`]. Later admin-plane writes
/// take precedence over this seed on every subsequent boot.
async fn seed_origin_policy_from_config(store: &ConfigStore, config: &GatewayConfig) -> anyhow::Result<()> {
    if store.version(gateway_core::config::store::keys::ORIGIN_POLICY) > 0 {
        return Ok(());
    }
    let mut policy = gateway_core::model::OriginPolicy::default();
    for origin in &config.origin.allowed_origins {
        if let Ok(sanitized) = gateway_origin::sanitize_for_allowlist(origin) {
            policy.allowlist.insert(sanitized);
        }
    }
    policy.allow_https_any = config.origin.allow_https_any;
    policy.allow_ngrok = config.origin.allow_ngrok;
    store
        .set(gateway_core::config::store::keys::ORIGIN_POLICY, serde_json::to_value(&policy)?)
        .await?;
    Ok(())
}

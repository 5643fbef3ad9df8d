//! Shared collaborator handle the Protocol Gateway's handlers close over.

use std::sync::Arc;

use gateway_audit::AuditLogger;
use gateway_core::config::ConfigStore;
use gateway_core::model::OriginPolicy;
use gateway_identity::TokenService;
use gateway_rbac::RbacEngine;
use gateway_registry::Registry;
use gateway_session::SessionManager;

pub struct GatewayState {
    pub config: Arc<ConfigStore>,
    pub tokens: Arc<TokenService>,
    pub rbac: RbacEngine,
    pub registry: Arc<Registry>,
    pub sessions: Arc<SessionManager>,
    pub audit: AuditLogger,
    /// Permits the no-origin escape hatch, restricted to
    /// localhost development by the composition root.
    pub dev_mode: bool,
    pub unary_call_timeout: std::time::Duration,
    /// Admin-plane paths reachable with no authenticated caller while the
    /// user table is empty, e.g. the
    /// OAuth/AD bootstrap endpoints an operator needs before any admin
    /// account exists.
    pub admin_first_run_bypass_paths: Vec<String>,
}

impl GatewayState {
    /// The live [`OriginPolicy`], read through the Config Store on every
    /// call so an admin-plane update is observed immediately.
    pub fn origin_policy(&self) -> OriginPolicy {
        self.config
            .get(gateway_core::config::store::keys::ORIGIN_POLICY)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

//! Shared request guards the Admin Control Plane's handlers all go
//! through: origin validation, bearer identity resolution, coarse
//! permission checks, and the first-run bypass for the handful of
//! endpoints an operator needs reachable before any admin account exists.

use std::sync::Arc;

use axum::http::HeaderMap;
use gateway_core::model::{AuditEventKind, Permission, Severity, User};
use gateway_core::GatewayError;
use gateway_identity::resolve::{extract_credential, resolve, Resolution};
use gateway_protocol::GatewayState;

/// Resolves the caller's identity from the `Authorization` header, failing
/// with `AUTH_REQUIRED` if no credential was presented or it didn't
/// resolve to an enabled user.
pub async fn authenticate(state: &GatewayState, headers: &HeaderMap) -> Result<User, GatewayError> {
    let credential = extract_credential(headers, "");
    match resolve(&state.tokens, &state.rbac, credential.as_deref())? {
        Resolution::Identified(resolved) => Ok(resolved.user),
        Resolution::Anonymous => Err(GatewayError::auth_required("authentication required")),
    }
}

pub fn require_permission(state: &GatewayState, user: &User, permission: Permission) -> Result<(), GatewayError> {
    if state.rbac.has_permission(user, permission) {
        Ok(())
    } else {
        Err(GatewayError::authz_denied(format!("missing permission {permission:?}")))
    }
}

/// True, and audited, when `path` is on the first-run bypass allowlist and
/// no user has been created yet — the only way an operator can reach
/// OAuth/AD bootstrap config on a brand-new install with no admin account
/// to authenticate as.
pub async fn first_run_bypass(state: &Arc<GatewayState>, path: &str) -> bool {
    if state.rbac.store().user_count() != 0 {
        return false;
    }
    if !state.admin_first_run_bypass_paths.iter().any(|p| p == path) {
        return false;
    }
    state
        .audit
        .log(
            AuditEventKind::AdminFirstRunBypass,
            Severity::Warn,
            None,
            Some("admin_endpoint".into()),
            Some(path.to_string()),
            true,
            serde_json::json!({}),
        )
        .await
        .ok();
    true
}

/// Standard guard for a permission-gated admin endpoint: origin check,
/// first-run bypass check, then authenticate + authorize. `Ok(None)` means
/// the first-run bypass applied and the handler should proceed with no
/// caller identity; `Ok(Some(user))` is the normal authenticated path.
pub async fn guard(
    state: &Arc<GatewayState>,
    headers: &HeaderMap,
    path: &str,
    permission: Permission,
) -> Result<Option<User>, GatewayError> {
    if let Some(err) = gateway_protocol::check_origin(state, headers).await {
        return Err(err);
    }
    if first_run_bypass(state, path).await {
        return Ok(None);
    }
    let user = authenticate(state, headers).await?;
    require_permission(state, &user, permission)?;
    Ok(Some(user))
}

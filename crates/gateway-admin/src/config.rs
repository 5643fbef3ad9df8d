//! Origin policy, JWT, and AD/OAuth config endpoints.
//!
//! Every write goes through [`gateway_core::config::ConfigStore::set`] and
//! is followed by a `ConfigChanged` audit event carrying the old and new
//! version — the store itself stays audit-agnostic (its own doc comment
//! explains why) so this crate is the one place that pairs a write with
//! the event that accompanies it.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use gateway_core::config::store::keys;
use gateway_core::model::{AuditEventKind, OriginPolicy, Permission, Severity};
use gateway_protocol::GatewayState;
use serde::Deserialize;

use crate::guard::guard;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/admin/origins", get(get_origins).post(add_origin).delete(remove_origin))
        .route("/admin/origins/flags", put(set_origin_flags))
        .route("/admin/jwt-config", get(get_jwt_config).put(set_jwt_config))
        .route("/admin/jwt-config/rotate", post(rotate_jwt_key))
        .route("/admin/ad/config", get(get_ad_config).put(set_ad_config))
        .route("/admin/ad/test-bind", post(test_ad_bind))
        .route("/admin/ad/groups", get(get_ad_groups))
        .route("/admin/ad/groups/{group}/members", get(get_ad_group_members))
        .route("/admin/oauth/providers", get(get_oauth_providers).put(set_oauth_providers))
}

fn current_policy(state: &GatewayState) -> OriginPolicy {
    state.origin_policy()
}

async fn audit_config_change(state: &GatewayState, caller: Option<String>, key: &str, version: i64) {
    state
        .audit
        .log(AuditEventKind::ConfigChanged, Severity::Info, caller, Some("config".into()), Some(key.to_string()), true, serde_json::json!({ "version": version }))
        .await
        .ok();
}

async fn get_origins(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Err(err) = guard(&state, &headers, "/admin/origins", Permission::ConfigView).await {
        return gateway_protocol::error::http_error(&err);
    }
    Json(current_policy(&state)).into_response()
}

#[derive(Deserialize)]
struct OriginRequest {
    origin: String,
}

/// Adds a hostname to the allowlist, idempotently: adding
/// one already present is a no-op write (the resulting set is identical).
async fn add_origin(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<OriginRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/origins", Permission::ConfigEdit).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    let sanitized = match gateway_origin::sanitize_for_allowlist(&body.origin) {
        Ok(s) => s,
        Err(err) => return gateway_protocol::error::http_error(&gateway_core::GatewayError::config_invalid(err.to_string())),
    };

    let mut policy = current_policy(&state);
    if !policy.allowlist.insert(sanitized) {
        return Json(policy).into_response();
    }
    let version = match state.config.set(keys::ORIGIN_POLICY, serde_json::to_value(&policy).unwrap()).await {
        Ok(v) => v,
        Err(err) => return gateway_protocol::error::http_error(&gateway_core::GatewayError::internal(err.to_string())),
    };
    audit_config_change(&state, caller.map(|u| u.id), keys::ORIGIN_POLICY, version).await;
    Json(policy).into_response()
}

/// Removes a hostname from the allowlist, idempotently: removing one
/// already absent is a no-op.
async fn remove_origin(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<OriginRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/origins", Permission::ConfigEdit).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    let mut policy = current_policy(&state);
    if !policy.allowlist.remove(&body.origin) {
        return Json(policy).into_response();
    }
    let version = match state.config.set(keys::ORIGIN_POLICY, serde_json::to_value(&policy).unwrap()).await {
        Ok(v) => v,
        Err(err) => return gateway_protocol::error::http_error(&gateway_core::GatewayError::internal(err.to_string())),
    };
    audit_config_change(&state, caller.map(|u| u.id), keys::ORIGIN_POLICY, version).await;
    Json(policy).into_response()
}

#[derive(Deserialize)]
struct OriginFlagsRequest {
    allow_https_any: bool,
    allow_ngrok: bool,
}

async fn set_origin_flags(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<OriginFlagsRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/origins/flags", Permission::ConfigEdit).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    let mut policy = current_policy(&state);
    policy.allow_https_any = body.allow_https_any;
    policy.allow_ngrok = body.allow_ngrok;
    let version = match state.config.set(keys::ORIGIN_POLICY, serde_json::to_value(&policy).unwrap()).await {
        Ok(v) => v,
        Err(err) => return gateway_protocol::error::http_error(&gateway_core::GatewayError::internal(err.to_string())),
    };
    audit_config_change(&state, caller.map(|u| u.id), keys::ORIGIN_POLICY, version).await;
    Json(policy).into_response()
}

async fn get_jwt_config(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Err(err) = guard(&state, &headers, "/admin/jwt-config", Permission::ConfigView).await {
        return gateway_protocol::error::http_error(&err);
    }
    let mut stored = state.config.get(keys::JWT_CONFIG).unwrap_or_else(|| serde_json::json!({}));
    // legacy_hs256_secret is write-only: never echo it back.
    if let Some(obj) = stored.as_object_mut() {
        obj.remove("legacy_hs256_secret");
        obj.insert("legacy_hs256_enabled_at_runtime".to_string(), serde_json::json!(state.tokens.legacy_hs256_enabled()));
    }
    Json(stored).into_response()
}

#[derive(Deserialize)]
struct JwtConfigRequest {
    legacy_hs256_enabled: Option<bool>,
    legacy_hs256_secret: Option<String>,
    access_token_ttl_hours: Option<i64>,
    jwks_cache_ttl_secs: Option<u64>,
}

/// Persists JWT tuning to the config store. The running process's
/// [`gateway_identity::token::TokenService`] reads its legacy-secret and
/// TTL fields once at startup; a config write here takes effect on next
/// restart except for key rotation, which `POST .../rotate` applies live.
async fn set_jwt_config(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<JwtConfigRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/jwt-config", Permission::ConfigEdit).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    let mut stored = state.config.get(keys::JWT_CONFIG).unwrap_or_else(|| serde_json::json!({}));
    let obj = stored.as_object_mut().get_or_insert_with(Default::default);
    if let Some(v) = body.legacy_hs256_enabled {
        obj.insert("legacy_hs256_enabled".to_string(), serde_json::json!(v));
    }
    if let Some(v) = &body.legacy_hs256_secret {
        obj.insert("legacy_hs256_secret".to_string(), serde_json::json!(v));
    }
    if let Some(v) = body.access_token_ttl_hours {
        obj.insert("access_token_ttl_hours".to_string(), serde_json::json!(v));
    }
    if let Some(v) = body.jwks_cache_ttl_secs {
        obj.insert("jwks_cache_ttl_secs".to_string(), serde_json::json!(v));
    }

    let version = match state.config.set(keys::JWT_CONFIG, stored).await {
        Ok(v) => v,
        Err(err) => return gateway_protocol::error::http_error(&gateway_core::GatewayError::internal(err.to_string())),
    };
    audit_config_change(&state, caller.map(|u| u.id), keys::JWT_CONFIG, version).await;
    Json(serde_json::json!({ "version": version })).into_response()
}

async fn rotate_jwt_key(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    let caller = match guard(&state, &headers, "/admin/jwt-config/rotate", Permission::ConfigEdit).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    if let Err(err) = state.tokens.rotate() {
        return gateway_protocol::error::http_error(&err.into());
    }

    state
        .audit
        .log(AuditEventKind::ConfigChanged, Severity::Info, caller.map(|u| u.id), Some("jwt_keyring".into()), None, true, serde_json::json!({ "action": "rotate" }))
        .await
        .ok();

    Json(state.tokens.jwks_document()).into_response()
}

/// AD integration is out of scope: this only
/// persists the connection config an operator drafts ahead of a future
/// integration, with no directory connection ever attempted.
async fn get_ad_config(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Err(err) = guard(&state, &headers, "/admin/ad/config", Permission::AdManage).await {
        return gateway_protocol::error::http_error(&err);
    }
    Json(state.config.get(keys::AD_CONFIG).unwrap_or_else(|| serde_json::json!({}))).into_response()
}

async fn set_ad_config(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<serde_json::Value>) -> Response {
    let caller = match guard(&state, &headers, "/admin/ad/config", Permission::AdManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    let version = match state.config.set(keys::AD_CONFIG, body).await {
        Ok(v) => v,
        Err(err) => return gateway_protocol::error::http_error(&gateway_core::GatewayError::internal(err.to_string())),
    };
    audit_config_change(&state, caller.map(|u| u.id), keys::AD_CONFIG, version).await;
    Json(serde_json::json!({ "version": version })).into_response()
}

/// Directory connectivity is out of scope: binding, group query, and
/// group-membership query all require an actual LDAP/AD client, which no
/// external collaborator has wired in. Each returns the same
/// `CONFIG_INVALID` stub so a caller can't mistake "not integrated" for a
/// real empty result.
async fn test_ad_bind(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Err(err) = guard(&state, &headers, "/admin/ad/test-bind", Permission::AdManage).await {
        return gateway_protocol::error::http_error(&err);
    }
    gateway_protocol::error::http_error(&gateway_core::GatewayError::config_invalid("AD integration not wired"))
}

async fn get_ad_groups(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Err(err) = guard(&state, &headers, "/admin/ad/groups", Permission::AdManage).await {
        return gateway_protocol::error::http_error(&err);
    }
    gateway_protocol::error::http_error(&gateway_core::GatewayError::config_invalid("AD integration not wired"))
}

async fn get_ad_group_members(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(_group): Path<String>,
) -> Response {
    if let Err(err) = guard(&state, &headers, "/admin/ad/groups/{group}/members", Permission::AdManage).await {
        return gateway_protocol::error::http_error(&err);
    }
    gateway_protocol::error::http_error(&gateway_core::GatewayError::config_invalid("AD integration not wired"))
}

async fn get_oauth_providers(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Err(err) = guard(&state, &headers, "/admin/oauth/providers", Permission::OauthManage).await {
        return gateway_protocol::error::http_error(&err);
    }
    Json(state.config.get(keys::OAUTH_PROVIDERS).unwrap_or_else(|| serde_json::json!({ "providers": [] }))).into_response()
}

async fn set_oauth_providers(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<serde_json::Value>) -> Response {
    let caller = match guard(&state, &headers, "/admin/oauth/providers", Permission::OauthManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    let version = match state.config.set(keys::OAUTH_PROVIDERS, body).await {
        Ok(v) => v,
        Err(err) => return gateway_protocol::error::http_error(&gateway_core::GatewayError::internal(err.to_string())),
    };
    audit_config_change(&state, caller.map(|u| u.id), keys::OAUTH_PROVIDERS, version).await;
    Json(serde_json::json!({ "version": version })).into_response()
}

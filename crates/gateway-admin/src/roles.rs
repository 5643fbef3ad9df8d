//! Role and grant management endpoints.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use gateway_core::model::{AuditEventKind, Permission, Role, Severity};
use gateway_protocol::GatewayState;
use serde::Deserialize;

use crate::guard::guard;
use crate::view::PublicRole;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/admin/roles", get(list_roles).post(create_role))
        .route("/admin/roles/{id}", axum::routing::patch(update_role).delete(delete_role))
        .route("/admin/roles/{id}/grants", post(grant).delete(revoke))
}

async fn list_roles(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Err(err) = guard(&state, &headers, "/admin/roles", Permission::RoleManage).await {
        return gateway_protocol::error::http_error(&err);
    }
    let roles: Vec<PublicRole> = state.rbac.store().snapshot().roles.values().map(PublicRole::from).collect();
    Json(roles).into_response()
}

#[derive(Deserialize)]
struct CreateRoleRequest {
    id: String,
    display_name: String,
    description: String,
    #[serde(default)]
    permissions: HashSet<Permission>,
}

async fn create_role(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<CreateRoleRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/roles", Permission::RoleManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    let role = Role {
        id: body.id.clone(),
        display_name: body.display_name,
        description: body.description,
        permissions: body.permissions,
        is_system: false,
        grants: Vec::new(),
    };
    if let Err(err) = state.rbac.store().create_role(role).await {
        return gateway_protocol::error::http_error(&err.into());
    }

    state
        .audit
        .log(
            AuditEventKind::ConfigChanged,
            Severity::Info,
            caller.map(|u| u.id),
            Some("role".into()),
            Some(body.id.clone()),
            true,
            serde_json::json!({ "action": "create_role" }),
        )
        .await
        .ok();

    match state.rbac.store().snapshot().roles.get(&body.id) {
        Some(role) => (StatusCode::CREATED, Json(PublicRole::from(role))).into_response(),
        None => StatusCode::CREATED.into_response(),
    }
}

#[derive(Deserialize)]
struct UpdateRoleRequest {
    display_name: String,
    description: String,
    permissions: HashSet<Permission>,
}

async fn update_role(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Path(id): Path<String>, Json(body): Json<UpdateRoleRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/roles", Permission::RoleManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    if let Err(err) = state.rbac.store().update_role(&id, &body.display_name, &body.description, body.permissions).await {
        return gateway_protocol::error::http_error(&err.into());
    }

    state
        .audit
        .log(
            AuditEventKind::ConfigChanged,
            Severity::Info,
            caller.map(|u| u.id),
            Some("role".into()),
            Some(id.clone()),
            true,
            serde_json::json!({ "action": "update_role" }),
        )
        .await
        .ok();

    match state.rbac.store().snapshot().roles.get(&id) {
        Some(role) => Json(PublicRole::from(role)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_role(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let caller = match guard(&state, &headers, "/admin/roles", Permission::RoleManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    if let Err(err) = state.rbac.store().delete_role(&id).await {
        return gateway_protocol::error::http_error(&err.into());
    }

    state
        .audit
        .log(AuditEventKind::ConfigChanged, Severity::Info, caller.map(|u| u.id), Some("role".into()), Some(id), true, serde_json::json!({ "action": "delete_role" }))
        .await
        .ok();

    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
struct GrantRequest {
    server_id: String,
    tool_name: String,
}

async fn grant(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Path(id): Path<String>, Json(body): Json<GrantRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/roles", Permission::RoleManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    let created = match state.rbac.store().grant(&id, &body.server_id, &body.tool_name).await {
        Ok(created) => created,
        Err(err) => return gateway_protocol::error::http_error(&err.into()),
    };

    state
        .audit
        .log(
            AuditEventKind::ConfigChanged,
            Severity::Info,
            caller.map(|u| u.id),
            Some("grant".into()),
            Some(format!("{id}/{}/{}", body.server_id, body.tool_name)),
            true,
            serde_json::json!({ "action": "grant", "created": created }),
        )
        .await
        .ok();

    StatusCode::NO_CONTENT.into_response()
}

async fn revoke(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Path(id): Path<String>, Json(body): Json<GrantRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/roles", Permission::RoleManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    let removed = match state.rbac.store().revoke(&id, &body.server_id, &body.tool_name).await {
        Ok(removed) => removed,
        Err(err) => return gateway_protocol::error::http_error(&err.into()),
    };

    state
        .audit
        .log(
            AuditEventKind::ConfigChanged,
            Severity::Info,
            caller.map(|u| u.id),
            Some("grant".into()),
            Some(format!("{id}/{}/{}", body.server_id, body.tool_name)),
            true,
            serde_json::json!({ "action": "revoke", "removed": removed }),
        )
        .await
        .ok();

    StatusCode::NO_CONTENT.into_response()
}

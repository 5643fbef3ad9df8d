//! User management endpoints.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use chrono::Utc;
use gateway_core::model::{AuditEventKind, AuthProvider, Permission, Severity, User};
use gateway_protocol::GatewayState;
use gateway_rbac::RbacEngine;
use serde::Deserialize;
use uuid::Uuid;

use crate::guard::guard;
use crate::view::PublicUser;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route("/admin/users/{id}", patch(update_user).delete(delete_user))
}

async fn list_users(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    match guard(&state, &headers, "/admin/users", Permission::UserManage).await {
        Ok(_) => {}
        Err(err) => return gateway_protocol::error::http_error(&err),
    }
    let users: Vec<PublicUser> = state.rbac.store().snapshot().users.values().map(PublicUser::from).collect();
    Json(users).into_response()
}

#[derive(Deserialize)]
struct CreateUserRequest {
    email: String,
    password: String,
    display_name: String,
    #[serde(default)]
    role_ids: HashSet<String>,
}

async fn create_user(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<CreateUserRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/users", Permission::UserManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    let hash = match RbacEngine::hash_password(&body.password) {
        Ok(h) => h,
        Err(err) => return gateway_protocol::error::http_error(&err.into()),
    };

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: body.email,
        display_name: body.display_name,
        provider: AuthProvider::Local,
        password_hash: Some(hash),
        enabled: true,
        role_ids: if body.role_ids.is_empty() { HashSet::from(["user".to_string()]) } else { body.role_ids },
        created_at: now,
        updated_at: now,
    };

    if let Err(err) = state.rbac.store().create_user(user.clone()).await {
        return gateway_protocol::error::http_error(&err.into());
    }

    state
        .audit
        .log(
            AuditEventKind::ConfigChanged,
            Severity::Info,
            caller.map(|u| u.id),
            Some("user".into()),
            Some(user.id.clone()),
            true,
            serde_json::json!({ "action": "create_user", "email": user.email }),
        )
        .await
        .ok();

    (StatusCode::CREATED, Json(PublicUser::from(&user))).into_response()
}

#[derive(Deserialize, Default)]
struct UpdateUserRequest {
    enabled: Option<bool>,
    role_ids: Option<HashSet<String>>,
    password: Option<String>,
}

async fn update_user(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Path(id): Path<String>, Json(body): Json<UpdateUserRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/users", Permission::UserManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    if let Some(enabled) = body.enabled {
        if let Err(err) = state.rbac.store().set_enabled(&id, enabled).await {
            return gateway_protocol::error::http_error(&err.into());
        }
    }
    if let Some(role_ids) = &body.role_ids {
        if let Err(err) = state.rbac.store().set_roles(&id, role_ids).await {
            return gateway_protocol::error::http_error(&err.into());
        }
    }
    if let Some(password) = &body.password {
        let hash = match RbacEngine::hash_password(password) {
            Ok(h) => h,
            Err(err) => return gateway_protocol::error::http_error(&err.into()),
        };
        if let Err(err) = state.rbac.store().set_password_hash(&id, &hash).await {
            return gateway_protocol::error::http_error(&err.into());
        }
    }

    state
        .audit
        .log(
            AuditEventKind::ConfigChanged,
            Severity::Info,
            caller.map(|u| u.id),
            Some("user".into()),
            Some(id.clone()),
            true,
            serde_json::json!({ "action": "update_user" }),
        )
        .await
        .ok();

    match state.rbac.find_user(&id) {
        Some(user) => Json(PublicUser::from(&user)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_user(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let caller = match guard(&state, &headers, "/admin/users", Permission::UserManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    if let Err(err) = state.rbac.store().delete_user(&id).await {
        return gateway_protocol::error::http_error(&err.into());
    }

    state
        .audit
        .log(
            AuditEventKind::ConfigChanged,
            Severity::Info,
            caller.map(|u| u.id),
            Some("user".into()),
            Some(id),
            true,
            serde_json::json!({ "action": "delete_user" }),
        )
        .await
        .ok();

    StatusCode::NO_CONTENT.into_response()
}

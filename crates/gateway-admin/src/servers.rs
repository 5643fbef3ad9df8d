//! Upstream server management endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use gateway_core::model::{AuditEventKind, Permission, Severity};
use gateway_protocol::GatewayState;
use serde::Deserialize;

use crate::guard::guard;
use crate::view::PublicServer;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/admin/servers", get(list_servers).post(register_server))
        .route("/admin/servers/{id}", axum::routing::delete(unregister_server))
        .route("/admin/servers/{id}/refresh", post(refresh_server))
}

async fn list_servers(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Err(err) = guard(&state, &headers, "/admin/servers", Permission::ServerManage).await {
        return gateway_protocol::error::http_error(&err);
    }
    let servers: Vec<PublicServer> = state.registry.servers().iter().map(PublicServer::from).collect();
    Json(servers).into_response()
}

#[derive(Deserialize)]
struct RegisterServerRequest {
    id: String,
    base_endpoint_url: String,
}

async fn register_server(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<RegisterServerRequest>) -> Response {
    let caller = match guard(&state, &headers, "/admin/servers", Permission::ServerManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    match state.registry.register(&body.id, &body.base_endpoint_url).await {
        Ok(server) => {
            state
                .audit
                .log(
                    AuditEventKind::ConfigChanged,
                    Severity::Info,
                    caller.map(|u| u.id),
                    Some("upstream_server".into()),
                    Some(server.id.clone()),
                    true,
                    serde_json::json!({ "action": "register_server" }),
                )
                .await
                .ok();
            (StatusCode::CREATED, Json(PublicServer::from(&server))).into_response()
        }
        Err(err) => gateway_protocol::error::http_error(&err.into()),
    }
}

async fn unregister_server(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let caller = match guard(&state, &headers, "/admin/servers", Permission::ServerManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    if let Err(err) = state.registry.unregister(&id).await {
        return gateway_protocol::error::http_error(&err.into());
    }

    state
        .audit
        .log(
            AuditEventKind::ConfigChanged,
            Severity::Info,
            caller.map(|u| u.id),
            Some("upstream_server".into()),
            Some(id),
            true,
            serde_json::json!({ "action": "unregister_server" }),
        )
        .await
        .ok();

    StatusCode::NO_CONTENT.into_response()
}

async fn refresh_server(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let caller = match guard(&state, &headers, "/admin/servers", Permission::ServerManage).await {
        Ok(caller) => caller,
        Err(err) => return gateway_protocol::error::http_error(&err),
    };

    if let Err(err) = state.registry.refresh_tools(&id).await {
        return gateway_protocol::error::http_error(&err.into());
    }

    state
        .audit
        .log(
            AuditEventKind::ConfigChanged,
            Severity::Info,
            caller.map(|u| u.id),
            Some("upstream_server".into()),
            Some(id.clone()),
            true,
            serde_json::json!({ "action": "refresh_tools" }),
        )
        .await
        .ok();

    match state.registry.server(&id) {
        Some(server) => Json(PublicServer::from(&server)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

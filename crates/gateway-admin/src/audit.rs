//! Audit query endpoint.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::http::HeaderMap;
use axum::Router;
use chrono::{DateTime, Utc};
use gateway_audit::AuditFilter;
use gateway_core::model::{AuditEventKind, Permission};
use gateway_protocol::GatewayState;
use serde::Deserialize;

use crate::guard::guard;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new().route("/admin/audit", get(query_audit))
}

#[derive(Deserialize)]
struct AuditQuery {
    kind: Option<AuditEventKind>,
    user_id: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn query_audit(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Query(q): Query<AuditQuery>) -> Response {
    if let Err(err) = guard(&state, &headers, "/admin/audit", Permission::AuditView).await {
        return gateway_protocol::error::http_error(&err);
    }

    let filter = AuditFilter {
        kind: q.kind,
        user_id: q.user_id,
        start_time: q.start,
        end_time: q.end,
        limit: Some(q.limit.unwrap_or(100).min(1000)),
        offset: q.offset,
    };

    match state.audit.query(filter).await {
        Ok(events) => Json(events).into_response(),
        Err(err) => gateway_protocol::error::http_error(&gateway_core::GatewayError::internal(err.to_string())),
    }
}

//! The `/mcp` HTTP surface: `POST` for JSON-RPC dispatch, `GET` to open or resume the
//! session's SSE stream, `DELETE` to close a session. Mirrors the
//! teacher's axum `Router` + `Sse`/`async_stream::stream!` wiring, with
//! the decision logic generalized for origin/identity/RBAC enforcement.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use gateway_core::model::{AuditEventKind, Severity};
use gateway_core::rpc::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use gateway_core::GatewayError;
use gateway_identity::resolve::{extract_credential, resolve, Resolution};
use gateway_registry::resolve_unique;
use gateway_transport::UpstreamOutcome;

use crate::error::{http_error, jsonrpc_error, parse_error};
use crate::protocol::{protocol_version_matches, McpRequest};
use crate::state::GatewayState;

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_HEADER: &str = "mcp-protocol-version";
const LAST_EVENT_HEADER: &str = "last-event-id";

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new().route("/mcp", post(post_handler).get(get_handler).delete(delete_handler))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|s| !s.is_empty())
}

/// Origin validation, run first for every verb on this surface. Returns `None` and has already
/// audited the rejection when the origin must be denied.
pub async fn check_origin(state: &GatewayState, headers: &HeaderMap) -> Option<GatewayError> {
    let origin = gateway_origin::extract(headers);
    let policy = state.origin_policy();
    let decision = gateway_origin::validate(origin.as_ref(), &policy, state.dev_mode);
    if gateway_origin::enforce(decision, origin.as_ref()) {
        return None;
    }
    state
        .audit
        .log(
            AuditEventKind::OriginRejected,
            Severity::Error,
            None,
            None,
            None,
            false,
            serde_json::json!({ "origin": origin.map(|o| o.as_str()) }),
        )
        .await
        .ok();
    Some(GatewayError::origin_denied("origin not permitted"))
}

async fn post_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: axum::body::Bytes,
) -> Response {
    if let Some(err) = check_origin(&state, &headers).await {
        return http_error(&err);
    }

    let raw: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return parse_error(),
    };
    let request = McpRequest::from_raw(&raw);
    let id = request.id();

    let query = query.unwrap_or_default();
    let identity = match resolve(&state.tokens, &state.rbac, extract_credential(&headers, &query).as_deref()) {
        Ok(r) => r,
        Err(e) => return jsonrpc_error(id, &e.into()),
    };

    match request {
        McpRequest::Initialize { protocol_version, .. } => handle_initialize(&state, id, protocol_version).await,
        McpRequest::ToolsList { .. } => {
            if let Err(err) = check_protocol_header(&headers) {
                return jsonrpc_error(id, &err);
            }
            let Some(user) = require_identified(&identity) else {
                return jsonrpc_error(id, &GatewayError::auth_required("tools/list requires authentication"));
            };
            if header_str(&headers, SESSION_HEADER).and_then(|sid| state.sessions.get(sid).ok()).is_none() {
                return jsonrpc_error(id, &GatewayError::session_unknown("unknown or closed session"));
            }
            handle_tools_list(&state, id, user).await
        }
        McpRequest::ToolsCall { name, arguments, .. } => {
            if let Err(err) = check_protocol_header(&headers) {
                return jsonrpc_error(id, &err);
            }
            let Some(user) = require_identified(&identity) else {
                return jsonrpc_error(id, &GatewayError::auth_required("tools/call requires authentication"));
            };
            let Some(session_id) = header_str(&headers, SESSION_HEADER) else {
                return jsonrpc_error(id, &GatewayError::session_unknown("missing Mcp-Session-Id header"));
            };
            let Ok(session) = state.sessions.get(session_id) else {
                return jsonrpc_error(id, &GatewayError::session_unknown("unknown or closed session"));
            };
            handle_tools_call(&state, session, id, user, name, arguments).await
        }
        McpRequest::Unknown { method, .. } => {
            let body = JsonRpcResponse::error(id, -32601, format!("method not found: {method}"), None);
            (StatusCode::OK, Json(body)).into_response()
        }
    }
}

/// `initialize` may proceed anonymously: the session is created either
/// way, and an unauthenticated caller simply gets an unfiltered
/// capability advertisement.
async fn handle_initialize(state: &Arc<GatewayState>, id: Option<serde_json::Value>, protocol_version: Option<String>) -> Response {
    let Some(version) = protocol_version else {
        return jsonrpc_error(id, &GatewayError::protocol_version_mismatch("missing protocolVersion"));
    };
    if !protocol_version_matches(&version) {
        return jsonrpc_error(id, &GatewayError::protocol_version_mismatch(format!("unsupported protocolVersion: {version}")));
    }

    let session = state.sessions.create(None);
    state.sessions.activate(&session);

    state
        .audit
        .log(
            AuditEventKind::SessionInitialized,
            Severity::Info,
            None,
            Some("session".into()),
            Some(session.id.clone()),
            true,
            serde_json::json!({}),
        )
        .await
        .ok();

    let result = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": { "name": "mcp-gateway", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": { "tools": { "listChanged": true } },
    });
    let body = JsonRpcResponse::success(id, result);

    let mut response = (StatusCode::OK, Json(body)).into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(&session.id) {
        response.headers_mut().insert("Mcp-Session-Id", value);
    }
    response
}

async fn handle_tools_list(state: &Arc<GatewayState>, id: Option<serde_json::Value>, user: gateway_core::model::User) -> Response {
    let all_tools = state.registry.all_tools();
    let visible = state.rbac.visible_tools(&user, &all_tools);

    state
        .audit
        .log(
            AuditEventKind::ToolsListed,
            Severity::Info,
            Some(user.id.clone()),
            None,
            None,
            true,
            serde_json::json!({ "count": visible.len() }),
        )
        .await
        .ok();

    let tools: Vec<serde_json::Value> = visible
        .iter()
        .map(|t| serde_json::json!({ "name": t.name, "description": t.description, "inputSchema": t.input_schema }))
        .collect();
    let body = JsonRpcResponse::success(id, serde_json::json!({ "tools": tools }));
    (StatusCode::OK, Json(body)).into_response()
}

async fn handle_tools_call(
    state: &Arc<GatewayState>,
    session: Arc<gateway_session::Session>,
    id: Option<serde_json::Value>,
    user: gateway_core::model::User,
    name: String,
    arguments: serde_json::Value,
) -> Response {
    let all_tools = state.registry.all_tools();
    let visible: Vec<gateway_core::model::Tool> = state.rbac.visible_tools(&user, &all_tools).into_iter().cloned().collect();

    let (server_id, tool_name) = match resolve_unique(&name, &visible) {
        Ok(pair) => pair,
        Err(err) => return jsonrpc_error(id, &err.into()),
    };

    if !state.rbac.can_execute_tool(&user, &server_id, &tool_name) {
        state
            .audit
            .log(
                AuditEventKind::AuthzPermissionDenied,
                Severity::Warn,
                Some(user.id.clone()),
                Some("tool".into()),
                Some(format!("{server_id}/{tool_name}")),
                false,
                serde_json::json!({ "tool": tool_name }),
            )
            .await
            .ok();
        return jsonrpc_error(id, &GatewayError::authz_denied("not authorized to execute this tool"));
    }

    state
        .audit
        .log(
            AuditEventKind::AuthzPermissionGranted,
            Severity::Info,
            Some(user.id.clone()),
            Some("tool".into()),
            Some(format!("{server_id}/{tool_name}")),
            true,
            serde_json::json!({ "tool": tool_name }),
        )
        .await
        .ok();

    let outcome = match state.registry.call_tool(&server_id, &tool_name, arguments, id.clone()).await {
        Ok(o) => o,
        Err(err) => return jsonrpc_error(id, &err.into()),
    };

    match outcome {
        UpstreamOutcome::Unary(mut response) => {
            response.id = id;
            (StatusCode::OK, Json(response)).into_response()
        }
        UpstreamOutcome::Stream(mut rx) => {
            let stream = async_stream::stream! {
                while let Some(upstream_event) = rx.recv().await {
                    match session.append_event(upstream_event.payload).await {
                        Ok(event) => {
                            let data = serde_json::to_string(&event.payload).unwrap_or_default();
                            yield Ok::<_, std::convert::Infallible>(Event::default().id(event.event_id.to_string()).data(data));
                        }
                        Err(_) => break,
                    }
                }
            };
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
        }
    }
}

fn require_identified(resolution: &Resolution) -> Option<gateway_core::model::User> {
    match resolution {
        Resolution::Identified(r) => Some(r.user.clone()),
        Resolution::Anonymous => None,
    }
}

/// Enforces the `MCP-Protocol-Version` header on every method after the
/// `initialize` handshake.
fn check_protocol_header(headers: &HeaderMap) -> Result<(), GatewayError> {
    let Some(version) = header_str(headers, PROTOCOL_HEADER) else {
        return Err(GatewayError::protocol_version_mismatch("missing MCP-Protocol-Version header"));
    };
    if !protocol_version_matches(version) {
        return Err(GatewayError::protocol_version_mismatch(format!("unsupported protocol version: {version}")));
    }
    Ok(())
}

async fn get_handler(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Some(err) = check_origin(&state, &headers).await {
        return http_error(&err);
    }
    let Some(session_id) = header_str(&headers, SESSION_HEADER) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id header").into_response();
    };
    let Ok(session) = state.sessions.get(session_id) else {
        return http_error(&GatewayError::session_unknown("unknown or closed session"));
    };

    let last_event_id: Option<u64> = header_str(&headers, LAST_EVENT_HEADER).and_then(|v| v.parse().ok());

    let replay = match session.events_since(last_event_id).await {
        Ok(events) => events,
        Err(err) => return stream_gap_response(err.into()),
    };

    let queue_cap = state.sessions.sse_queue_capacity();
    let stream = build_resume_stream(session, replay, queue_cap);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))).into_response()
}

/// A resume that fell outside the retained event window can't be served as
/// a normal reconnect: §7 requires this to surface as a single SSE error
/// event carrying `kind = STREAM_GAP`, after which the stream ends and the
/// client is expected to re-initialize rather than retry the resume.
fn stream_gap_response(err: GatewayError) -> Response {
    let data = serde_json::to_string(&serde_json::json!({ "error": { "kind": err.kind, "message": err.message } })).unwrap_or_default();
    let stream = async_stream::stream! {
        yield Ok::<_, std::convert::Infallible>(Event::default().event("error").data(data));
    };
    Sse::new(stream).into_response()
}

fn build_resume_stream(
    session: Arc<gateway_session::Session>,
    replay: Vec<gateway_core::rpc::RpcEvent>,
    queue_cap: usize,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        for event in replay {
            let data = serde_json::to_string(&event.payload).unwrap_or_default();
            yield Ok(Event::default().id(event.event_id.to_string()).data(data));
        }
        let mut rx = session.subscribe(queue_cap).await;
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event.payload).unwrap_or_default();
            yield Ok(Event::default().id(event.event_id.to_string()).data(data));
        }
    }
}

async fn delete_handler(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Some(err) = check_origin(&state, &headers).await {
        return http_error(&err);
    }
    let Some(session_id) = header_str(&headers, SESSION_HEADER) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id header").into_response();
    };

    state.sessions.close(session_id).await;
    state
        .audit
        .log(
            AuditEventKind::SessionClosed,
            Severity::Info,
            None,
            Some("session".into()),
            Some(session_id.to_string()),
            true,
            serde_json::json!({}),
        )
        .await
        .ok();

    StatusCode::NO_CONTENT.into_response()
}

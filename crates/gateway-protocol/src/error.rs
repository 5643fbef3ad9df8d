//! Response construction for the two error shapes the data plane ever
//! returns: a bare HTTP status with no JSON-RPC envelope for
//! failures that occur before a request is even parsed as JSON-RPC
//! (origin rejection, missing/invalid auth), and a JSON-RPC error
//! envelope carrying `error.data.kind` for everything that fails once
//! inside the JSON-RPC method dispatch.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use gateway_core::error::GatewayError;
use gateway_core::rpc::JsonRpcResponse;
use serde_json::Value;

/// A transport-level rejection: no JSON-RPC envelope, just a status code
/// and a short body. Used for origin denial and missing/invalid bearer
/// credentials.
pub fn http_error(err: &GatewayError) -> Response {
    let status = StatusCode::from_u16(err.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({ "error": { "kind": err.kind, "message": err.message } }))).into_response()
}

/// A JSON-RPC error response: always HTTP 200, the error
/// lives in the envelope's `error` field with `error.data.kind` set so
/// clients can branch on the structured kind rather than parsing
/// `message`.
pub fn jsonrpc_error(id: Option<Value>, err: &GatewayError) -> Response {
    let body = JsonRpcResponse::error(id, err.kind.jsonrpc_code(), err.message.clone(), Some(&err.kind.to_string()));
    (StatusCode::OK, Json(body)).into_response()
}

/// The standard JSON-RPC parse failure (`-32700`), for bodies that are
/// not even well-formed JSON-RPC requests.
pub fn parse_error() -> Response {
    let body = JsonRpcResponse::error(None, -32700, "parse error", None);
    (StatusCode::OK, Json(body)).into_response()
}

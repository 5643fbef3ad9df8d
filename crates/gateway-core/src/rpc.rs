//! JSON-RPC 2.0 envelope types shared between the Upstream Transport
//! Client and the Protocol Gateway, so both sides speak
//! the same wire shape without either depending on the other.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: Option<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response carrying `error.data.kind`.
    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>, kind: Option<&str>) -> Self {
        let data = kind.map(|k| serde_json::json!({ "kind": k }));
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcErrorBody {
                code,
                message: message.into(),
                data,
            }),
        }
    }
}

/// A single event in a session's SSE buffer, or one
/// re-emitted from an upstream's own SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEvent {
    pub event_id: u64,
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_carries_kind_in_data() {
        let resp = JsonRpcResponse::error(Some(Value::from(1)), -32000, "denied", Some("AUTHZ_DENIED"));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["error"]["data"]["kind"], "AUTHZ_DENIED");
    }
}

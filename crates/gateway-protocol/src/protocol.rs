//! The fixed, typed set of request variants the gateway's data plane
//! understands.
//! Parsing happens once, at the boundary; everything downstream matches
//! on `McpRequest`, not on `&str`.

use gateway_core::rpc::{JsonRpcRequest, PROTOCOL_VERSION};
use serde_json::Value;

pub enum McpRequest {
    Initialize {
        id: Option<Value>,
        protocol_version: Option<String>,
    },
    ToolsList {
        id: Option<Value>,
    },
    ToolsCall {
        id: Option<Value>,
        name: String,
        arguments: Value,
    },
    Unknown {
        id: Option<Value>,
        method: String,
    },
}

impl McpRequest {
    pub fn id(&self) -> Option<Value> {
        match self {
            McpRequest::Initialize { id, .. } => id.clone(),
            McpRequest::ToolsList { id } => id.clone(),
            McpRequest::ToolsCall { id, .. } => id.clone(),
            McpRequest::Unknown { id, .. } => id.clone(),
        }
    }

    pub fn from_raw(raw: &JsonRpcRequest) -> Self {
        match raw.method.as_str() {
            "initialize" => McpRequest::Initialize {
                id: raw.id.clone(),
                protocol_version: raw
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            },
            "tools/list" => McpRequest::ToolsList { id: raw.id.clone() },
            "tools/call" => {
                let name = raw
                    .params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let arguments = raw
                    .params
                    .as_ref()
                    .and_then(|p| p.get("arguments"))
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));
                McpRequest::ToolsCall { id: raw.id.clone(), name, arguments }
            }
            other => McpRequest::Unknown { id: raw.id.clone(), method: other.to_string() },
        }
    }
}

pub fn protocol_version_matches(candidate: &str) -> bool {
    candidate == PROTOCOL_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_initialize_with_protocol_version() {
        let raw = JsonRpcRequest::new(
            Some(Value::from(1)),
            "initialize",
            Some(serde_json::json!({ "protocolVersion": "2025-06-18" })),
        );
        match McpRequest::from_raw(&raw) {
            McpRequest::Initialize { protocol_version, .. } => {
                assert_eq!(protocol_version.as_deref(), Some("2025-06-18"));
            }
            _ => panic!("expected Initialize"),
        }
    }

    #[test]
    fn parses_tools_call_name_and_arguments() {
        let raw = JsonRpcRequest::new(
            Some(Value::from(2)),
            "tools/call",
            Some(serde_json::json!({ "name": "search", "arguments": { "q": "rust" } })),
        );
        match McpRequest::from_raw(&raw) {
            McpRequest::ToolsCall { name, arguments, .. } => {
                assert_eq!(name, "search");
                assert_eq!(arguments, serde_json::json!({ "q": "rust" }));
            }
            _ => panic!("expected ToolsCall"),
        }
    }

    #[test]
    fn unknown_method_falls_through() {
        let raw = JsonRpcRequest::new(Some(Value::from(3)), "resources/list", None);
        assert!(matches!(McpRequest::from_raw(&raw), McpRequest::Unknown { .. }));
    }
}

//! The single decision type that carries either a JSON-RPC result or an
//! error-kind plus detail, per the gateway's "no exceptions across subsystem
//! boundaries" design rule. Every crate owns its own local error enum;
//! this is the type those local errors convert *into* at the Protocol
//! Gateway boundary, never something raised from inside a subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application-level error discriminant surfaced to clients via
/// `error.data.kind` (JSON-RPC) or mapped to an HTTP status at the admin
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    OriginDenied,
    AuthRequired,
    TokenExpired,
    TokenInvalid,
    AuthzDenied,
    ProtocolVersionMismatch,
    SessionUnknown,
    StreamGap,
    BackpressureExceeded,
    UpstreamError,
    UpstreamSaturated,
    ToolUnknown,
    ToolAmbiguous,
    ConfigInvalid,
    Internal,
}

impl ErrorKind {
    /// The HTTP status this kind maps to when it terminates a request
    /// before any JSON-RPC envelope is produced (origin rejection, missing
    /// auth, or an admin-plane validation failure).
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::OriginDenied => 403,
            ErrorKind::AuthRequired | ErrorKind::TokenExpired | ErrorKind::TokenInvalid => 401,
            ErrorKind::ConfigInvalid => 400,
            _ => 200,
        }
    }

    /// The JSON-RPC error code this kind maps to, for kinds that surface
    /// through a JSON-RPC envelope rather than a bare HTTP status.
    pub fn jsonrpc_code(self) -> i64 {
        match self {
            ErrorKind::ProtocolVersionMismatch => -32600,
            ErrorKind::Internal => -32603,
            _ => -32000,
        }
    }

    /// Parses the `SCREAMING_SNAKE_CASE` wire form each subsystem's local
    /// error enum reports via its own `kind()` method. Subsystem crates
    /// use this to implement `From<LocalError> for GatewayError` without
    /// `gateway-core` depending back on them.
    pub fn from_wire(s: &str) -> ErrorKind {
        match s {
            "ORIGIN_DENIED" => ErrorKind::OriginDenied,
            "AUTH_REQUIRED" => ErrorKind::AuthRequired,
            "TOKEN_EXPIRED" => ErrorKind::TokenExpired,
            "TOKEN_INVALID" => ErrorKind::TokenInvalid,
            "AUTHZ_DENIED" => ErrorKind::AuthzDenied,
            "PROTOCOL_VERSION_MISMATCH" => ErrorKind::ProtocolVersionMismatch,
            "SESSION_UNKNOWN" => ErrorKind::SessionUnknown,
            "STREAM_GAP" => ErrorKind::StreamGap,
            "BACKPRESSURE_EXCEEDED" => ErrorKind::BackpressureExceeded,
            "UPSTREAM_ERROR" => ErrorKind::UpstreamError,
            "UPSTREAM_SATURATED" => ErrorKind::UpstreamSaturated,
            "TOOL_UNKNOWN" => ErrorKind::ToolUnknown,
            "TOOL_AMBIGUOUS" => ErrorKind::ToolAmbiguous,
            "CONFIG_INVALID" => ErrorKind::ConfigInvalid,
            _ => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| "UNKNOWN".to_string());
        write!(f, "{s}")
    }
}

/// A uniform gateway-level error: a kind plus a human-readable detail that
/// never leaks internals of the subsystem that produced it (upstream
/// response bodies, SQL text, stack traces).
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

macro_rules! ctor {
    ($name:ident, $kind:ident) => {
        pub fn $name(message: impl Into<String>) -> GatewayError {
            GatewayError::new(ErrorKind::$kind, message)
        }
    };
}

ctor!(origin_denied, OriginDenied);
ctor!(auth_required, AuthRequired);
ctor!(token_expired, TokenExpired);
ctor!(token_invalid, TokenInvalid);
ctor!(authz_denied, AuthzDenied);
ctor!(protocol_version_mismatch, ProtocolVersionMismatch);
ctor!(session_unknown, SessionUnknown);
ctor!(stream_gap, StreamGap);
ctor!(backpressure_exceeded, BackpressureExceeded);
ctor!(upstream_error, UpstreamError);
ctor!(upstream_saturated, UpstreamSaturated);
ctor!(tool_unknown, ToolUnknown);
ctor!(tool_ambiguous, ToolAmbiguous);
ctor!(config_invalid, ConfigInvalid);
ctor!(internal, Internal);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_screaming_snake_case() {
        let v = serde_json::to_value(ErrorKind::ToolAmbiguous).unwrap();
        assert_eq!(v, serde_json::json!("TOOL_AMBIGUOUS"));
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorKind::OriginDenied.http_status(), 403);
        assert_eq!(ErrorKind::AuthRequired.http_status(), 401);
        assert_eq!(ErrorKind::ToolAmbiguous.http_status(), 200);
    }
}

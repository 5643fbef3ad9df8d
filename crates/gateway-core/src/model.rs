//! Domain entities shared across gateway crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Coarse, role-level capability tag. Distinct from a fine-grained
/// (role, server, tool) [`Grant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    UserManage,
    RoleManage,
    ServerManage,
    ToolView,
    ToolExecute,
    ConfigView,
    ConfigEdit,
    AuditView,
    OauthManage,
    AdManage,
}

impl Permission {
    pub const ALL: [Permission; 10] = [
        Permission::UserManage,
        Permission::RoleManage,
        Permission::ServerManage,
        Permission::ToolView,
        Permission::ToolExecute,
        Permission::ConfigView,
        Permission::ConfigEdit,
        Permission::AuditView,
        Permission::OauthManage,
        Permission::AdManage,
    ];
}

/// Auth provider a [`User`] authenticated through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Local,
    Oauth(String),
    Ad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub provider: AuthProvider,
    /// Only set for `AuthProvider::Local`.
    pub password_hash: Option<String>,
    pub enabled: bool,
    pub role_ids: HashSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Invariant: `local` users must have a password hash, non-`local`
    /// users must not.
    pub fn provider_invariant_holds(&self) -> bool {
        match self.provider {
            AuthProvider::Local => self.password_hash.is_some(),
            _ => self.password_hash.is_none(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub role_id: String,
    pub server_id: String,
    pub tool_name: String,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub permissions: HashSet<Permission>,
    /// System roles (`admin`, `user`, `viewer`) cannot be deleted and their
    /// permission set cannot shrink.
    pub is_system: bool,
    pub grants: Vec<Grant>,
}

impl Role {
    pub fn has_grant(&self, server_id: &str, tool_name: &str) -> bool {
        self.grants
            .iter()
            .any(|g| g.server_id == server_id && g.tool_name == tool_name)
    }

    pub fn system_admin() -> Self {
        Role {
            id: "admin".into(),
            display_name: "Administrator".into(),
            description: "Full access to every coarse permission".into(),
            permissions: Permission::ALL.into_iter().collect(),
            is_system: true,
            grants: Vec::new(),
        }
    }

    pub fn system_user() -> Self {
        Role {
            id: "user".into(),
            display_name: "User".into(),
            description: "Default role granted on first sign-in".into(),
            permissions: [Permission::ToolView, Permission::ToolExecute]
                .into_iter()
                .collect(),
            is_system: true,
            grants: Vec::new(),
        }
    }

    pub fn system_viewer() -> Self {
        Role {
            id: "viewer".into(),
            display_name: "Viewer".into(),
            description: "Read-only access, no tool execution".into(),
            permissions: [Permission::ToolView].into_iter().collect(),
            is_system: true,
            grants: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub server_id: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    /// Derived view of role -> tool grants; empty means "no role-specific
    /// grant exists" (default-deny applies, see RBAC Engine §4.E).
    pub required_roles: HashSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamServer {
    pub id: String,
    pub base_endpoint_url: String,
    pub tools: Vec<Tool>,
    pub health: HealthStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Cached upstream-side MCP session id, established lazily on first
    /// outbound call.
    pub upstream_session_id: Option<String>,
}

impl UpstreamServer {
    pub fn new(id: impl Into<String>, base_endpoint_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_endpoint_url: base_endpoint_url.into(),
            tools: Vec::new(),
            health: HealthStatus::Unknown,
            last_health_check: None,
            consecutive_failures: 0,
            upstream_session_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginPolicy {
    pub allowlist: HashSet<String>,
    pub allow_https_any: bool,
    pub allow_ngrok: bool,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self {
            allowlist: HashSet::new(),
            allow_https_any: false,
            allow_ngrok: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    SessionInitialized,
    ToolsListed,
    AuthzPermissionGranted,
    AuthzPermissionDenied,
    SessionClosed,
    OriginRejected,
    AuthenticationFailed,
    ConfigChanged,
    UserBootstrapped,
    UpstreamRegistered,
    UpstreamUnregistered,
    UpstreamUnhealthy,
    AdminFirstRunBypass,
    JwtLegacyPathUsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub kind: AuditEventKind,
    pub severity: Severity,
    pub user_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub success: bool,
    pub details: serde_json::Value,
}

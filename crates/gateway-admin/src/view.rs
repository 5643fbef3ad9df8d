//! Wire-facing views of domain types that must never leak a sensitive
//! field — chiefly `User::password_hash` — into an admin-plane response
//! body.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use gateway_core::model::{Permission, Role, Tool, UpstreamServer, User};
use serde::Serialize;

#[derive(Serialize)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub provider: serde_json::Value,
    pub enabled: bool,
    pub role_ids: HashSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
            display_name: u.display_name.clone(),
            provider: serde_json::to_value(&u.provider).unwrap_or(serde_json::Value::Null),
            enabled: u.enabled,
            role_ids: u.role_ids.clone(),
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct PublicRole {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub permissions: HashSet<Permission>,
    pub is_system: bool,
    pub grants: Vec<serde_json::Value>,
}

impl From<&Role> for PublicRole {
    fn from(r: &Role) -> Self {
        Self {
            id: r.id.clone(),
            display_name: r.display_name.clone(),
            description: r.description.clone(),
            permissions: r.permissions.clone(),
            is_system: r.is_system,
            grants: r
                .grants
                .iter()
                .map(|g| serde_json::json!({ "server_id": g.server_id, "tool_name": g.tool_name, "granted_at": g.granted_at }))
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct PublicServer {
    pub id: String,
    pub base_endpoint_url: String,
    pub tool_count: usize,
    pub tools: Vec<Tool>,
    pub health: gateway_core::model::HealthStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl From<&UpstreamServer> for PublicServer {
    fn from(s: &UpstreamServer) -> Self {
        Self {
            id: s.id.clone(),
            base_endpoint_url: s.base_endpoint_url.clone(),
            tool_count: s.tools.len(),
            tools: s.tools.clone(),
            health: s.health,
            last_health_check: s.last_health_check,
            consecutive_failures: s.consecutive_failures,
        }
    }
}

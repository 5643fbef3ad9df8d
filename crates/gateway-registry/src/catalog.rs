//! Upstream Registry and Tool Discovery & Namespacing: registering and
//! unregistering upstream MCP servers, fetching and aggregating their
//! tool catalogs, and resolving a bare tool name to the single
//! (server_id, tool) pair it means for a given caller's visible set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gateway_audit::AuditLogger;
use gateway_core::model::{AuditEventKind, HealthStatus, Severity, Tool, UpstreamServer};
use gateway_core::rpc::JsonRpcRequest;
use gateway_transport::{TransportClient, UpstreamOutcome};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::RegistryError;
use crate::store::RegistryStore;

/// Tuning for the per-upstream health loop.
#[derive(Debug, Clone, Copy)]
pub struct HealthConfig {
    pub ping_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub unhealthy_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            unhealthy_threshold: 3,
        }
    }
}

pub struct Registry {
    store: Arc<RegistryStore>,
    transport: Arc<TransportClient>,
    audit: AuditLogger,
    health_config: HealthConfig,
    health_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Registry {
    pub fn new(store: Arc<RegistryStore>, transport: Arc<TransportClient>, audit: AuditLogger, health_config: HealthConfig) -> Self {
        Self {
            store,
            transport,
            audit,
            health_config,
            health_tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new upstream server by URL: validates
    /// the URL, performs the `initialize` handshake, fetches the tool
    /// catalog, persists the record, and starts the health loop.
    pub async fn register(&self, server_id: &str, base_endpoint_url: &str) -> Result<UpstreamServer, RegistryError> {
        validate_url(base_endpoint_url)?;

        let upstream_session_id = self.transport.initialize(server_id, base_endpoint_url).await?;
        let catalog = self
            .transport
            .list_tools(server_id, base_endpoint_url, upstream_session_id.as_deref())
            .await?;
        let tools = parse_tool_catalog(server_id, &catalog)?;

        let mut server = UpstreamServer::new(server_id, base_endpoint_url);
        server.tools = tools;
        server.health = HealthStatus::Healthy;
        server.last_health_check = Some(chrono::Utc::now());
        server.upstream_session_id = upstream_session_id;
        self.store.upsert(&server).await?;

        self.audit
            .log(
                AuditEventKind::UpstreamRegistered,
                Severity::Info,
                None,
                Some("upstream_server".into()),
                Some(server_id.to_string()),
                true,
                serde_json::json!({ "base_endpoint_url": base_endpoint_url, "tool_count": server.tools.len() }),
            )
            .await
            .ok();

        self.spawn_health_loop(server_id.to_string(), base_endpoint_url.to_string()).await;
        Ok(server)
    }

    /// Unregisters a server: the health loop
    /// is aborted immediately and the record drops out of the catalog, so
    /// no new call is ever routed to it; any call already in flight is
    /// still bounded by its own per-call timeout.
    pub async fn unregister(&self, server_id: &str) -> Result<(), RegistryError> {
        if let Some(handle) = self.health_tasks.lock().await.remove(server_id) {
            handle.abort();
        }
        self.store.remove(server_id).await?;

        self.audit
            .log(
                AuditEventKind::UpstreamUnregistered,
                Severity::Info,
                None,
                Some("upstream_server".into()),
                Some(server_id.to_string()),
                true,
                serde_json::json!({}),
            )
            .await
            .ok();
        Ok(())
    }

    /// Explicit admin refresh of a server's tool catalog.
    pub async fn refresh_tools(&self, server_id: &str) -> Result<(), RegistryError> {
        let snapshot = self.store.snapshot();
        let server = snapshot.servers.get(server_id).ok_or_else(|| RegistryError::NotFound(server_id.to_string()))?;
        let catalog = self
            .transport
            .list_tools(server_id, &server.base_endpoint_url, server.upstream_session_id.as_deref())
            .await?;
        let tools = parse_tool_catalog(server_id, &catalog)?;
        self.store.update_tools(server_id, &tools).await
    }

    /// Spawns (or re-spawns, on re-registration) the per-upstream health
    /// loop: 3-strikes-unhealthy with exponential backoff on failure,
    /// cancelled when the server is unregistered.
    async fn spawn_health_loop(&self, server_id: String, base_endpoint_url: String) {
        let store = self.store.clone();
        let transport = self.transport.clone();
        let audit = self.audit.clone();
        let config = self.health_config;

        let handle = tokio::spawn(async move {
            let mut backoff = config.initial_backoff;
            loop {
                tokio::time::sleep(config.ping_interval).await;

                let upstream_session_id = store.snapshot().servers.get(&server_id).and_then(|s| s.upstream_session_id.clone());
                match transport.ping(&server_id, &base_endpoint_url, upstream_session_id.as_deref()).await {
                    Ok(()) => {
                        backoff = config.initial_backoff;
                        let was_unhealthy = store
                            .snapshot()
                            .servers
                            .get(&server_id)
                            .map(|s| s.health != HealthStatus::Healthy)
                            .unwrap_or(false);
                        if store.update_health(&server_id, HealthStatus::Healthy, 0).await.is_err() {
                            break;
                        }
                        if was_unhealthy {
                            tracing::info!(server_id = %server_id, "upstream recovered");
                        }
                    }
                    Err(err) => {
                        let failures = store.snapshot().servers.get(&server_id).map(|s| s.consecutive_failures + 1).unwrap_or(1);
                        let health = if failures >= config.unhealthy_threshold { HealthStatus::Unhealthy } else { HealthStatus::Unknown };
                        if store.update_health(&server_id, health, failures).await.is_err() {
                            break;
                        }
                        if health == HealthStatus::Unhealthy {
                            tracing::warn!(server_id = %server_id, failures, error = %err, "upstream marked unhealthy");
                            audit
                                .log(
                                    AuditEventKind::UpstreamUnhealthy,
                                    Severity::Warn,
                                    None,
                                    Some("upstream_server".into()),
                                    Some(server_id.clone()),
                                    false,
                                    serde_json::json!({ "consecutive_failures": failures }),
                                )
                                .await
                                .ok();
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(config.max_backoff);
                        }
                    }
                }
            }
        });

        self.health_tasks.lock().await.insert(server_id, handle);
    }

    /// Forwards a `tools/call` to `server_id`:
    /// lazily establishes the upstream's own MCP session on first call and
    /// caches it on the server record, then dispatches the request through
    /// the transport client under that session. The caller (Protocol
    /// Gateway) has already resolved and authorized `(server_id,
    /// tool_name)` by this point; this method only routes.
    pub async fn call_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
        request_id: Option<serde_json::Value>,
    ) -> Result<UpstreamOutcome, RegistryError> {
        let server = self
            .store
            .snapshot()
            .servers
            .get(server_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(server_id.to_string()))?;

        let upstream_session_id = match server.upstream_session_id {
            Some(id) => Some(id),
            None => {
                let id = self.transport.initialize(server_id, &server.base_endpoint_url).await?;
                self.store.update_upstream_session(server_id, id.as_deref()).await?;
                id
            }
        };

        let request = JsonRpcRequest::new(
            request_id,
            "tools/call",
            Some(serde_json::json!({ "name": tool_name, "arguments": arguments })),
        );
        let (outcome, response_session_id) = self
            .transport
            .call(server_id, &server.base_endpoint_url, upstream_session_id.as_deref(), &request)
            .await?;
        if response_session_id != upstream_session_id {
            self.store.update_upstream_session(server_id, response_session_id.as_deref()).await?;
        }
        Ok(outcome)
    }

    /// The disjoint union of tools across every upstream that hasn't hit
    /// the 3-strikes unhealthy threshold. A single transient ping failure
    /// only moves a server to `Unknown`, not `Unhealthy`, so its tools
    /// stay in the catalog until three consecutive pings have failed.
    pub fn all_tools(&self) -> Vec<Tool> {
        self.store
            .snapshot()
            .servers
            .values()
            .filter(|s| s.health != HealthStatus::Unhealthy)
            .flat_map(|s| s.tools.clone())
            .collect()
    }

    pub fn server(&self, server_id: &str) -> Option<UpstreamServer> {
        self.store.snapshot().servers.get(server_id).cloned()
    }

    pub fn servers(&self) -> Vec<UpstreamServer> {
        self.store.snapshot().servers.values().cloned().collect()
    }
}

/// Validates an operator-supplied upstream endpoint URL. Deliberately minimal — `http(s)://<non-empty-host>[...]` —
/// rather than a full RFC 3986 parse, matching the scope of the sanitizer
/// `gateway-origin` applies to origin strings.
fn validate_url(url: &str) -> Result<(), RegistryError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| RegistryError::InvalidUrl("url must start with http:// or https://".into()))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() {
        return Err(RegistryError::InvalidUrl("url has no host".into()));
    }
    if !host.is_ascii() || host.chars().any(|c| c.is_control()) {
        return Err(RegistryError::InvalidUrl("url host contains invalid characters".into()));
    }
    Ok(())
}

fn parse_tool_catalog(server_id: &str, catalog: &serde_json::Value) -> Result<Vec<Tool>, RegistryError> {
    let tools = catalog
        .get("tools")
        .and_then(|v| v.as_array())
        .ok_or_else(|| RegistryError::NotFound(format!("upstream '{server_id}' returned no 'tools' array")))?;

    let mut out = Vec::with_capacity(tools.len());
    for raw in tools {
        let name = raw.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let description = raw.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let input_schema = raw.get("inputSchema").cloned().unwrap_or(serde_json::json!({}));
        out.push(Tool {
            server_id: server_id.to_string(),
            name,
            description,
            input_schema,
            required_roles: Default::default(),
        });
    }
    Ok(out)
}

/// Resolves a bare tool name against the caller's already-RBAC-filtered
/// visible tool set: exactly one match
/// routes; zero is `TOOL_UNKNOWN`; more than one is `TOOL_AMBIGUOUS`
/// because the name does not disambiguate which upstream the caller
/// meant.
pub fn resolve_unique(tool_name: &str, visible: &[Tool]) -> Result<(String, String), RegistryError> {
    let mut matches = visible.iter().filter(|t| t.name == tool_name);
    let Some(first) = matches.next() else {
        return Err(RegistryError::UnknownTool(tool_name.to_string()));
    };
    if matches.next().is_some() {
        return Err(RegistryError::Ambiguous(tool_name.to_string()));
    }
    Ok((first.server_id.clone(), first.name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(server_id: &str, name: &str) -> Tool {
        Tool {
            server_id: server_id.to_string(),
            name: name.to_string(),
            description: String::new(),
            input_schema: serde_json::json!({}),
            required_roles: Default::default(),
        }
    }

    #[test]
    fn resolves_single_match() {
        let tools = vec![tool("a", "search")];
        let (server_id, name) = resolve_unique("search", &tools).unwrap();
        assert_eq!(server_id, "a");
        assert_eq!(name, "search");
    }

    #[test]
    fn ambiguous_when_two_upstreams_both_grant_visible() {
        let tools = vec![tool("a", "search"), tool("b", "search")];
        let err = resolve_unique("search", &tools).unwrap_err();
        assert_eq!(err.kind(), "TOOL_AMBIGUOUS");
    }

    #[test]
    fn unambiguous_when_caller_only_sees_one() {
        let tools = vec![tool("a", "search")];
        let (server_id, _) = resolve_unique("search", &tools).unwrap();
        assert_eq!(server_id, "a");
    }

    #[test]
    fn unknown_tool_when_no_match() {
        let tools = vec![tool("a", "search")];
        let err = resolve_unique("missing", &tools).unwrap_err();
        assert_eq!(err.kind(), "TOOL_UNKNOWN");
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(validate_url("ftp://example.com").is_err());
    }

    #[test]
    fn parses_tool_catalog_from_list_tools_result() {
        let catalog = serde_json::json!({
            "tools": [
                { "name": "search", "description": "full text search", "inputSchema": { "type": "object" } }
            ]
        });
        let tools = parse_tool_catalog("srv-1", &catalog).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].server_id, "srv-1");
        assert_eq!(tools[0].name, "search");
    }
}

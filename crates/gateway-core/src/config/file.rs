//! Startup configuration: env-var precedence over a TOML/YAML file, each
//! sub-config following the base codebase's `default_xxx()` function plus
//! explicit `impl Default` idiom.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayConfigError {
    #[error("io error reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid toml config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid yaml config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_encryption_key_file() -> String {
    "gateway.key".to_string()
}

fn default_signing_key_file() -> String {
    "gateway-signing.key".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    pub allowed_origins: Vec<String>,
    pub allow_https_any: bool,
    pub allow_ngrok: bool,
    /// Permits the no-origin escape hatch restricted to localhost
    /// development. Operator-set, not
    /// inferred from the bind address: a gateway bound to 127.0.0.1 for
    /// network reasons is not necessarily a dev instance.
    pub dev_mode: bool,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allow_https_any: false,
            allow_ngrok: false,
            dev_mode: false,
        }
    }
}

fn default_legacy_hs256_enabled() -> bool {
    false
}

fn default_access_token_ttl_hours() -> i64 {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Legacy HS256 secret, accepted for verification only.
    /// Never used when issuing new tokens.
    pub legacy_hs256_secret: Option<String>,
    #[serde(default = "default_legacy_hs256_enabled")]
    pub legacy_hs256_enabled: bool,
    #[serde(default = "default_access_token_ttl_hours")]
    pub access_token_ttl_hours: i64,
    pub jwks_cache_ttl_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            legacy_hs256_secret: None,
            legacy_hs256_enabled: default_legacy_hs256_enabled(),
            access_token_ttl_hours: default_access_token_ttl_hours(),
            jwks_cache_ttl_secs: 300,
        }
    }
}

fn default_event_buffer_capacity() -> usize {
    256
}

fn default_sse_queue_capacity() -> usize {
    256
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_call_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(default = "default_event_buffer_capacity")]
    pub event_buffer_capacity: usize,
    #[serde(default = "default_sse_queue_capacity")]
    pub sse_queue_capacity: usize,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub unary_call_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_buffer_capacity: default_event_buffer_capacity(),
            sse_queue_capacity: default_sse_queue_capacity(),
            idle_timeout_secs: default_idle_timeout_secs(),
            unary_call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_retention_days() -> i64 {
    90
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Endpoints reachable while the user table is empty.
    pub first_run_bypass_paths: Vec<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            first_run_bypass_paths: vec![
                "/admin/oauth/providers".to_string(),
                "/admin/ad/config".to_string(),
                "/admin/ad/groups".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_encryption_key_file")]
    pub encryption_key_file: String,
    /// Where the encrypted RS256 signing keyring is persisted, itself
    /// encrypted under `encryption_key_file`.
    #[serde(default = "default_signing_key_file")]
    pub signing_key_file: String,
    pub database_path: String,
    pub origin: OriginConfig,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub audit: AuditConfig,
    pub admin: AdminConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            encryption_key_file: default_encryption_key_file(),
            signing_key_file: default_signing_key_file(),
            database_path: "gateway.sqlite".to_string(),
            origin: OriginConfig::default(),
            jwt: JwtConfig::default(),
            session: SessionConfig::default(),
            audit: AuditConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut config: GatewayConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            _ => toml::from_str(&raw)?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads from `path` if present, falling back to built-in defaults with
    /// env overrides applied — mirrors the base server's
    /// load-with-fallback-default bootstrap.
    pub fn load_with_fallback(path: impl AsRef<Path>) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "falling back to default gateway config");
                let mut config = GatewayConfig::default();
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Overlays environment variables onto whatever was loaded from the
    /// config file, env taking precedence.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.jwt.legacy_hs256_secret = Some(secret);
            self.jwt.legacy_hs256_enabled = true;
        }
        if let Ok(key_file) = std::env::var("ENCRYPTION_KEY_FILE") {
            self.encryption_key_file = key_file;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            for origin in origins.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !self.origin.allowed_origins.iter().any(|o| o == origin) {
                    self.origin.allowed_origins.push(origin.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 8080);
        assert!(!config.jwt.legacy_hs256_enabled);
        assert_eq!(config.audit.retention_days, 90);
    }

    #[test]
    fn env_var_overrides_take_precedence() {
        std::env::set_var("PORT", "9999");
        let mut config = GatewayConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.port, 9999);
        std::env::remove_var("PORT");
    }

    #[test]
    fn allowed_origins_merge_is_idempotent() {
        std::env::set_var("ALLOWED_ORIGINS", "a.example.com,b.example.com,a.example.com");
        let mut config = GatewayConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.origin.allowed_origins.len(), 2);
        std::env::remove_var("ALLOWED_ORIGINS");
    }
}

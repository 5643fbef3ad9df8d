//! Composition root: loads config, opens the single local SQLite store,
//! constructs every subsystem crate's handle, wires them into one
//! [`GatewayState`], merges the data-plane and admin-plane routers into
//! one `axum::Router`, and owns startup/shutdown.

mod bootstrap;
mod shutdown;

use std::path::Path;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Parser, Debug)]
#[command(name = "gateway-server", version, about = "MCP gateway: reverse proxy, RBAC, and session manager for upstream MCP servers")]
struct Cli {
    /// Path to the TOML/YAML config file (overrides GATEWAY_CONFIG).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var("GATEWAY_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".to_string());
    let config = gateway_core::config::GatewayConfig::load_with_fallback(&config_path);

    let state = bootstrap::build_state(&config).await?;

    let app: Router = Router::new()
        .merge(gateway_protocol::router())
        .merge(gateway_admin::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(%addr, "gateway-server listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_then_drain(state))
        .await?;

    Ok(())
}

/// Ensures the parent directory of a local file path exists, mirroring
/// the base server's bootstrap helper for its own SQLite path.
pub(crate) fn ensure_parent_dir(file_path: &str) -> std::io::Result<()> {
    let path = Path::new(file_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub(crate) fn sqlite_url(path: &str) -> String {
    if Path::new(path).is_absolute() {
        format!("sqlite:{path}?mode=rwc")
    } else {
        format!("sqlite://{path}?mode=rwc")
    }
}

pub(crate) const REAPER_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub(crate) const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

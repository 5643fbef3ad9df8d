//! Graceful shutdown: waits for
//! SIGINT/SIGTERM, then drains every open session's SSE writer by
//! closing it cleanly before `axum::serve` releases the listener.

use std::sync::Arc;

use gateway_protocol::GatewayState;
use tokio::signal;

pub async fn wait_then_drain(state: Arc<GatewayState>) {
    wait_for_signal().await;
    tracing::info!(active_sessions = state.sessions.active_count(), "shutting down, draining sessions");
    state.sessions.close_all().await;
}

async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

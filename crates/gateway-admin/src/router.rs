//! Composes every Admin Control Plane route group into one router over
//! the shared [`GatewayState`], mirroring the way `gateway-protocol`
//! exposes a single `router()` for the data plane.

use std::sync::Arc;

use axum::Router;
use gateway_protocol::GatewayState;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .merge(crate::auth::router())
        .merge(crate::users::router())
        .merge(crate::roles::router())
        .merge(crate::servers::router())
        .merge(crate::config::router())
        .merge(crate::audit::router())
}

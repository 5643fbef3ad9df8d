//! The auth endpoint group: local login, the OAuth
//! callback upsert, session introspection, logout, and the public JWKS
//! document. A flat `/auth/*` router merged at the composition root,
//! with the OAuth-provider-side exchange itself out of scope, delegating
//! to `gateway_identity::login`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use gateway_core::config::store::keys;
use gateway_core::model::{AuditEventKind, Severity};
use gateway_identity::login::{local_login, oauth_upsert};
use gateway_protocol::GatewayState;
use serde::Deserialize;

use crate::guard::authenticate;
use crate::view::PublicUser;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/auth/login/local", post(login_local))
        .route("/auth/login", post(login_oauth_initiate))
        .route("/auth/callback", get(oauth_callback))
        .route("/auth/user", get(whoami))
        .route("/auth/logout", post(logout))
        .route("/.well-known/jwks.json", get(jwks))
}

#[derive(Deserialize)]
struct LocalLoginRequest {
    email: String,
    password: String,
}

async fn login_local(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<LocalLoginRequest>) -> Response {
    if let Some(err) = gateway_protocol::check_origin(&state, &headers).await {
        return gateway_protocol::error::http_error(&err);
    }

    match local_login(&state.rbac, &state.tokens, &body.email, &body.password).await {
        Ok((token, user)) => (StatusCode::OK, Json(serde_json::json!({ "access_token": token, "user": PublicUser::from(&user) }))).into_response(),
        Err(err) => {
            state
                .audit
                .log(
                    AuditEventKind::AuthenticationFailed,
                    Severity::Warn,
                    None,
                    Some("user".into()),
                    Some(body.email.clone()),
                    false,
                    serde_json::json!({ "provider": "local" }),
                )
                .await
                .ok();
            gateway_protocol::error::http_error(&err.into())
        }
    }
}

#[derive(Deserialize)]
struct OauthInitiateQuery {
    provider_id: String,
}

/// `POST /auth/login?provider_id=…`: the OAuth-initiate half of the flow.
/// Looks up the provider an admin already registered via
/// `/admin/oauth/providers` and hands back its authorization URL for the
/// caller to redirect the user-agent to; the authorization-code exchange
/// and the provider's own consent screen are out of scope, handled by the
/// provider and surfaced back to us only at `/auth/callback`.
async fn login_oauth_initiate(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Query(q): Query<OauthInitiateQuery>) -> Response {
    if let Some(err) = gateway_protocol::check_origin(&state, &headers).await {
        return gateway_protocol::error::http_error(&err);
    }

    let providers = state.config.get(keys::OAUTH_PROVIDERS).unwrap_or_else(|| serde_json::json!({ "providers": [] }));
    let provider = providers
        .get("providers")
        .and_then(|v| v.as_array())
        .and_then(|providers| providers.iter().find(|p| p.get("id").and_then(|v| v.as_str()) == Some(q.provider_id.as_str())))
        .cloned();

    let Some(provider) = provider else {
        return gateway_protocol::error::http_error(&gateway_core::GatewayError::config_invalid(format!(
            "unknown oauth provider_id: {}",
            q.provider_id
        )));
    };

    let authorize_url = provider.get("authorize_url").and_then(|v| v.as_str()).unwrap_or_default();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "provider_id": q.provider_id, "authorize_url": authorize_url })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct OauthCallbackQuery {
    provider_id: String,
    email: String,
    display_name: String,
}

/// Upserts the user a provider already verified. The provider-side authorization code exchange that would
/// produce this verified profile is out of scope; this endpoint trusts
/// its caller the same way `gateway_identity::login::oauth_upsert` does.
async fn oauth_callback(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Query(q): Query<OauthCallbackQuery>) -> Response {
    if let Some(err) = gateway_protocol::check_origin(&state, &headers).await {
        return gateway_protocol::error::http_error(&err);
    }

    match oauth_upsert(&state.rbac, &state.tokens, &q.provider_id, &q.email, &q.display_name).await {
        Ok((token, user)) => (StatusCode::OK, Json(serde_json::json!({ "access_token": token, "user": PublicUser::from(&user) }))).into_response(),
        Err(err) => gateway_protocol::error::http_error(&err.into()),
    }
}

async fn whoami(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Some(err) = gateway_protocol::check_origin(&state, &headers).await {
        return gateway_protocol::error::http_error(&err);
    }
    match authenticate(&state, &headers).await {
        Ok(user) => Json(PublicUser::from(&user)).into_response(),
        Err(err) => gateway_protocol::error::http_error(&err),
    }
}

/// Stateless JWT logout: there is no server-side session to invalidate,
/// so this only audits the event for the caller that presented a valid
/// token. The client is expected to discard it.
async fn logout(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if let Some(err) = gateway_protocol::check_origin(&state, &headers).await {
        return gateway_protocol::error::http_error(&err);
    }
    if let Ok(user) = authenticate(&state, &headers).await {
        state
            .audit
            .log(AuditEventKind::SessionClosed, Severity::Info, Some(user.id), Some("auth_session".into()), None, true, serde_json::json!({}))
            .await
            .ok();
    }
    StatusCode::NO_CONTENT.into_response()
}

/// The public key set. Deliberately not
/// origin-gated: this is a public document other services fetch
/// cross-origin to verify tokens this gateway issued.
async fn jwks(State(state): State<Arc<GatewayState>>) -> Json<serde_json::Value> {
    Json(state.tokens.jwks_document())
}

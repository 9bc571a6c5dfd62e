//! Session endpoints: login, refresh, logout.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::app::dto::{LoginRequest, RefreshTokenRequest};
use crate::app::{errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
}

/// POST /auth/login - Exchange credentials for an access + refresh token pair
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    match services.auth.login(&body.identifier, &body.password) {
        Ok(tokens) => (StatusCode::OK, Json(tokens)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /auth/refresh - Mint a new access token (the refresh token is reused)
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RefreshTokenRequest>,
) -> axum::response::Response {
    match services.auth.refresh(&body.refresh_token) {
        Ok(grant) => (StatusCode::OK, Json(grant)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /auth/logout - Revoke one refresh token
///
/// Unknown or already revoked tokens still answer 204.
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RefreshTokenRequest>,
) -> axum::response::Response {
    match services.auth.logout(&body.refresh_token) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /auth/logout-all - Revoke every refresh token of the caller
pub async fn logout_all(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
) -> axum::response::Response {
    let principal = match authz::require_principal(principal) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match services.auth.logout_all(principal.user_id()) {
        Ok(revoked) => (StatusCode::OK, Json(serde_json::json!({ "revoked": revoked }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

//! Endpoints about the calling principal.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::dto::{self, ChangePasswordRequest, UserView};
use crate::app::{errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(whoami))
        .route("/permissions", get(my_permissions))
        .route("/password", post(change_password))
}

/// GET /me - The caller's account
pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
) -> axum::response::Response {
    let principal = match authz::require_principal(principal) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match services.accounts.get(principal.user_id()) {
        Ok(user) => (StatusCode::OK, Json(UserView::from(&user))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /me/permissions - The caller's effective permissions
pub async fn my_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
) -> axum::response::Response {
    let principal = match authz::require_principal(principal) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match services.authz.effective_permissions(principal.user_id()) {
        Ok(perms) => (StatusCode::OK, Json(dto::permissions_to_json(&perms))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /me/password - Change the caller's password and end their sessions
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Json(body): Json<ChangePasswordRequest>,
) -> axum::response::Response {
    let principal = match authz::require_principal(principal) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match services
        .auth
        .change_password(principal.user_id(), &body.current_password, &body.new_password)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

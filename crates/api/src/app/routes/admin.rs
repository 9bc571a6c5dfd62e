//! Admin routes for account management.
//!
//! Every handler requires an unconditional permission on the `users` entity.
//! Deleting or deactivating yourself or the protected account is refused by
//! the service layer.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use keystone_auth::PermissionAction;
use keystone_core::UserId;

use crate::app::dto::{CreateUserRequest, UpdateProfileRequest, UserView};
use crate::app::services::USERS_ENTITY;
use crate::app::{errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/users/:id/unlock", post(unlock_user))
        .route("/users/:id/deactivate", post(deactivate_user))
        .route("/users/:id/activate", post(activate_user))
        .route("/users/:id/logout-all", post(revoke_sessions))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve the principal and check `action` on users in one step.
fn authorize(
    services: &AppServices,
    principal: Option<Extension<PrincipalContext>>,
    action: PermissionAction,
) -> Result<PrincipalContext, axum::response::Response> {
    let principal = authz::require_principal(principal)?;
    authz::require_permission(services, &principal, USERS_ENTITY, action)?;
    Ok(principal)
}

fn parse_user_id(id: &str) -> Result<UserId, axum::response::Response> {
    UserId::from_str(id).map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /admin/users - Create a new user
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Json(body): Json<CreateUserRequest>,
) -> axum::response::Response {
    let principal = match authorize(&services, principal, PermissionAction::Create) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let user_id = match services.accounts.register(body.into(), Some(principal.user_id())) {
        Ok(id) => id,
        Err(e) => return errors::service_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": user_id.to_string() })),
    )
        .into_response()
}

/// GET /admin/users/:id - Get a specific user
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authorize(&services, principal, PermissionAction::Read) {
        return resp;
    }
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.accounts.get(user_id) {
        Ok(user) => (StatusCode::OK, Json(UserView::from(&user))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// PUT /admin/users/:id - Replace a user's contact fields
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateProfileRequest>,
) -> axum::response::Response {
    let principal = match authorize(&services, principal, PermissionAction::Update) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.accounts.update_profile(principal.user_id(), user_id, body.into()) {
        Ok(user) => (StatusCode::OK, Json(UserView::from(&user))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// DELETE /admin/users/:id - Soft-delete a user
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let principal = match authorize(&services, principal, PermissionAction::Delete) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.accounts.soft_delete(principal.user_id(), user_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /admin/users/:id/unlock - Clear a lockout
pub async fn unlock_user(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let principal = match authorize(&services, principal, PermissionAction::Update) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.accounts.unlock(principal.user_id(), user_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /admin/users/:id/deactivate - Disable a user and end their sessions
pub async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let principal = match authorize(&services, principal, PermissionAction::Update) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.accounts.deactivate(principal.user_id(), user_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /admin/users/:id/activate - Re-enable a deactivated user
pub async fn activate_user(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let principal = match authorize(&services, principal, PermissionAction::Update) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.accounts.activate(principal.user_id(), user_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /admin/users/:id/logout-all - Revoke every refresh token of a user
pub async fn revoke_sessions(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authorize(&services, principal, PermissionAction::Update) {
        return resp;
    }
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.auth.logout_all(user_id) {
        Ok(revoked) => (StatusCode::OK, Json(serde_json::json!({ "revoked": revoked }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

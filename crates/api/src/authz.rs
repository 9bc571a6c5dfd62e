//! API-side authorization guard.
//!
//! Handlers call these before touching a service, so anonymous callers are
//! refused here rather than by the authentication layer.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::Response;

use keystone_auth::{DenyConditional, PermissionAction};

use crate::app::{errors, services::AppServices};
use crate::context::PrincipalContext;

/// The request's principal, or a 401 for anonymous requests.
pub fn require_principal(principal: Option<Extension<PrincipalContext>>) -> Result<PrincipalContext, Response> {
    principal.map(|Extension(p)| p).ok_or_else(|| {
        errors::json_error(
            StatusCode::UNAUTHORIZED,
            "authentication_required",
            "a valid bearer token is required",
        )
    })
}

/// Require `entity`/`action` for the principal.
///
/// Conditional grants are not evaluated at this boundary, so only
/// unconditional permissions satisfy it.
pub fn require_permission(
    services: &AppServices,
    principal: &PrincipalContext,
    entity: &str,
    action: PermissionAction,
) -> Result<(), Response> {
    services
        .authz
        .authorize(principal.user_id(), entity, action, &DenyConditional)
        .map(|_| ())
        .map_err(errors::service_error_to_response)
}

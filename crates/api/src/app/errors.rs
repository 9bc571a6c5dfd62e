use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use keystone_auth::AuthError;
use keystone_core::DomainError;
use keystone_infra::{RepositoryError, ServiceError};

/// Map a service failure onto a JSON error response.
///
/// Authentication failures all render as the same `invalid_credentials`
/// body; the precise cause was already logged by the service.
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Auth(e) => auth_error_to_response(e),
        ServiceError::UserNotFound => json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
        ServiceError::Contention(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Repository(e) => match e {
            RepositoryError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
            RepositoryError::Duplicate(msg) => json_error(StatusCode::CONFLICT, "duplicate", msg),
            RepositoryError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
            RepositoryError::Unavailable(msg) => {
                tracing::error!(error = %msg, "store unavailable");
                json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "service unavailable")
            }
        },
        ServiceError::Hashing(e) => {
            tracing::error!(error = %e, "credential hashing failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    if err.is_authentication_failure() {
        return json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "invalid credentials");
    }

    match err {
        AuthError::TokenInvalid => json_error(StatusCode::UNAUTHORIZED, "invalid_token", "token is invalid"),
        AuthError::InvalidIdentity(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_identity", msg),
        AuthError::WeakCredential(msg) => json_error(StatusCode::BAD_REQUEST, "weak_credential", msg),
        AuthError::ProtectedUserViolation => json_error(
            StatusCode::FORBIDDEN,
            "protected_user",
            "operation not permitted on this user",
        ),
        e @ AuthError::Forbidden { .. } => json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
        AuthError::Domain(e) => match e {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
            }
            DomainError::InvariantViolation(msg) => {
                json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
            }
            DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        },
        AuthError::InvalidCredentials
        | AuthError::AccountLocked
        | AuthError::AccountDeactivated
        | AuthError::AccountDeleted => {
            json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "invalid credentials")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

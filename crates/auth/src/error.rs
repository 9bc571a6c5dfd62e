//! Error kinds of the security core.

use thiserror::Error;

use keystone_core::DomainError;

/// Security-core failure.
///
/// Every variant is a local condition the caller can recover from. The
/// precise causes are for internal logging; anything crossing the boundary to
/// an unauthenticated caller is first collapsed into
/// [`AuthError::InvalidCredentials`] (see [`AuthError::is_authentication_failure`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed username or email.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Password does not satisfy the password policy.
    #[error("weak credential: {0}")]
    WeakCredential(String),

    #[error("account is locked")]
    AccountLocked,

    #[error("account is deactivated")]
    AccountDeactivated,

    #[error("account is deleted")]
    AccountDeleted,

    /// An actor targeted a protected account with a restricted operation.
    #[error("operation not permitted on a protected user")]
    ProtectedUserViolation,

    /// Refresh or access token is expired, revoked or unknown.
    #[error("token is invalid")]
    TokenInvalid,

    /// The uniform signal returned for every failed authentication.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("forbidden: missing permission '{action}' on '{entity}'")]
    Forbidden { entity: String, action: String },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl AuthError {
    /// Causes that must never be distinguished to an unauthenticated caller.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::AccountLocked
                | AuthError::AccountDeactivated
                | AuthError::AccountDeleted
        )
    }

    /// Replace authentication-failure causes with the uniform signal.
    pub fn into_public(self) -> Self {
        if self.is_authentication_failure() {
            AuthError::InvalidCredentials
        } else {
            self
        }
    }
}

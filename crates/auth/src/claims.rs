use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use keystone_core::UserId;

use crate::principal::AuthenticatedPrincipal;

/// Access token claims (transport-agnostic).
///
/// Access tokens are short-lived and verified independently of refresh token
/// records. How they are encoded or signed is up to the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject.
    pub sub: UserId,

    pub username: String,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl AccessClaims {
    pub fn principal(&self) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal::new(self.sub, self.username.clone())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate the claim time window.
///
/// Decoding and signature checks happen in the issuer before this runs.
pub fn validate_claims(claims: &AccessClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Produces access tokens for an authenticated principal.
pub trait AccessTokenIssuer: Send + Sync {
    /// Returns the opaque token and the claims it carries.
    fn issue(&self, principal: &AuthenticatedPrincipal) -> (String, AccessClaims);

    /// Withdraw every outstanding access token of `user_id`; returns how many.
    ///
    /// Called when an account stops being able to authenticate (lock,
    /// deactivation, deletion) or its credentials change.
    fn revoke_user(&self, user_id: UserId) -> usize;
}

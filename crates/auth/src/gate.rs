//! Authentication gate contract.
//!
//! The gate turns an inbound `Authorization` header into a request identity.
//! It never rejects: a missing header, a non-bearer scheme, an invalid token
//! or a failed principal extraction all yield [`GateOutcome::Anonymous`], and
//! downstream authorization is what refuses anonymous callers. A verifier
//! that panics is contained the same way.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::AuthError;
use crate::principal::AuthenticatedPrincipal;

/// Verifies access tokens and extracts the identity they carry.
pub trait TokenVerifier: Send + Sync {
    /// Signature/expiry check only.
    fn validate(&self, token: &str) -> bool;

    fn extract_principal(&self, token: &str) -> Result<AuthenticatedPrincipal, AuthError>;
}

impl<V> TokenVerifier for std::sync::Arc<V>
where
    V: TokenVerifier + ?Sized,
{
    fn validate(&self, token: &str) -> bool {
        (**self).validate(token)
    }

    fn extract_principal(&self, token: &str) -> Result<AuthenticatedPrincipal, AuthError> {
        (**self).extract_principal(token)
    }
}

/// Why a request continued unauthenticated. Internal diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnonymousReason {
    MissingHeader,
    NotBearer,
    EmptyToken,
    InvalidToken,
    ExtractionFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Authenticated(AuthenticatedPrincipal),
    Anonymous(AnonymousReason),
}

impl GateOutcome {
    pub fn principal(&self) -> Option<&AuthenticatedPrincipal> {
        match self {
            GateOutcome::Authenticated(p) => Some(p),
            GateOutcome::Anonymous(_) => None,
        }
    }

    pub fn into_principal(self) -> Option<AuthenticatedPrincipal> {
        match self {
            GateOutcome::Authenticated(p) => Some(p),
            GateOutcome::Anonymous(_) => None,
        }
    }
}

/// Request-scoped filter resolving bearer tokens to principals.
#[derive(Debug, Clone)]
pub struct AuthenticationGate<V> {
    verifier: V,
}

impl<V> AuthenticationGate<V>
where
    V: TokenVerifier,
{
    pub fn new(verifier: V) -> Self {
        Self { verifier }
    }

    /// Resolve the identity behind an `Authorization` header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> GateOutcome {
        let Some(header) = authorization else {
            return GateOutcome::Anonymous(AnonymousReason::MissingHeader);
        };

        let Some(token) = header.strip_prefix("Bearer ") else {
            tracing::debug!("authorization header is not a bearer credential");
            return GateOutcome::Anonymous(AnonymousReason::NotBearer);
        };

        let token = token.trim();
        if token.is_empty() {
            return GateOutcome::Anonymous(AnonymousReason::EmptyToken);
        }

        match catch_unwind(AssertUnwindSafe(|| self.verifier.validate(token))) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("bearer token rejected by verifier");
                return GateOutcome::Anonymous(AnonymousReason::InvalidToken);
            }
            Err(_) => {
                tracing::error!("token verifier panicked during validation");
                return GateOutcome::Anonymous(AnonymousReason::InvalidToken);
            }
        }

        match catch_unwind(AssertUnwindSafe(|| self.verifier.extract_principal(token))) {
            Ok(Ok(principal)) => GateOutcome::Authenticated(principal),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "failed to extract principal from bearer token");
                GateOutcome::Anonymous(AnonymousReason::ExtractionFailed)
            }
            Err(_) => {
                tracing::error!("token verifier panicked during principal extraction");
                GateOutcome::Anonymous(AnonymousReason::ExtractionFailed)
            }
        }
    }
}

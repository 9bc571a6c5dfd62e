use std::sync::Arc;

use axum::{
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use keystone_auth::{AuthenticationGate, GateOutcome, TokenVerifier};

use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub gate: AuthenticationGate<Arc<dyn TokenVerifier>>,
}

impl AuthState {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            gate: AuthenticationGate::new(verifier),
        }
    }
}

/// Attach a [`PrincipalContext`] when the bearer token resolves.
///
/// Never rejects: requests without a usable token continue anonymously and
/// the handlers that need an identity refuse them.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let outcome = state.gate.authenticate(
        req.headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
    );

    match outcome {
        GateOutcome::Authenticated(principal) => {
            tracing::debug!(user_id = %principal.user_id, "request authenticated");
            req.extensions_mut().insert(PrincipalContext::from(principal));
        }
        GateOutcome::Anonymous(reason) => {
            tracing::trace!(?reason, "request continues anonymously");
        }
    }

    next.run(req).await
}

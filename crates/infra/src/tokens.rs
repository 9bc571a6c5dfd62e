//! Token adapters: refresh token string generation and an opaque access
//! token registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Duration;
use rand::RngCore;

use keystone_auth::{
    AccessClaims, AccessTokenIssuer, AuthError, AuthenticatedPrincipal, TokenGenerator, TokenVerifier,
    validate_claims,
};
use keystone_core::{Clock, UserId};

/// Random bytes from the thread-local CSPRNG, hex encoded.
#[derive(Debug, Clone, Copy)]
pub struct RandomTokenGenerator {
    bytes: usize,
}

impl RandomTokenGenerator {
    pub const DEFAULT_BYTES: usize = 32;

    pub fn new(bytes: usize) -> Self {
        Self { bytes }
    }
}

impl Default for RandomTokenGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BYTES)
    }
}

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self) -> String {
        let mut buf = vec![0u8; self.bytes];
        rand::rng().fill_bytes(&mut buf);
        buf.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Opaque access tokens backed by an in-process claims table.
///
/// Implements both halves of the access token contract, so one instance is
/// shared between the login use case and the authentication gate. Expired
/// entries are dropped when they are presented and swept every
/// [`Self::PURGE_EVERY`] issues, so the table stays bounded by the number of
/// tokens live within one TTL.
pub struct InMemoryAccessTokens {
    claims: RwLock<HashMap<String, AccessClaims>>,
    generator: Arc<dyn TokenGenerator>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    issued: AtomicUsize,
}

impl InMemoryAccessTokens {
    pub fn new(generator: Arc<dyn TokenGenerator>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            claims: RwLock::new(HashMap::new()),
            generator,
            clock,
            ttl,
            issued: AtomicUsize::new(0),
        }
    }

    pub const PURGE_EVERY: usize = 64;

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.claims.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, token: &str) -> Option<AccessClaims> {
        match self.claims.read() {
            Ok(claims) => claims.get(token).cloned(),
            Err(_) => {
                tracing::error!("access token table lock poisoned");
                None
            }
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let Ok(mut claims) = self.claims.write() else {
            return 0;
        };
        let before = claims.len();
        claims.retain(|_, c| validate_claims(c, now).is_ok());
        before - claims.len()
    }
}

impl AccessTokenIssuer for InMemoryAccessTokens {
    fn issue(&self, principal: &AuthenticatedPrincipal) -> (String, AccessClaims) {
        let issued_at = self.clock.now();
        let claims = AccessClaims {
            sub: principal.user_id,
            username: principal.username.clone(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };
        let token = self.generator.generate();

        match self.claims.write() {
            Ok(mut table) => {
                table.insert(token.clone(), claims.clone());
            }
            Err(_) => tracing::error!("access token table lock poisoned; token will not verify"),
        }

        if (self.issued.fetch_add(1, Ordering::Relaxed) + 1) % Self::PURGE_EVERY == 0 {
            let purged = self.purge_expired();
            tracing::debug!(purged, "swept expired access tokens");
        }

        (token, claims)
    }

    fn revoke_user(&self, user_id: UserId) -> usize {
        let Ok(mut claims) = self.claims.write() else {
            tracing::error!("access token table lock poisoned; tokens not revoked");
            return 0;
        };
        let before = claims.len();
        claims.retain(|_, c| c.sub != user_id);
        before - claims.len()
    }
}

impl TokenVerifier for InMemoryAccessTokens {
    fn validate(&self, token: &str) -> bool {
        let Some(claims) = self.lookup(token) else {
            return false;
        };
        match validate_claims(&claims, self.clock.now()) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(%reason, "access token rejected");
                if let Ok(mut table) = self.claims.write() {
                    table.remove(token);
                }
                false
            }
        }
    }

    fn extract_principal(&self, token: &str) -> Result<AuthenticatedPrincipal, AuthError> {
        self.lookup(token)
            .map(|claims| claims.principal())
            .ok_or(AuthError::TokenInvalid)
    }
}

//! Refresh token lifecycle.
//!
//! A refresh token is valid iff it is not revoked and `now < expires_at`.
//! Nothing extends or un-revokes a token; once invalid, a new one must be
//! issued. Tokens are not rotated on use.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};

use keystone_core::{Entity, RefreshTokenId, UserId};

/// Source of fresh opaque token strings.
///
/// Uniqueness is enforced by the token store, not by the generator.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// A bearer credential record owned (by id) by a user.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    id: RefreshTokenId,
    user_id: UserId,
    token: SecretString,
    expires_at: DateTime<Utc>,
    revoked: bool,
    created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Issue a token for `user_id` that expires `ttl_days` after `now`.
    pub fn issue(user_id: UserId, token: String, ttl_days: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: RefreshTokenId::new(),
            user_id,
            token: SecretString::new(token),
            expires_at: now
                .checked_add_signed(Duration::days(i64::from(ttl_days)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            revoked: false,
            created_at: now,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// One-way transition to revoked. Returns `true` if this call revoked it.
    pub fn revoke(&mut self) -> bool {
        let changed = !self.revoked;
        self.revoked = true;
        changed
    }

    /// Compare against a presented bearer string.
    pub fn matches(&self, presented: &str) -> bool {
        self.token.expose_secret() == presented
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for RefreshToken {
    type Id = RefreshTokenId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Revoke every live token owned by `user_id`; returns how many flipped.
///
/// Stores apply this to their whole token set inside one write so that no
/// concurrently issued token escapes.
pub fn revoke_all<'a>(tokens: impl IntoIterator<Item = &'a mut RefreshToken>, user_id: UserId) -> usize {
    tokens
        .into_iter()
        .filter(|t| t.user_id == user_id)
        .map(RefreshToken::revoke)
        .filter(|changed| *changed)
        .count()
}

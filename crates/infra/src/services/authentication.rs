//! Login, token refresh, logout and password change.
//!
//! Every failed authentication leaves this module as
//! [`AuthError::InvalidCredentials`]; the precise cause (unknown identity,
//! wrong password, locked, deactivated, deleted, unreadable stored hash) is
//! only logged.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use keystone_auth::{AuthError, AuthenticatedPrincipal, RefreshToken, User, validate_password};
use keystone_core::{AggregateRoot, UserId};

use crate::config::SecurityConfig;
use crate::repository::RepositoryError;

use super::{Collaborators, ServiceError, update_user};

/// Credentials handed out by a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginTokens {
    pub user_id: UserId,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// A fresh access token minted from a refresh token.
#[derive(Debug, Clone, Serialize)]
pub struct AccessGrant {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthenticationService {
    deps: Collaborators,
    config: SecurityConfig,
}

impl AuthenticationService {
    pub fn new(deps: Collaborators, config: SecurityConfig) -> Self {
        Self { deps, config }
    }

    /// Authenticate by username or email.
    ///
    /// A wrong password counts against the account and locks it on the fifth
    /// consecutive failure, revoking its refresh and access tokens.
    #[tracing::instrument(name = "auth.login", skip(self, password))]
    pub fn login(&self, identifier: &str, password: &SecretString) -> Result<LoginTokens, ServiceError> {
        self.try_login(identifier, password).map_err(|e| match e {
            ServiceError::Auth(cause) => ServiceError::Auth(cause.into_public()),
            ServiceError::UserNotFound => ServiceError::Auth(AuthError::InvalidCredentials),
            ServiceError::Hashing(e) => {
                tracing::error!(error = %e, "stored credential could not be verified");
                ServiceError::Auth(AuthError::InvalidCredentials)
            }
            other => other,
        })
    }

    fn try_login(&self, identifier: &str, password: &SecretString) -> Result<LoginTokens, ServiceError> {
        let Some(user) = self.find_account(identifier)? else {
            tracing::info!("login for unknown identity");
            return Err(AuthError::InvalidCredentials.into());
        };
        let user_id = *user.id();

        if let Err(cause) = user.ensure_can_authenticate() {
            tracing::warn!(user_id = %user_id, cause = %cause, "login refused");
            return Err(cause.into());
        }

        if !self.deps.hasher.verify(password.expose_secret(), user.password_hash())? {
            self.register_failure(user_id)?;
            return Err(AuthError::InvalidCredentials.into());
        }

        let now = self.deps.clock.now();
        let (user, ()) = update_user(
            self.deps.users.as_ref(),
            user_id,
            self.config.max_update_retries,
            |u| {
                u.ensure_can_authenticate()?;
                u.record_successful_login(now);
                Ok(())
            },
        )?;

        let refresh = self.issue_refresh_token(user_id)?;
        let (access_token, claims) = self.deps.access_tokens.issue(&principal_of(&user));

        tracing::info!(user_id = %user_id, "login succeeded");
        Ok(LoginTokens {
            user_id,
            access_token,
            access_expires_at: claims.expires_at,
            refresh_token: refresh.token().to_string(),
            refresh_expires_at: refresh.expires_at(),
        })
    }

    fn find_account(&self, identifier: &str) -> Result<Option<User>, ServiceError> {
        let identifier = identifier.trim();
        let user = if identifier.contains('@') {
            self.deps.users.find_by_email(identifier)?
        } else {
            self.deps.users.find_by_username(identifier)?
        };
        Ok(user)
    }

    fn register_failure(&self, user_id: UserId) -> Result<(), ServiceError> {
        let now = self.deps.clock.now();
        let (_, outcome) = update_user(
            self.deps.users.as_ref(),
            user_id,
            self.config.max_update_retries,
            |u| Ok(u.record_failed_login(now)),
        )?;

        if outcome.locked_now {
            let revoked = self.deps.refresh_tokens.revoke_all_by_user_id(user_id)?;
            let withdrawn = self.deps.access_tokens.revoke_user(user_id);
            tracing::warn!(
                user_id = %user_id,
                attempts = outcome.attempts,
                revoked,
                withdrawn,
                "account locked after repeated failed logins"
            );
        } else {
            tracing::info!(user_id = %user_id, attempts = outcome.attempts, "failed login");
        }
        Ok(())
    }

    /// Persist a new refresh token, regenerating on the rare string collision.
    fn issue_refresh_token(&self, user_id: UserId) -> Result<RefreshToken, ServiceError> {
        let now = self.deps.clock.now();
        let mut attempt = 0;
        loop {
            let token = RefreshToken::issue(
                user_id,
                self.deps.token_generator.generate(),
                self.config.refresh_token_ttl_days,
                now,
            );
            match self.deps.refresh_tokens.insert(token.clone()) {
                Ok(()) => return Ok(token),
                Err(RepositoryError::Duplicate(_)) if attempt < self.config.max_update_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, "refresh token collision; regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Mint an access token from a valid refresh token. The refresh token is
    /// not rotated.
    #[tracing::instrument(name = "auth.refresh", skip_all)]
    pub fn refresh(&self, refresh_token: &str) -> Result<AccessGrant, ServiceError> {
        let now = self.deps.clock.now();

        let record = self
            .deps
            .refresh_tokens
            .find_by_token(refresh_token)?
            .filter(|t| t.is_valid(now))
            .ok_or(AuthError::TokenInvalid)?;

        let user = self
            .deps
            .users
            .find_by_id(record.user_id())?
            .ok_or(AuthError::TokenInvalid)?;

        if let Err(cause) = user.ensure_can_authenticate() {
            tracing::warn!(user_id = %user.id(), cause = %cause, "refresh refused");
            return Err(AuthError::TokenInvalid.into());
        }

        let (access_token, claims) = self.deps.access_tokens.issue(&principal_of(&user));
        Ok(AccessGrant {
            access_token,
            expires_at: claims.expires_at,
        })
    }

    /// Revoke one refresh token. Returns `false` if it was unknown or
    /// already revoked.
    #[tracing::instrument(name = "auth.logout", skip_all)]
    pub fn logout(&self, refresh_token: &str) -> Result<bool, ServiceError> {
        Ok(self.deps.refresh_tokens.revoke(refresh_token)?)
    }

    /// Revoke every refresh token of `user_id` and withdraw its access
    /// tokens. Returns the number of refresh tokens revoked.
    #[tracing::instrument(name = "auth.logout_all", skip(self))]
    pub fn logout_all(&self, user_id: UserId) -> Result<usize, ServiceError> {
        let revoked = self.deps.refresh_tokens.revoke_all_by_user_id(user_id)?;
        let withdrawn = self.deps.access_tokens.revoke_user(user_id);
        tracing::info!(revoked, withdrawn, "all sessions revoked");
        Ok(revoked)
    }

    /// Replace the password after re-checking the current one. Existing
    /// sessions are revoked.
    #[tracing::instrument(name = "auth.change_password", skip(self, current, new))]
    pub fn change_password(
        &self,
        user_id: UserId,
        current: &SecretString,
        new: &SecretString,
    ) -> Result<(), ServiceError> {
        validate_password(new.expose_secret().as_str())?;

        let user = self.deps.users.find_by_id(user_id)?.ok_or(ServiceError::UserNotFound)?;
        if !self.deps.hasher.verify(current.expose_secret(), user.password_hash())? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let hash = self.deps.hasher.hash(new.expose_secret())?;
        let now = self.deps.clock.now();
        update_user(
            self.deps.users.as_ref(),
            user_id,
            self.config.max_update_retries,
            |u| {
                u.update_password_hash(hash.clone(), now, Some(user_id));
                Ok(())
            },
        )?;

        let revoked = self.deps.refresh_tokens.revoke_all_by_user_id(user_id)?;
        let withdrawn = self.deps.access_tokens.revoke_user(user_id);
        tracing::info!(revoked, withdrawn, "password changed");
        Ok(())
    }
}

fn principal_of(user: &User) -> AuthenticatedPrincipal {
    AuthenticatedPrincipal::new(*user.id(), user.username().as_str())
}

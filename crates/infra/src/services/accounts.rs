//! Administrative account management.
//!
//! Deactivation and soft deletion are refused when the target is the acting
//! user or the configured protected account; both revoke the target's
//! refresh tokens and withdraw its access tokens.

use secrecy::{ExposeSecret, SecretString};

use keystone_auth::{
    AuthError, EmailAddress, IdentityDocument, NewUser, ProfileUpdate, User, Username,
    ensure_not_protected_user, validate_password,
};
use keystone_core::{AggregateRoot, DomainError, UserId};

use crate::config::SecurityConfig;

use super::{Collaborators, ServiceError, update_user};

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: SecretString,
    pub first_name: String,
    pub last_name: String,
    pub document: Option<IdentityDocument>,
}

/// Input for replacing the contact fields of an account.
#[derive(Debug, Clone)]
pub struct ProfileChange {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub document: Option<IdentityDocument>,
}

pub struct AccountAdminService {
    deps: Collaborators,
    config: SecurityConfig,
}

impl AccountAdminService {
    pub fn new(deps: Collaborators, config: SecurityConfig) -> Self {
        Self { deps, config }
    }

    /// Create an active account after running the credential policy.
    #[tracing::instrument(name = "accounts.register", skip(self, input), fields(username = %input.username))]
    pub fn register(&self, input: Registration, actor: Option<UserId>) -> Result<UserId, ServiceError> {
        let username = Username::parse(input.username)?;
        let email = EmailAddress::parse(&input.email)?;
        validate_password(input.password.expose_secret().as_str())?;
        require_name("first name", &input.first_name)?;
        require_name("last name", &input.last_name)?;

        let password_hash = self.deps.hasher.hash(input.password.expose_secret())?;
        let id = UserId::new();
        let user = User::create(
            id,
            NewUser {
                username,
                email,
                password_hash,
                first_name: input.first_name,
                last_name: input.last_name,
                document: input.document,
                created_by: actor,
            },
            self.deps.clock.now(),
        );

        self.deps.users.insert(user)?;
        tracing::info!(user_id = %id, "account registered");
        Ok(id)
    }

    pub fn get(&self, user_id: UserId) -> Result<User, ServiceError> {
        self.deps.users.find_by_id(user_id)?.ok_or(ServiceError::UserNotFound)
    }

    /// Clear a lockout and re-enable the account.
    #[tracing::instrument(name = "accounts.unlock", skip(self))]
    pub fn unlock(&self, actor: UserId, target: UserId) -> Result<(), ServiceError> {
        let now = self.deps.clock.now();
        update_user(self.deps.users.as_ref(), target, self.config.max_update_retries, |u| {
            u.unlock(now, Some(actor));
            Ok(())
        })?;
        tracing::info!("account unlocked");
        Ok(())
    }

    #[tracing::instrument(name = "accounts.deactivate", skip(self))]
    pub fn deactivate(&self, actor: UserId, target: UserId) -> Result<(), ServiceError> {
        self.ensure_may_target(actor, target)?;

        let now = self.deps.clock.now();
        update_user(self.deps.users.as_ref(), target, self.config.max_update_retries, |u| {
            u.deactivate(now, Some(actor));
            Ok(())
        })?;

        let revoked = self.deps.refresh_tokens.revoke_all_by_user_id(target)?;
        let withdrawn = self.deps.access_tokens.revoke_user(target);
        tracing::info!(revoked, withdrawn, "account deactivated");
        Ok(())
    }

    /// Re-enable a deactivated account. Locked accounts need [`Self::unlock`].
    #[tracing::instrument(name = "accounts.activate", skip(self))]
    pub fn activate(&self, actor: UserId, target: UserId) -> Result<(), ServiceError> {
        let now = self.deps.clock.now();
        update_user(self.deps.users.as_ref(), target, self.config.max_update_retries, |u| {
            u.activate(now, Some(actor))
        })?;
        Ok(())
    }

    /// Logically delete an account. Deleting an already deleted account
    /// succeeds without change.
    #[tracing::instrument(name = "accounts.soft_delete", skip(self))]
    pub fn soft_delete(&self, actor: UserId, target: UserId) -> Result<(), ServiceError> {
        self.ensure_may_target(actor, target)?;

        match self.deps.users.find_by_id_including_deleted(target)? {
            None => return Err(ServiceError::UserNotFound),
            Some(user) if user.is_deleted() => return Ok(()),
            Some(_) => {}
        }

        let now = self.deps.clock.now();
        update_user(self.deps.users.as_ref(), target, self.config.max_update_retries, |u| {
            u.soft_delete(now, Some(actor));
            Ok(())
        })?;

        let revoked = self.deps.refresh_tokens.revoke_all_by_user_id(target)?;
        let withdrawn = self.deps.access_tokens.revoke_user(target);
        tracing::info!(revoked, withdrawn, "account deleted");
        Ok(())
    }

    #[tracing::instrument(name = "accounts.update_profile", skip(self, change))]
    pub fn update_profile(&self, actor: UserId, target: UserId, change: ProfileChange) -> Result<User, ServiceError> {
        let email = EmailAddress::parse(&change.email)?;
        require_name("first name", &change.first_name)?;
        require_name("last name", &change.last_name)?;

        let now = self.deps.clock.now();
        let (user, ()) = update_user(self.deps.users.as_ref(), target, self.config.max_update_retries, |u| {
            u.update_profile(
                ProfileUpdate {
                    email: email.clone(),
                    first_name: change.first_name.clone(),
                    last_name: change.last_name.clone(),
                    document: change.document.clone(),
                },
                now,
                Some(actor),
            );
            Ok(())
        })?;
        tracing::debug!(version = user.version(), "profile updated");
        Ok(user)
    }

    fn ensure_may_target(&self, actor: UserId, target: UserId) -> Result<(), AuthError> {
        ensure_not_protected_user(target, Some(actor))?;
        ensure_not_protected_user(target, self.config.protected_user_id)
    }
}

fn require_name(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

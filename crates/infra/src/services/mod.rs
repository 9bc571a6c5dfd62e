//! Account security use cases.
//!
//! Each service composes the security core with its storage and hashing
//! collaborators. Account mutations follow one pipeline:
//!
//! ```text
//! load user (non-deleted)
//!   ↓
//! apply domain transition in memory (bumps version)
//!   ↓
//! save with ExpectedVersion::Exact(loaded)
//!   ↓ Conflict?
//! reload and reapply, up to `max_update_retries` times
//! ```
//!
//! so two concurrent failed logins never collapse into one increment.
//!
//! This module contains no IO itself; it composes the repository traits.

pub mod accounts;
pub mod authentication;
pub mod authorization;

use std::sync::Arc;

use thiserror::Error;

use keystone_auth::{AccessTokenIssuer, AuthError, CredentialHasher, HashingError, TokenGenerator, User};
use keystone_core::{AggregateRoot, Clock, DomainError, ExpectedVersion, UserId};

use crate::repository::{RbacRepository, RefreshTokenRepository, RepositoryError, UserRepository};

pub use accounts::{AccountAdminService, ProfileChange, Registration};
pub use authentication::{AccessGrant, AuthenticationService, LoginTokens};
pub use authorization::AuthorizationService;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("user not found")]
    UserNotFound,

    /// Lost the optimistic concurrency race more often than allowed.
    #[error("concurrent update retries exhausted: {0}")]
    Contention(String),

    #[error(transparent)]
    Repository(RepositoryError),

    #[error(transparent)]
    Hashing(#[from] HashingError),
}

impl From<RepositoryError> for ServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(msg) => ServiceError::Contention(msg),
            other => ServiceError::Repository(other),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        ServiceError::Auth(AuthError::Domain(value))
    }
}

impl ServiceError {
    pub fn as_auth(&self) -> Option<&AuthError> {
        match self {
            ServiceError::Auth(e) => Some(e),
            _ => None,
        }
    }
}

/// The collaborators shared by every use case.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub rbac: Arc<dyn RbacRepository>,
    pub hasher: Arc<dyn CredentialHasher>,
    pub token_generator: Arc<dyn TokenGenerator>,
    pub access_tokens: Arc<dyn AccessTokenIssuer>,
    pub clock: Arc<dyn Clock>,
}

/// Load `user_id`, apply `mutate`, and save under an exact-version guard.
///
/// `mutate` may run more than once; it must derive everything from the user
/// it is handed. Returns the saved user and the closure's output.
pub(crate) fn update_user<T, F>(
    users: &dyn UserRepository,
    user_id: UserId,
    max_retries: u32,
    mut mutate: F,
) -> Result<(User, T), ServiceError>
where
    F: FnMut(&mut User) -> Result<T, AuthError>,
{
    let mut attempt = 0;
    loop {
        let mut user = users.find_by_id(user_id)?.ok_or(ServiceError::UserNotFound)?;
        let loaded = user.version();
        let output = mutate(&mut user)?;

        match users.save(user.clone(), ExpectedVersion::Exact(loaded)) {
            Ok(()) => return Ok((user, output)),
            Err(RepositoryError::Conflict(msg)) if attempt < max_retries => {
                attempt += 1;
                tracing::debug!(user_id = %user_id, attempt, conflict = %msg, "retrying account update");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

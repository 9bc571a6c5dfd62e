//! Persistence collaborators.
//!
//! Each use case performs its read-modify-write through these traits and
//! relies on them for atomicity:
//! - `UserRepository::save` is guarded by an [`ExpectedVersion`], so a writer
//!   holding a stale account fails with [`RepositoryError::Conflict`] instead
//!   of overwriting a concurrent failed-login count.
//! - `RefreshTokenRepository::revoke_all_by_user_id` is one set-based update.

pub mod in_memory;

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use keystone_auth::{Permission, RefreshToken, Role, User};
use keystone_core::{ExpectedVersion, PermissionId, RoleId, UserId};

pub use in_memory::{InMemoryRbacRepository, InMemoryRefreshTokenRepository, InMemoryUserRepository};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// A uniqueness constraint would be violated.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Optimistic concurrency failure; the caller may reload and retry.
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Account storage. Lookups without `including_deleted` never return
/// soft-deleted accounts.
pub trait UserRepository: Send + Sync {
    fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    fn find_by_id_including_deleted(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Username and email must be unique among non-deleted accounts.
    fn insert(&self, user: User) -> Result<(), RepositoryError>;

    /// Replace the stored account if it is still at `expected`.
    fn save(&self, user: User, expected: ExpectedVersion) -> Result<(), RepositoryError>;
}

pub trait RefreshTokenRepository: Send + Sync {
    /// Token strings are unique.
    fn insert(&self, token: RefreshToken) -> Result<(), RepositoryError>;

    fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, RepositoryError>;

    fn find_by_user_id(&self, user_id: UserId) -> Result<Vec<RefreshToken>, RepositoryError>;

    /// Returns `false` for unknown or already revoked tokens.
    fn revoke(&self, token: &str) -> Result<bool, RepositoryError>;

    /// Revoke every live token of `user_id` atomically; returns the count.
    fn revoke_all_by_user_id(&self, user_id: UserId) -> Result<usize, RepositoryError>;
}

/// Role and permission lookups used by permission resolution.
pub trait RbacRepository: Send + Sync {
    fn roles_for_user(&self, user_id: UserId) -> Result<Vec<Role>, RepositoryError>;

    fn find_role(&self, id: RoleId) -> Result<Option<Role>, RepositoryError>;

    /// Missing ids are silently absent from the result.
    fn find_permissions(&self, ids: &BTreeSet<PermissionId>) -> Result<Vec<Permission>, RepositoryError>;
}

impl<S> UserRepository for Arc<S>
where
    S: UserRepository + ?Sized,
{
    fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        (**self).find_by_id(id)
    }

    fn find_by_id_including_deleted(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        (**self).find_by_id_including_deleted(id)
    }

    fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        (**self).find_by_username(username)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        (**self).find_by_email(email)
    }

    fn insert(&self, user: User) -> Result<(), RepositoryError> {
        (**self).insert(user)
    }

    fn save(&self, user: User, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        (**self).save(user, expected)
    }
}

impl<S> RefreshTokenRepository for Arc<S>
where
    S: RefreshTokenRepository + ?Sized,
{
    fn insert(&self, token: RefreshToken) -> Result<(), RepositoryError> {
        (**self).insert(token)
    }

    fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        (**self).find_by_token(token)
    }

    fn find_by_user_id(&self, user_id: UserId) -> Result<Vec<RefreshToken>, RepositoryError> {
        (**self).find_by_user_id(user_id)
    }

    fn revoke(&self, token: &str) -> Result<bool, RepositoryError> {
        (**self).revoke(token)
    }

    fn revoke_all_by_user_id(&self, user_id: UserId) -> Result<usize, RepositoryError> {
        (**self).revoke_all_by_user_id(user_id)
    }
}

impl<S> RbacRepository for Arc<S>
where
    S: RbacRepository + ?Sized,
{
    fn roles_for_user(&self, user_id: UserId) -> Result<Vec<Role>, RepositoryError> {
        (**self).roles_for_user(user_id)
    }

    fn find_role(&self, id: RoleId) -> Result<Option<Role>, RepositoryError> {
        (**self).find_role(id)
    }

    fn find_permissions(&self, ids: &BTreeSet<PermissionId>) -> Result<Vec<Permission>, RepositoryError> {
        (**self).find_permissions(ids)
    }
}

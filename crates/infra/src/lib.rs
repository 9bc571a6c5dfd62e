//! Infrastructure layer: storage adapters, hashing, token adapters, config
//! and the account security use cases that compose them.

pub mod config;
pub mod credentials;
pub mod repository;
pub mod services;
pub mod tokens;

pub use config::{ConfigError, SecurityConfig};
pub use credentials::Argon2CredentialHasher;
pub use repository::{
    InMemoryRbacRepository, InMemoryRefreshTokenRepository, InMemoryUserRepository, RbacRepository,
    RefreshTokenRepository, RepositoryError, UserRepository,
};
pub use services::{
    AccessGrant, AccountAdminService, AuthenticationService, AuthorizationService, Collaborators, LoginTokens,
    ProfileChange, Registration, ServiceError,
};
pub use tokens::{InMemoryAccessTokens, RandomTokenGenerator};

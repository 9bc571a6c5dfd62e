//! `keystone-auth`: account security and authorization core.
//!
//! Credential policy, the account state machine, the refresh token lifecycle,
//! RBAC resolution and the authentication gate contract. Decoupled from HTTP
//! and storage: every collaborator that does IO is a trait implemented
//! elsewhere.

pub mod authorize;
pub mod claims;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod permissions;
pub mod principal;
pub mod refresh_token;
pub mod roles;
pub mod user;

pub use authorize::{AccessDecision, EffectivePermissions, GrantKey, authorize, resolve_effective_permissions};
pub use claims::{AccessClaims, AccessTokenIssuer, TokenValidationError, validate_claims};
pub use credentials::{
    CredentialHasher, EmailAddress, HashingError, PasswordHash, Username, validate_email,
    validate_password, validate_username,
};
pub use error::AuthError;
pub use gate::{AnonymousReason, AuthenticationGate, GateOutcome, TokenVerifier};
pub use permissions::{ConditionEvaluator, DenyConditional, Permission, PermissionAction, PolicyCondition};
pub use principal::AuthenticatedPrincipal;
pub use refresh_token::{RefreshToken, TokenGenerator, revoke_all};
pub use roles::Role;
pub use user::{
    AccountState, AuditTrail, FailedLogin, IdentityDocument, MAX_FAILED_ATTEMPTS, NewUser,
    ProfileUpdate, User, UserRecord, ensure_not_protected_user,
};

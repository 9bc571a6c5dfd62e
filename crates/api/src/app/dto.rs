use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use keystone_auth::{AccountState, EffectivePermissions, IdentityDocument, Permission, User};
use keystone_core::{AggregateRoot, Entity};
use keystone_infra::{ProfileChange, Registration};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email address.
    pub identifier: String,
    pub password: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: SecretString,
    pub new_password: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: SecretString,
    pub first_name: String,
    pub last_name: String,
    pub document: Option<IdentityDocument>,
}

impl From<CreateUserRequest> for Registration {
    fn from(value: CreateUserRequest) -> Self {
        Registration {
            username: value.username,
            email: value.email,
            password: value.password,
            first_name: value.first_name,
            last_name: value.last_name,
            document: value.document,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub document: Option<IdentityDocument>,
}

impl From<UpdateProfileRequest> for ProfileChange {
    fn from(value: UpdateProfileRequest) -> Self {
        ProfileChange {
            email: value.email,
            first_name: value.first_name,
            last_name: value.last_name,
            document: value.document,
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub document: Option<IdentityDocument>,
    pub state: AccountState,
    pub failed_attempts: u32,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id().to_string(),
            username: user.username().to_string(),
            email: user.email().to_string(),
            first_name: user.first_name().to_string(),
            last_name: user.last_name().to_string(),
            document: user.document().cloned(),
            state: user.state(),
            failed_attempts: user.failed_attempts(),
            locked_at: user.locked_at(),
            last_login: user.last_login(),
            created_at: user.audit().created_at,
            updated_at: user.audit().updated_at,
            version: user.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionView {
    pub id: String,
    pub entity: String,
    pub action: String,
    pub condition: Option<String>,
}

impl From<&Permission> for PermissionView {
    fn from(p: &Permission) -> Self {
        Self {
            id: p.id().to_string(),
            entity: p.entity().to_string(),
            action: p.action().to_string(),
            condition: p.condition().map(|c| c.as_str().to_string()),
        }
    }
}

pub fn permissions_to_json(permissions: &EffectivePermissions) -> serde_json::Value {
    let items: Vec<PermissionView> = permissions.iter().map(PermissionView::from).collect();
    serde_json::json!({
        "user_id": permissions.user_id().to_string(),
        "permissions": items,
    })
}

use keystone_auth::AuthenticatedPrincipal;
use keystone_core::UserId;

/// Principal context for a request (authenticated identity).
///
/// Only present when the authentication gate resolved a valid bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    username: String,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl From<AuthenticatedPrincipal> for PrincipalContext {
    fn from(value: AuthenticatedPrincipal) -> Self {
        Self::new(value.user_id, value.username)
    }
}

use serde::{Deserialize, Serialize};

use keystone_core::UserId;

/// Identity of an authenticated caller, as extracted from a verified token.
///
/// Carries no permissions: authorization resolves those separately from the
/// user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    pub user_id: UserId,
    pub username: String,
}

impl AuthenticatedPrincipal {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

impl core::fmt::Display for AuthenticatedPrincipal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.username, self.user_id)
    }
}

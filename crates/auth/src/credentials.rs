//! Credential policy: shape rules for usernames, emails and passwords.
//!
//! Pure functions, no IO. They run before any account mutation that sets or
//! checks identity/credential fields, and know nothing about persistence.

use std::sync::LazyLock;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use keystone_core::ValueObject;

use crate::AuthError;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 8;

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("username pattern compiles"));

// Exactly one '@', both sides non-empty, no whitespace.
static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("email pattern compiles"));

/// Validate a username: 3..=50 characters of `[A-Za-z0-9_]`.
pub fn validate_username(username: &str) -> Result<(), AuthError> {
    if username.trim().is_empty() {
        return Err(AuthError::InvalidIdentity("username is blank".into()));
    }

    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AuthError::InvalidIdentity(format!(
            "username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"
        )));
    }

    if !USERNAME_PATTERN.is_match(username) {
        return Err(AuthError::InvalidIdentity(
            "username may only contain letters, digits and underscores".into(),
        ));
    }

    Ok(())
}

/// Validate the minimal `local@domain` email shape.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() {
        return Err(AuthError::InvalidIdentity("email is blank".into()));
    }

    if !EMAIL_PATTERN.is_match(email) {
        return Err(AuthError::InvalidIdentity("email format is invalid".into()));
    }

    Ok(())
}

/// Validate a password against the strength policy.
///
/// Requires at least eight characters with an uppercase letter, a lowercase
/// letter, a digit and a character outside `[A-Za-z0-9]`. An absent password
/// always fails.
pub fn validate_password<'a>(password: impl Into<Option<&'a str>>) -> Result<(), AuthError> {
    let Some(password) = password.into() else {
        return Err(AuthError::WeakCredential("password is required".into()));
    };

    let mut missing = Vec::new();
    if password.chars().count() < PASSWORD_MIN_LEN {
        missing.push("at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        missing.push("an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        missing.push("a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        missing.push("a digit");
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        missing.push("a special character");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthError::WeakCredential(format!(
            "password requires {}",
            missing.join(", ")
        )))
    }
}

/// A username that passed [`validate_username`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub fn parse(value: impl Into<String>) -> Result<Self, AuthError> {
        let value = value.into();
        validate_username(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Username {}

impl TryFrom<String> for Username {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

impl core::fmt::Display for Username {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An email address that passed [`validate_email`], trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(value: impl AsRef<str>) -> Result<Self, AuthError> {
        let value = value.as_ref().trim();
        validate_email(value)?;
        Ok(Self(value.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for EmailAddress {}

impl TryFrom<String> for EmailAddress {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl core::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque password hash material produced by a credential hasher.
///
/// The core never interprets it; `Debug` is redacted.
#[derive(Debug, Clone)]
pub struct PasswordHash(SecretString);

impl PasswordHash {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(SecretString::new(encoded.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Hashing failure inside a [`CredentialHasher`].
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("credential hashing failed: {0}")]
pub struct HashingError(pub String);

/// One-way password hashing, supplied by infrastructure.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<PasswordHash, HashingError>;

    /// `Ok(false)` on mismatch; `Err` only for malformed stored hashes.
    fn verify(&self, password: &str, hash: &PasswordHash) -> Result<bool, HashingError>;
}

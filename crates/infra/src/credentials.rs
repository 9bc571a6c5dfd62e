//! Argon2id password hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Argon2, Params};

use keystone_auth::{CredentialHasher, HashingError, PasswordHash};

/// [`CredentialHasher`] producing PHC-encoded Argon2id hashes.
#[derive(Debug, Clone, Default)]
pub struct Argon2CredentialHasher {
    params: Option<Params>,
}

impl Argon2CredentialHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the cost parameters used for new hashes. Verification always
    /// uses the parameters encoded in the stored hash.
    pub fn with_params(params: Params) -> Self {
        Self { params: Some(params) }
    }

    fn argon2(&self) -> Argon2<'static> {
        match &self.params {
            Some(params) => Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params.clone()),
            None => Argon2::default(),
        }
    }
}

impl CredentialHasher for Argon2CredentialHasher {
    fn hash(&self, password: &str) -> Result<PasswordHash, HashingError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| PasswordHash::new(hash.to_string()))
            .map_err(|e| HashingError(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &PasswordHash) -> Result<bool, HashingError> {
        let parsed = password_hash::PasswordHash::new(hash.expose()).map_err(|e| HashingError(e.to_string()))?;
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashingError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2CredentialHasher {
        Argon2CredentialHasher::with_params(Params::new(1024, 1, 1, None).unwrap())
    }

    #[test]
    fn hash_then_verify() {
        let hasher = cheap();
        let hash = hasher.hash("Secure@123").unwrap();

        assert!(hash.expose().starts_with("$argon2id$"));
        assert!(hasher.verify("Secure@123", &hash).unwrap());
        assert!(!hasher.verify("Secure@124", &hash).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = cheap();
        let a = hasher.hash("Secure@123").unwrap();
        let b = hasher.hash("Secure@123").unwrap();
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let err = cheap().verify("Secure@123", &PasswordHash::new("not-a-phc-string"));
        assert!(err.is_err());
    }
}

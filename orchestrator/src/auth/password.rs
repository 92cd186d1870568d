//! Password policy and hashing

use std::collections::HashSet;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use once_cell::sync::Lazy;

use crate::config::AuthConfig;

use super::AuthError;

static COMMON_PASSWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    include_str!("common_passwords.txt")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
});

/// Strength rules applied at signup
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub minimum_length: usize,
    pub check_common: bool,
}

impl PasswordPolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            minimum_length: config.minimum_password_length,
            check_common: config.check_common_password,
        }
    }

    pub fn check(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.minimum_length {
            return Err(AuthError::WeakPassword(format!(
                "password must be at least {} characters",
                self.minimum_length
            )));
        }

        if self.check_common && COMMON_PASSWORDS.contains(password.to_lowercase().as_str()) {
            return Err(AuthError::WeakPassword(
                "password is too common".to_string(),
            ));
        }

        Ok(())
    }
}

/// Hash a password for storage
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored hash. Unparseable hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

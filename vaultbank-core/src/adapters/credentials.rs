//! Credential hashing adapters
//!
//! `Argon2Credentials` writes salted Argon2id PHC strings. It still accepts
//! the unsalted SHA-256 hex digests found in databases created by older
//! releases, so those accounts keep working until their password is rotated.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::domain::result::{Error, Result};
use crate::ports::CredentialHasher;

/// Argon2id with the crate's default parameters
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Credentials;

impl Argon2Credentials {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialHasher for Argon2Credentials {
    fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Credential(format!("Failed to hash password: {}", e)))
    }

    fn matches(&self, digest: &str, candidate: &str) -> bool {
        // PHC strings always start with '$'; anything else is a legacy digest
        if !digest.starts_with('$') {
            return sha256_matches(digest, candidate);
        }
        match PasswordHash::new(digest) {
            Ok(parsed) => Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Unsalted SHA-256, hex encoded
///
/// Only for data directories carried over from the legacy format; select it
/// with `security.credentialScheme = "sha256"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Credentials;

impl Sha256Credentials {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialHasher for Sha256Credentials {
    fn hash(&self, secret: &str) -> Result<String> {
        Ok(sha256_hex(secret))
    }

    fn matches(&self, digest: &str, candidate: &str) -> bool {
        sha256_matches(digest, candidate)
    }
}

fn sha256_hex(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn sha256_matches(digest: &str, candidate: &str) -> bool {
    let expected = digest.trim().to_ascii_lowercase();
    let actual = sha256_hex(candidate);
    expected.len() == actual.len() && bool::from(expected.as_bytes().ct_eq(actual.as_bytes()))
}

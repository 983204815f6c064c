//! Credential capability port

use crate::domain::result::Result;

/// One-way hashing of secrets (account passwords and the admin secret)
pub trait CredentialHasher: Send + Sync {
    /// Produce a storable digest for `secret`
    fn hash(&self, secret: &str) -> Result<String>;

    /// Whether `candidate` hashes to `digest`. Malformed digests never match.
    fn matches(&self, digest: &str, candidate: &str) -> bool;
}

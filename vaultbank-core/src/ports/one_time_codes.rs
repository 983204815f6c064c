//! One-time-code capability port

use crate::domain::result::Result;

/// Time-windowed one-time codes derived from a shared secret
pub trait OneTimeCodes: Send + Sync {
    /// Generate a fresh shared secret for enrollment
    fn new_secret(&self) -> String;

    /// The code valid right now, shown while enrolling
    fn current_code(&self, secret: &str) -> Result<String>;

    /// Whether `candidate` is valid for `secret` within the accepted window
    fn verify(&self, secret: &str, candidate: &str) -> bool;

    /// URI an authenticator app can import (usually rendered as a QR code)
    fn provisioning_uri(&self, secret: &str, label: &str) -> String;
}

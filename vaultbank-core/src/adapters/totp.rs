//! Time-based one-time codes (RFC 6238, HMAC-SHA1)
//!
//! Secrets are 160-bit random keys, stored and displayed as unpadded
//! RFC 4648 base32 so any authenticator app can import them.

use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha1::Sha1;
use subtle::ConstantTimeEq;
use url::form_urlencoded;

use crate::domain::result::{Error, Result};
use crate::ports::OneTimeCodes;

type HmacSha1 = Hmac<Sha1>;

const SECRET_BYTES: usize = 20;
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// TOTP generator/verifier
#[derive(Debug, Clone)]
pub struct TotpCodes {
    issuer: String,
    digits: u32,
    step_seconds: u64,
    skew_steps: u64,
}

impl Default for TotpCodes {
    fn default() -> Self {
        Self::new("VaultBank", 6, 30, 1)
    }
}

impl TotpCodes {
    /// `digits` is clamped to 6..=8 and `step_seconds` to at least 1
    pub fn new(issuer: impl Into<String>, digits: u32, step_seconds: u64, skew_steps: u64) -> Self {
        Self {
            issuer: issuer.into(),
            digits: digits.clamp(6, 8),
            step_seconds: step_seconds.max(1),
            skew_steps,
        }
    }

    /// Code for `secret` at a given unix time
    pub fn code_at(&self, secret: &str, unix_time: u64) -> Result<String> {
        let key = base32_decode(secret)
            .ok_or_else(|| Error::Credential("authenticator secret is not valid base32".into()))?;
        self.hotp(&key, unix_time / self.step_seconds)
    }

    /// Check `candidate` against the steps around `unix_time`
    pub fn verify_at(&self, secret: &str, candidate: &str, unix_time: u64) -> bool {
        let candidate = candidate.trim();
        if candidate.len() != self.digits as usize || !candidate.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        let Some(key) = base32_decode(secret) else {
            return false;
        };

        let current = unix_time / self.step_seconds;
        let first = current.saturating_sub(self.skew_steps);
        let last = current.saturating_add(self.skew_steps);
        (first..=last).any(|counter| match self.hotp(&key, counter) {
            Ok(expected) => bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())),
            Err(_) => false,
        })
    }

    fn hotp(&self, key: &[u8], counter: u64) -> Result<String> {
        let mut mac = HmacSha1::new_from_slice(key)
            .map_err(|e| Error::Credential(format!("Invalid authenticator key: {}", e)))?;
        mac.update(&counter.to_be_bytes());
        let hash = mac.finalize().into_bytes();

        // Dynamic truncation
        let offset = (hash[hash.len() - 1] & 0x0f) as usize;
        let binary = u32::from_be_bytes([
            hash[offset] & 0x7f,
            hash[offset + 1],
            hash[offset + 2],
            hash[offset + 3],
        ]);
        let code = binary % 10u32.pow(self.digits);
        Ok(format!("{:0width$}", code, width = self.digits as usize))
    }
}

fn now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

impl OneTimeCodes for TotpCodes {
    fn new_secret(&self) -> String {
        let key: [u8; SECRET_BYTES] = rand::thread_rng().gen();
        base32_encode(&key)
    }

    fn current_code(&self, secret: &str) -> Result<String> {
        self.code_at(secret, now())
    }

    fn verify(&self, secret: &str, candidate: &str) -> bool {
        self.verify_at(secret, candidate, now())
    }

    fn provisioning_uri(&self, secret: &str, label: &str) -> String {
        let issuer = encode_component(&self.issuer);
        format!(
            "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
            issuer,
            encode_component(label),
            secret,
            issuer,
            self.digits,
            self.step_seconds
        )
    }
}

fn encode_component(value: &str) -> String {
    // form encoding writes spaces as '+', which otpauth labels don't accept
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Unpadded RFC 4648 base32
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// Lenient base32 decode: case-insensitive, ignores spaces, dashes and padding
fn base32_decode(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    let mut seen = 0usize;
    for c in input.chars() {
        if matches!(c, ' ' | '-' | '=') {
            continue;
        }
        let value = match c.to_ascii_uppercase() {
            c @ 'A'..='Z' => c as u32 - 'A' as u32,
            c @ '2'..='7' => c as u32 - '2' as u32 + 26,
            _ => return None,
        };
        seen += 1;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    if seen == 0 {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Base32 of the ASCII key "12345678901234567890"
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_rfc6238_vectors() {
        let eight = TotpCodes::new("VaultBank", 8, 30, 1);
        assert_eq!(eight.code_at(RFC_SECRET, 59).unwrap(), "94287082");
        assert_eq!(eight.code_at(RFC_SECRET, 1111111109).unwrap(), "07081804");
        assert_eq!(eight.code_at(RFC_SECRET, 1234567890).unwrap(), "89005924");

        let six = TotpCodes::default();
        assert_eq!(six.code_at(RFC_SECRET, 59).unwrap(), "287082");
    }

    #[test]
    fn test_verify_accepts_adjacent_steps() {
        let codes = TotpCodes::default();
        let code = codes.code_at(RFC_SECRET, 1_000_000).unwrap();
        assert!(codes.verify_at(RFC_SECRET, &code, 1_000_000));
        assert!(codes.verify_at(RFC_SECRET, &code, 1_000_030));
        assert!(!codes.verify_at(RFC_SECRET, &code, 1_000_000 + 120));
    }

    #[test]
    fn test_verify_rejects_malformed_codes() {
        let codes = TotpCodes::default();
        assert!(!codes.verify_at(RFC_SECRET, "12345", 59));
        assert!(!codes.verify_at(RFC_SECRET, "28708a", 59));
        assert!(!codes.verify_at("not base32!", "287082", 59));
        assert!(codes.verify_at(RFC_SECRET, " 287082 ", 59));
    }

    #[test]
    fn test_base32_round_trip() {
        assert_eq!(base32_encode(b"12345678901234567890"), RFC_SECRET);
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_decode("MY======").unwrap(), b"f");
        assert_eq!(base32_decode("my").unwrap(), b"f");
        assert!(base32_decode("").is_none());
        assert!(base32_decode("M1").is_none());
    }

    #[test]
    fn test_new_secret_is_usable() {
        let codes = TotpCodes::default();
        let secret = codes.new_secret();
        assert_eq!(secret.len(), 32);
        let code = codes.current_code(&secret).unwrap();
        assert!(codes.verify(&secret, &code));
    }

    #[test]
    fn test_provisioning_uri() {
        let codes = TotpCodes::default();
        let uri = codes.provisioning_uri(RFC_SECRET, "Alice Smith");
        assert!(uri.starts_with("otpauth://totp/VaultBank:Alice%20Smith?"));
        assert!(uri.contains("secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ"));
        assert!(uri.contains("digits=6"));
    }
}

//! Configuration management
//!
//! Settings live in `<data_dir>/settings.json`:
//! ```json
//! {
//!   "security": { "maxAttempts": 3, "credentialScheme": "argon2id" },
//!   "twoFactor": { "issuer": "VaultBank", "digits": 6, "stepSeconds": 30, "skewSteps": 1 }
//! }
//! ```
//! Keys this crate doesn't know about are preserved when saving.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::domain::DEFAULT_MAX_ATTEMPTS;

/// How credential digests are produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialScheme {
    /// Salted Argon2id PHC strings; also verifies legacy SHA-256 digests
    #[default]
    Argon2id,
    /// Unsalted SHA-256 hex, for data carried over from the legacy format
    Sha256,
}

impl fmt::Display for CredentialScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialScheme::Argon2id => "argon2id",
            CredentialScheme::Sha256 => "sha256",
        })
    }
}

impl FromStr for CredentialScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "argon2id" | "argon2" => Ok(CredentialScheme::Argon2id),
            "sha256" => Ok(CredentialScheme::Sha256),
            other => Err(Error::config(format!(
                "unknown credential scheme '{}' (expected argon2id or sha256)",
                other
            ))),
        }
    }
}

/// Authenticator parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TwoFactorSettings {
    pub issuer: String,
    pub digits: u32,
    pub step_seconds: u64,
    /// Steps accepted on either side of the current one
    pub skew_steps: u64,
}

impl Default for TwoFactorSettings {
    fn default() -> Self {
        Self {
            issuer: "VaultBank".to_string(),
            digits: 6,
            step_seconds: 30,
            skew_steps: 1,
        }
    }
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    security: SecuritySettings,
    #[serde(default)]
    two_factor: TwoFactorSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecuritySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credential_scheme: Option<CredentialScheme>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// VaultBank configuration (resolved view of settings plus environment)
#[derive(Debug, Clone)]
pub struct Config {
    /// Consecutive failures (password or code, counted separately) before lockout
    pub max_attempts: u32,
    pub credential_scheme: CredentialScheme,
    pub two_factor: TwoFactorSettings,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            credential_scheme: CredentialScheme::default(),
            two_factor: TwoFactorSettings::default(),
            _raw_settings: SettingsFile::default(),
        }
    }
}

impl Config {
    /// Load config from the data directory
    ///
    /// `VAULTBANK_MAX_ATTEMPTS` and `VAULTBANK_CREDENTIAL_SCHEME` override
    /// the file.
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with_env(data_dir, |key| std::env::var(key).ok())
    }

    /// Load with an explicit environment lookup
    pub fn load_with_env(data_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = read_settings(data_dir)?;

        let max_attempts = match env("VAULTBANK_MAX_ATTEMPTS") {
            Some(value) => value.trim().parse::<u32>().map_err(|_| {
                Error::config(format!("VAULTBANK_MAX_ATTEMPTS must be a positive integer, got '{}'", value))
            })?,
            None => raw.security.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        };

        let credential_scheme = match env("VAULTBANK_CREDENTIAL_SCHEME") {
            Some(value) => value.parse()?,
            None => raw.security.credential_scheme.unwrap_or_default(),
        };

        let config = Self {
            max_attempts,
            credential_scheme,
            two_factor: raw.two_factor.clone(),
            _raw_settings: raw,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("maxAttempts must be at least 1"));
        }
        if !(6..=8).contains(&self.two_factor.digits) {
            return Err(Error::config("twoFactor.digits must be between 6 and 8"));
        }
        if self.two_factor.step_seconds == 0 {
            return Err(Error::config("twoFactor.stepSeconds must be at least 1"));
        }
        Ok(())
    }

    /// Save config to the data directory
    /// Preserves other settings that this crate doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join("settings.json");

        let mut settings = if settings_path.exists() {
            read_settings(data_dir)?
        } else {
            self._raw_settings.clone()
        };

        // Update only the fields we manage
        settings.security.max_attempts = Some(self.max_attempts);
        settings.security.credential_scheme = Some(self.credential_scheme);
        settings.two_factor = self.two_factor.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::config(format!("{}: {}", settings_path.display(), e)))
}

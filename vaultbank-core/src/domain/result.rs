//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AccountNumber;

/// Core library error type
///
/// Everything except [`Error::Storage`], [`Error::Io`] and [`Error::Config`]
/// is an ordinary outcome the caller is expected to report and carry on from.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Account {0} does not exist")]
    AccountNotFound(AccountNumber),

    #[error("Target account {0} not found")]
    TargetAccountNotFound(AccountNumber),

    #[error("Incorrect password{}", remaining_note(.remaining))]
    IncorrectPassword { remaining: Option<u32> },

    #[error("Incorrect verification code{}", remaining_note(.remaining))]
    IncorrectCode { remaining: Option<u32> },

    #[error("Account is locked. Please contact admin.")]
    AccountLocked,

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("Two-factor authentication is already enabled")]
    AlreadyEnabled,

    #[error("Verification code does not match the new authenticator secret")]
    ProofFailed,

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("No verification code is pending for account {0}")]
    NoPendingChallenge(AccountNumber),

    #[error("A new password is required")]
    MissingCredential,

    #[error("An admin password is already set")]
    AdminExists,

    #[error("The ledger has been wiped and must be re-initialized")]
    Uninitialized,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn remaining_note(remaining: &Option<u32>) -> String {
    match remaining {
        Some(1) => " (1 attempt remaining)".to_string(),
        Some(n) => format!(" ({} attempts remaining)", n),
        None => String::new(),
    }
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the caller may report this and keep its session going.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Storage(_) | Self::Credential(_) | Self::Io(_) | Self::Config(_)
        )
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result envelope for `--json` output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Attach a context value (e.g. the account number an error refers to)
    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value);
        self
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.to_string()),
        }
    }
}

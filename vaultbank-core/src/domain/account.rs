//! Account domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account numbers are positive and assigned sequentially from 1
pub type AccountNumber = i64;

/// Default number of consecutive failures before an account locks
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A customer account as stored by the repository
///
/// Carries the credential digest and authenticator secret, so it never leaves
/// the core. Callers get an [`AccountView`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub number: AccountNumber,
    pub name: String,
    /// Never negative; always equals the sum of this account's ledger entries
    pub balance: i64,

    // Running totals, informational only
    pub total_deposited: i64,
    pub total_withdrawn: i64,
    /// Only incremented on the sending side of a transfer
    pub total_transferred: i64,

    /// Consecutive failed password checks
    pub password_attempts: u32,
    /// Consecutive failed second-factor checks, counted separately
    pub code_attempts: u32,
    /// Explicit lock, set by threshold or by an administrator
    pub is_locked: bool,

    pub two_factor_enabled: bool,
    /// Present only while two-factor is enabled
    pub otp_secret: Option<String>,

    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh account with zero balance and zero counters
    pub fn new(number: AccountNumber, name: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            number,
            name: name.into(),
            balance: 0,
            total_deposited: 0,
            total_withdrawn: 0,
            total_transferred: 0,
            password_attempts: 0,
            code_attempts: 0,
            is_locked: false,
            two_factor_enabled: false,
            otp_secret: None,
            password_hash: password_hash.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Locked by flag, or either counter has reached the threshold
    pub fn is_locked_out(&self, max_attempts: u32) -> bool {
        self.is_locked
            || self.password_attempts >= max_attempts
            || self.code_attempts >= max_attempts
    }

    /// Bump `updated_at`; called on every copy that is about to be written
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.number < 1 {
            return Err("account number must be positive");
        }
        if self.name.trim().is_empty() {
            return Err("account name cannot be empty");
        }
        if self.balance < 0 {
            return Err("balance cannot be negative");
        }
        if self.two_factor_enabled && self.otp_secret.is_none() {
            return Err("two-factor accounts need a shared secret");
        }
        Ok(())
    }

    /// Public projection of this account
    pub fn view(&self, max_attempts: u32) -> AccountView {
        AccountView {
            number: self.number,
            name: self.name.clone(),
            balance: self.balance,
            total_deposited: self.total_deposited,
            total_withdrawn: self.total_withdrawn,
            total_transferred: self.total_transferred,
            password_attempts: self.password_attempts,
            code_attempts: self.code_attempts,
            locked: self.is_locked_out(max_attempts),
            two_factor_enabled: self.two_factor_enabled,
            created_at: self.created_at,
        }
    }
}

/// Account summary safe to hand to any driver (no digest, no secret)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub number: AccountNumber,
    pub name: String,
    pub balance: i64,
    pub total_deposited: i64,
    pub total_withdrawn: i64,
    pub total_transferred: i64,
    pub password_attempts: u32,
    pub code_attempts: u32,
    pub locked: bool,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
}

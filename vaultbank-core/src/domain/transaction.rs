//! Ledger entry domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AccountNumber;

/// What kind of movement a ledger entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TransferOut,
    TransferIn,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::TransferOut => "transfer-out",
            TransactionKind::TransferIn => "transfer-in",
        }
    }

    /// Credits carry a positive amount, debits a negative one
    pub fn is_credit(&self) -> bool {
        matches!(self, TransactionKind::Deposit | TransactionKind::TransferIn)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "transfer-out" => Ok(TransactionKind::TransferOut),
            "transfer-in" => Ok(TransactionKind::TransferIn),
            other => Err(format!("unknown transaction kind '{}'", other)),
        }
    }
}

/// A ledger entry that has not been written yet
///
/// The repository assigns the identifier when it appends the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub account: AccountNumber,
    pub kind: TransactionKind,
    /// Signed: positive for credits, negative for debits
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    /// Build an entry for `amount` (a positive magnitude); the sign comes from `kind`
    pub fn new(account: AccountNumber, kind: TransactionKind, amount: i64) -> Self {
        let magnitude = amount.abs();
        Self {
            account,
            kind,
            amount: if kind.is_credit() { magnitude } else { -magnitude },
            created_at: Utc::now(),
        }
    }

    /// Attach the identifier assigned by the repository
    pub fn with_id(self, id: i64) -> Transaction {
        Transaction {
            id,
            account: self.account,
            kind: self.kind,
            amount: self.amount,
            created_at: self.created_at,
        }
    }
}

/// An appended ledger entry. Never updated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account: AccountNumber,
    pub kind: TransactionKind,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

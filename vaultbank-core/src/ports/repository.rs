//! Repository port - durable storage for accounts, the ledger and the admin secret

use crate::domain::result::Result;
use crate::domain::{Account, AccountNumber, NewTransaction, Transaction};

/// A set of writes that must land together or not at all
///
/// Account records are upserted, ledger entries appended. A transfer is one
/// changeset touching two accounts and two entries.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub accounts: Vec<Account>,
    pub transactions: Vec<NewTransaction>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert this account record
    pub fn put(mut self, account: Account) -> Self {
        self.accounts.push(account);
        self
    }

    /// Append this ledger entry
    pub fn append(mut self, transaction: NewTransaction) -> Self {
        self.transactions.push(transaction);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.transactions.is_empty()
    }
}

/// Storage abstraction
///
/// Every call either fully succeeds or fails with [`Error::Storage`]
/// (or [`Error::Uninitialized`] once the ledger schema has been wiped).
/// There is no partial success.
///
/// [`Error::Storage`]: crate::domain::result::Error::Storage
/// [`Error::Uninitialized`]: crate::domain::result::Error::Uninitialized
pub trait Repository: Send + Sync {
    // === Schema ===

    /// Create or upgrade the schema (runs pending migrations)
    fn ensure_schema(&self) -> Result<()>;

    // === Accounts ===

    /// Current maximum account number plus one
    ///
    /// Numbers still referenced by ledger entries of deleted accounts count
    /// towards the maximum, so a number is never handed out twice.
    fn next_account_id(&self) -> Result<AccountNumber>;

    fn get_account(&self, number: AccountNumber) -> Result<Option<Account>>;

    /// All accounts ordered by number
    fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Insert or replace a single account record
    fn put_account(&self, account: &Account) -> Result<()> {
        self.commit(&ChangeSet::new().put(account.clone()))?;
        Ok(())
    }

    /// Remove an account record; its ledger entries stay behind.
    /// Returns whether a record was removed.
    fn delete_account(&self, number: AccountNumber) -> Result<bool>;

    // === Ledger ===

    /// Append a single ledger entry
    fn append_transaction(&self, transaction: &NewTransaction) -> Result<Transaction> {
        let mut written = self.commit(&ChangeSet::new().append(transaction.clone()))?;
        written
            .pop()
            .ok_or_else(|| crate::Error::storage("append returned no entry"))
    }

    /// Ledger entries for an account, oldest first
    fn list_transactions(&self, number: AccountNumber) -> Result<Vec<Transaction>>;

    /// Account numbers that appear in the ledger but have no account record
    fn orphaned_account_numbers(&self) -> Result<Vec<AccountNumber>>;

    /// Apply a changeset atomically, returning the appended entries with their ids
    fn commit(&self, changes: &ChangeSet) -> Result<Vec<Transaction>>;

    // === Admin secret ===

    fn get_admin_secret(&self) -> Result<Option<String>>;

    fn put_admin_secret(&self, digest: &str) -> Result<()>;

    fn delete_admin_secret(&self) -> Result<()>;

    // === Maintenance ===

    /// Remove every account and ledger entry; keeps the admin secret and schema
    fn clear_all(&self) -> Result<()>;

    /// Drop the ledger schema itself; `ensure_schema` must run before reuse.
    /// The admin secret survives.
    fn wipe_all(&self) -> Result<()>;
}

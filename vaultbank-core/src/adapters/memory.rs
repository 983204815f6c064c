//! In-memory repository
//!
//! Same contract as the DuckDB adapter, including the wipe/re-initialize
//! cycle. Used for `--ephemeral` runs and service tests. Writes can be made
//! to fail on demand to exercise storage-failure handling.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountNumber, Transaction};
use crate::ports::{ChangeSet, Repository};

#[derive(Debug)]
struct State {
    accounts: BTreeMap<AccountNumber, Account>,
    transactions: Vec<Transaction>,
    last_transaction_id: i64,
    admin_secret: Option<String>,
    initialized: bool,
    failing_writes: u32,
}

impl Default for State {
    fn default() -> Self {
        Self {
            accounts: BTreeMap::new(),
            transactions: Vec::new(),
            last_transaction_id: 0,
            admin_secret: None,
            initialized: true,
            failing_writes: 0,
        }
    }
}

impl State {
    fn ledger(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::Uninitialized)
        }
    }

    fn write(&mut self) -> Result<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(Error::storage("injected write failure"));
        }
        Ok(())
    }
}

/// Repository backed by process memory
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` write calls fail with a storage error
    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().failing_writes = count;
    }
}

impl Repository for MemoryRepository {
    fn ensure_schema(&self) -> Result<()> {
        self.state.lock().initialized = true;
        Ok(())
    }

    fn next_account_id(&self) -> Result<AccountNumber> {
        let state = self.state.lock();
        state.ledger()?;
        let max_account = state.accounts.keys().next_back().copied().unwrap_or(0);
        let max_ledger = state.transactions.iter().map(|t| t.account).max().unwrap_or(0);
        Ok(max_account.max(max_ledger) + 1)
    }

    fn get_account(&self, number: AccountNumber) -> Result<Option<Account>> {
        let state = self.state.lock();
        state.ledger()?;
        Ok(state.accounts.get(&number).cloned())
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let state = self.state.lock();
        state.ledger()?;
        Ok(state.accounts.values().cloned().collect())
    }

    fn delete_account(&self, number: AccountNumber) -> Result<bool> {
        let mut state = self.state.lock();
        state.ledger()?;
        state.write()?;
        Ok(state.accounts.remove(&number).is_some())
    }

    fn list_transactions(&self, number: AccountNumber) -> Result<Vec<Transaction>> {
        let state = self.state.lock();
        state.ledger()?;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.account == number)
            .cloned()
            .collect())
    }

    fn orphaned_account_numbers(&self) -> Result<Vec<AccountNumber>> {
        let state = self.state.lock();
        state.ledger()?;
        let mut orphans: Vec<AccountNumber> = state
            .transactions
            .iter()
            .map(|t| t.account)
            .filter(|n| !state.accounts.contains_key(n))
            .collect();
        orphans.sort_unstable();
        orphans.dedup();
        Ok(orphans)
    }

    fn commit(&self, changes: &ChangeSet) -> Result<Vec<Transaction>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = self.state.lock();
        state.ledger()?;
        state.write()?;

        // Same constraint the database enforces; checked before anything is applied
        if let Some(bad) = changes.accounts.iter().find(|a| a.balance < 0) {
            return Err(Error::storage(format!(
                "CHECK constraint failed: negative balance for account {}",
                bad.number
            )));
        }

        for account in &changes.accounts {
            state.accounts.insert(account.number, account.clone());
        }
        let mut written = Vec::with_capacity(changes.transactions.len());
        for entry in &changes.transactions {
            state.last_transaction_id += 1;
            let transaction = entry.clone().with_id(state.last_transaction_id);
            state.transactions.push(transaction.clone());
            written.push(transaction);
        }
        Ok(written)
    }

    fn get_admin_secret(&self) -> Result<Option<String>> {
        Ok(self.state.lock().admin_secret.clone())
    }

    fn put_admin_secret(&self, digest: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.write()?;
        state.admin_secret = Some(digest.to_string());
        Ok(())
    }

    fn delete_admin_secret(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.write()?;
        state.admin_secret = None;
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ledger()?;
        state.write()?;
        state.accounts.clear();
        state.transactions.clear();
        Ok(())
    }

    fn wipe_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.write()?;
        state.accounts.clear();
        state.transactions.clear();
        // The sequence is dropped with the schema
        state.last_transaction_id = 0;
        state.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTransaction, TransactionKind};

    #[test]
    fn test_commit_is_all_or_nothing() {
        let repo = MemoryRepository::new();
        let mut good = Account::new(1, "Alice", "digest");
        good.balance = 10;
        let mut bad = Account::new(2, "Bob", "digest");
        bad.balance = -1;

        let changes = ChangeSet::new()
            .put(good)
            .put(bad)
            .append(NewTransaction::new(1, TransactionKind::Deposit, 10));
        assert!(matches!(repo.commit(&changes), Err(Error::Storage(_))));
        assert!(repo.list_accounts().unwrap().is_empty());
        assert!(repo.list_transactions(1).unwrap().is_empty());
    }

    #[test]
    fn test_injected_failures_run_out() {
        let repo = MemoryRepository::new();
        repo.fail_next_writes(1);
        let account = Account::new(1, "Alice", "digest");
        assert!(matches!(repo.put_account(&account), Err(Error::Storage(_))));
        repo.put_account(&account).unwrap();
        assert!(repo.get_account(1).unwrap().is_some());
    }

    #[test]
    fn test_numbering_counts_orphaned_entries() {
        let repo = MemoryRepository::new();
        repo.put_account(&Account::new(1, "Alice", "digest")).unwrap();
        repo.put_account(&Account::new(2, "Bob", "digest")).unwrap();
        repo.append_transaction(&NewTransaction::new(2, TransactionKind::Deposit, 5))
            .unwrap();
        assert!(repo.delete_account(2).unwrap());

        assert_eq!(repo.next_account_id().unwrap(), 3);
        assert_eq!(repo.orphaned_account_numbers().unwrap(), vec![2]);
    }

    #[test]
    fn test_wipe_requires_reinitialize() {
        let repo = MemoryRepository::new();
        repo.put_admin_secret("digest").unwrap();
        repo.put_account(&Account::new(1, "Alice", "digest")).unwrap();
        repo.wipe_all().unwrap();

        assert!(matches!(repo.get_account(1), Err(Error::Uninitialized)));
        assert_eq!(repo.get_admin_secret().unwrap().as_deref(), Some("digest"));

        repo.ensure_schema().unwrap();
        assert_eq!(repo.next_account_id().unwrap(), 1);
    }
}

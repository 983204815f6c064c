//! Ledger service - balance mutation and transaction recording
//!
//! Every mutation works on a fresh copy of the account read under its lock
//! and becomes visible only once the repository has committed it together
//! with its ledger entries.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountNumber, AccountView, NewTransaction, Session, Transaction, TransactionKind,
};
use crate::ports::{ChangeSet, Repository};
use crate::services::locks::AccountLocks;

/// Balance compared against the sum of the account's ledger entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub account: AccountNumber,
    pub balance: i64,
    pub ledger_sum: i64,
    pub entries: usize,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.balance == self.ledger_sum
    }
}

/// Reconcile one account against its ledger entries
pub(crate) fn reconcile_account(repository: &dyn Repository, account: &Account) -> Result<Reconciliation> {
    let entries = repository.list_transactions(account.number)?;
    let ledger_sum = entries
        .iter()
        .try_fold(0i64, |sum, t| sum.checked_add(t.amount))
        .ok_or_else(|| Error::validation(format!("ledger sum overflows for account {}", account.number)))?;
    Ok(Reconciliation {
        account: account.number,
        balance: account.balance,
        ledger_sum,
        entries: entries.len(),
    })
}

/// Row written by the CSV statement export
#[derive(Debug, Serialize)]
struct StatementRow<'a> {
    id: i64,
    date: String,
    kind: &'a str,
    amount: i64,
}

/// Service for balance-affecting operations on authenticated accounts
pub struct LedgerService {
    repository: Arc<dyn Repository>,
    locks: Arc<AccountLocks>,
    max_attempts: u32,
}

impl LedgerService {
    pub fn new(repository: Arc<dyn Repository>, locks: Arc<AccountLocks>, max_attempts: u32) -> Self {
        Self {
            repository,
            locks,
            max_attempts,
        }
    }

    fn load(&self, number: AccountNumber) -> Result<Account> {
        self.repository
            .get_account(number)?
            .ok_or(Error::AccountNotFound(number))
    }

    /// Load the account a session was issued for
    ///
    /// A number that now belongs to a different record counts as missing.
    fn load_session(&self, session: &Session) -> Result<Account> {
        let account = self.load(session.account())?;
        if !session.is_for(&account) {
            return Err(Error::AccountNotFound(session.account()));
        }
        Ok(account)
    }

    /// Load an account that may move money; an account locked after the
    /// session started can no longer do so
    fn load_active(&self, session: &Session) -> Result<Account> {
        let account = self.load_session(session)?;
        if account.is_locked_out(self.max_attempts) {
            return Err(Error::AccountLocked);
        }
        Ok(account)
    }

    fn check_amount(amount: i64) -> Result<()> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        Ok(())
    }

    /// Credit the session's account
    pub fn deposit(&self, session: &Session, amount: i64) -> Result<AccountView> {
        Self::check_amount(amount)?;
        let _guard = self.locks.lock(session.account());
        let account = self.load_active(session)?;

        let mut updated = account.clone();
        updated.balance = checked(account.balance, amount)?;
        updated.total_deposited = checked(account.total_deposited, amount)?;
        updated.touch();

        self.repository.commit(
            &ChangeSet::new()
                .put(updated.clone())
                .append(NewTransaction::new(account.number, TransactionKind::Deposit, amount)),
        )?;
        Ok(updated.view(self.max_attempts))
    }

    /// Debit the session's account; never partially
    pub fn withdraw(&self, session: &Session, amount: i64) -> Result<AccountView> {
        Self::check_amount(amount)?;
        let _guard = self.locks.lock(session.account());
        let account = self.load_active(session)?;

        if amount > account.balance {
            return Err(Error::InsufficientFunds);
        }

        let mut updated = account.clone();
        updated.balance -= amount;
        updated.total_withdrawn = checked(account.total_withdrawn, amount)?;
        updated.touch();

        self.repository.commit(
            &ChangeSet::new()
                .put(updated.clone())
                .append(NewTransaction::new(account.number, TransactionKind::Withdrawal, amount)),
        )?;
        Ok(updated.view(self.max_attempts))
    }

    /// Move `amount` from the session's account to `destination`
    ///
    /// Both accounts and both ledger entries are written in one commit.
    /// Only the sender's transferred total changes. A transfer to the same
    /// account is recorded like any other and leaves the balance unchanged.
    /// A locked destination still receives funds.
    pub fn transfer(
        &self,
        session: &Session,
        destination: AccountNumber,
        amount: i64,
    ) -> Result<AccountView> {
        Self::check_amount(amount)?;
        let source_number = session.account();
        let _guard = self.locks.lock_pair(source_number, destination);

        let source = self.load_active(session)?;
        let target = if destination == source_number {
            None
        } else {
            Some(
                self.repository
                    .get_account(destination)?
                    .ok_or(Error::TargetAccountNotFound(destination))?,
            )
        };

        if amount > source.balance {
            return Err(Error::InsufficientFunds);
        }

        let mut sender = source.clone();
        sender.balance -= amount;
        sender.total_transferred = checked(source.total_transferred, amount)?;

        let mut changes = ChangeSet::new();
        match target {
            Some(target) => {
                let mut receiver = target.clone();
                receiver.balance = checked(target.balance, amount)?;
                receiver.touch();
                sender.touch();
                changes = changes.put(sender.clone()).put(receiver);
            }
            None => {
                sender.balance = checked(sender.balance, amount)?;
                sender.touch();
                changes = changes.put(sender.clone());
            }
        }

        self.repository.commit(
            &changes
                .append(NewTransaction::new(source_number, TransactionKind::TransferOut, amount))
                .append(NewTransaction::new(destination, TransactionKind::TransferIn, amount)),
        )?;
        Ok(sender.view(self.max_attempts))
    }

    /// Current state of the session's account
    pub fn details(&self, session: &Session) -> Result<AccountView> {
        Ok(self.load_session(session)?.view(self.max_attempts))
    }

    /// Ledger entries of the session's account, oldest first
    pub fn history(&self, session: &Session) -> Result<Vec<Transaction>> {
        self.load_session(session)?;
        self.repository.list_transactions(session.account())
    }

    /// Write the session's ledger entries as CSV; returns the row count
    pub fn export_history_csv<W: Write>(&self, session: &Session, writer: W) -> Result<usize> {
        let history = self.history(session)?;
        let mut csv = csv::Writer::from_writer(writer);
        // serialize() only emits the header alongside the first row
        if history.is_empty() {
            csv.write_record(["id", "date", "kind", "amount"])?;
        }
        for transaction in &history {
            csv.serialize(StatementRow {
                id: transaction.id,
                date: transaction.created_at.to_rfc3339(),
                kind: transaction.kind.as_str(),
                amount: transaction.amount,
            })?;
        }
        csv.flush()?;
        Ok(history.len())
    }

    /// Compare an account's balance with the sum of its ledger entries
    pub fn reconcile(&self, number: AccountNumber) -> Result<Reconciliation> {
        let _guard = self.locks.lock(number);
        let account = self.load(number)?;
        reconcile_account(self.repository.as_ref(), &account)
    }
}

fn checked(current: i64, amount: i64) -> Result<i64> {
    current.checked_add(amount).ok_or(Error::InvalidAmount(amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryRepository;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        ledger: LedgerService,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let ledger = LedgerService::new(repo.clone(), Arc::new(AccountLocks::new()), 3);
        Fixture { repo, ledger }
    }

    impl Fixture {
        fn open(&self, number: AccountNumber, balance: i64) -> Session {
            let mut account = Account::new(number, format!("holder {}", number), "digest");
            account.balance = balance;
            let mut changes = ChangeSet::new().put(account);
            if balance > 0 {
                changes = changes.append(NewTransaction::new(number, TransactionKind::Deposit, balance));
            }
            self.repo.commit(&changes).unwrap();
            Session::new(&self.account(number))
        }

        fn account(&self, number: AccountNumber) -> Account {
            self.repo.get_account(number).unwrap().unwrap()
        }
    }

    #[test]
    fn test_deposit_then_withdraw() {
        let f = fixture();
        let session = f.open(1, 0);
        f.ledger.deposit(&session, 100).unwrap();
        let view = f.ledger.withdraw(&session, 40).unwrap();

        assert_eq!(view.balance, 60);
        assert_eq!(view.total_deposited, 100);
        assert_eq!(view.total_withdrawn, 40);
        assert_eq!(f.ledger.history(&session).unwrap().len(), 2);
        assert!(f.ledger.reconcile(1).unwrap().is_balanced());
    }

    #[test]
    fn test_invalid_amounts() {
        let f = fixture();
        let session = f.open(1, 10);
        assert!(matches!(f.ledger.deposit(&session, 0), Err(Error::InvalidAmount(0))));
        assert!(matches!(f.ledger.withdraw(&session, -5), Err(Error::InvalidAmount(-5))));
        assert!(matches!(f.ledger.transfer(&session, 1, 0), Err(Error::InvalidAmount(0))));
        assert!(matches!(f.ledger.deposit(&session, i64::MAX), Err(Error::InvalidAmount(_))));
        assert_eq!(f.account(1).balance, 10);
    }

    #[test]
    fn test_overdraft_changes_nothing() {
        let f = fixture();
        let session = f.open(1, 30);
        assert!(matches!(f.ledger.withdraw(&session, 31), Err(Error::InsufficientFunds)));
        assert_eq!(f.account(1).balance, 30);
        assert_eq!(f.ledger.history(&session).unwrap().len(), 1);
    }

    #[test]
    fn test_transfer_updates_both_sides() {
        let f = fixture();
        let alice = f.open(1, 50);
        f.open(2, 10);

        let view = f.ledger.transfer(&alice, 2, 20).unwrap();
        assert_eq!(view.balance, 30);
        assert_eq!(view.total_transferred, 20);

        let bob = f.account(2);
        assert_eq!(bob.balance, 30);
        assert_eq!(bob.total_transferred, 0);
        assert!(f.ledger.reconcile(1).unwrap().is_balanced());
        assert!(f.ledger.reconcile(2).unwrap().is_balanced());
    }

    #[test]
    fn test_transfer_validation_order() {
        let f = fixture();
        let alice = f.open(1, 5);
        assert!(matches!(f.ledger.transfer(&alice, 9, -1), Err(Error::InvalidAmount(-1))));
        assert!(matches!(
            f.ledger.transfer(&alice, 9, 50),
            Err(Error::TargetAccountNotFound(9))
        ));
        f.open(2, 0);
        assert!(matches!(f.ledger.transfer(&alice, 2, 50), Err(Error::InsufficientFunds)));
    }

    #[test]
    fn test_self_transfer_is_recorded() {
        let f = fixture();
        let alice = f.open(1, 40);
        let view = f.ledger.transfer(&alice, 1, 15).unwrap();

        assert_eq!(view.balance, 40);
        assert_eq!(view.total_transferred, 15);
        let kinds: Vec<_> = f.ledger.history(&alice).unwrap().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TransactionKind::Deposit, TransactionKind::TransferOut, TransactionKind::TransferIn]
        );
        assert!(f.ledger.reconcile(1).unwrap().is_balanced());
    }

    #[test]
    fn test_locked_account_cannot_move_money() {
        let f = fixture();
        let alice = f.open(1, 40);
        let mut account = f.account(1);
        account.is_locked = true;
        f.repo.put_account(&account).unwrap();

        assert!(matches!(f.ledger.deposit(&alice, 1), Err(Error::AccountLocked)));
        assert!(matches!(f.ledger.transfer(&alice, 1, 1), Err(Error::AccountLocked)));
        assert!(f.ledger.details(&alice).unwrap().locked);
    }

    #[test]
    fn test_session_does_not_follow_reused_number() {
        let f = fixture();
        let alice = f.open(1, 40);
        let created = f.account(1).created_at;
        f.repo.clear_all().unwrap();

        let mut bob = Account::new(1, "Bob", "digest");
        bob.created_at = created + chrono::Duration::seconds(1);
        bob.balance = 500;
        f.repo
            .commit(&ChangeSet::new().put(bob).append(NewTransaction::new(1, TransactionKind::Deposit, 500)))
            .unwrap();
        f.open(2, 0);

        assert!(matches!(f.ledger.withdraw(&alice, 500), Err(Error::AccountNotFound(1))));
        assert!(matches!(f.ledger.deposit(&alice, 5), Err(Error::AccountNotFound(1))));
        assert!(matches!(f.ledger.transfer(&alice, 2, 500), Err(Error::AccountNotFound(1))));
        assert!(matches!(f.ledger.details(&alice), Err(Error::AccountNotFound(1))));
        assert!(matches!(f.ledger.history(&alice), Err(Error::AccountNotFound(1))));
        assert_eq!(f.account(1).balance, 500);
        assert_eq!(f.account(2).balance, 0);
    }

    #[test]
    fn test_locked_destination_still_receives() {
        let f = fixture();
        let alice = f.open(1, 40);
        f.open(2, 0);
        let mut bob = f.account(2);
        bob.password_attempts = 3;
        f.repo.put_account(&bob).unwrap();

        f.ledger.transfer(&alice, 2, 10).unwrap();
        assert_eq!(f.account(2).balance, 10);
    }

    #[test]
    fn test_storage_failure_applies_nothing() {
        let f = fixture();
        let alice = f.open(1, 50);
        f.open(2, 0);

        f.repo.fail_next_writes(1);
        assert!(matches!(f.ledger.transfer(&alice, 2, 20), Err(Error::Storage(_))));
        assert_eq!(f.account(1).balance, 50);
        assert_eq!(f.account(2).balance, 0);
        assert_eq!(f.ledger.history(&alice).unwrap().len(), 1);
    }

    #[test]
    fn test_csv_export() {
        let f = fixture();
        let alice = f.open(1, 25);
        f.ledger.withdraw(&alice, 5).unwrap();

        let mut out = Vec::new();
        let rows = f.ledger.export_history_csv(&alice, &mut out).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,date,kind,amount");
        assert!(lines[1].ends_with(",deposit,25"));
        assert!(lines[2].ends_with(",withdrawal,-5"));
    }
}

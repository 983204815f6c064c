//! Per-account mutual exclusion
//!
//! Every read-modify-write of an account (counters, lock flag, balance)
//! happens while holding that account's lock. Transfers take both locks in
//! ascending account-number order, so two opposite transfers cannot deadlock.
//! Clearing or wiping the ledger waits for every account lock to be released.
//! An account's entry leaves the table once nobody holds or waits on it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{
    ArcMutexGuard, ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawMutex, RawRwLock, RwLock,
};

use crate::domain::AccountNumber;

type Table = Arc<Mutex<HashMap<AccountNumber, Arc<Mutex<()>>>>>;

/// Removes the entries of released accounts; must drop after the account guards
struct Release {
    table: Table,
    numbers: Vec<AccountNumber>,
}

impl Drop for Release {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        for number in &self.numbers {
            // Handles are only cloned under the table lock, so a count of one
            // means no other thread holds or is waiting for this account
            if table.get(number).is_some_and(|m| Arc::strong_count(m) == 1) {
                table.remove(number);
            }
        }
    }
}

/// Held while an account is being read and rewritten
pub struct AccountGuard {
    _account: ArcMutexGuard<RawMutex, ()>,
    _shared: ArcRwLockReadGuard<RawRwLock, ()>,
    _release: Release,
}

/// Both guards of a two-account operation
pub struct PairGuard {
    _first: ArcMutexGuard<RawMutex, ()>,
    _second: Option<ArcMutexGuard<RawMutex, ()>>,
    _shared: ArcRwLockReadGuard<RawRwLock, ()>,
    _release: Release,
}

/// Held by ledger-wide maintenance; excludes every account operation
pub type ExclusiveGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

/// Held by operations that touch no existing account but must not overlap a clear or wipe
pub type SharedGuard = ArcRwLockReadGuard<RawRwLock, ()>;

/// Lock table shared by the authentication gate, the ledger and the admin authority
#[derive(Default)]
pub struct AccountLocks {
    table: Table,
    maintenance: Arc<RwLock<()>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, number: AccountNumber) -> Arc<Mutex<()>> {
        Arc::clone(self.table.lock().entry(number).or_default())
    }

    fn release(&self, numbers: Vec<AccountNumber>) -> Release {
        Release {
            table: Arc::clone(&self.table),
            numbers,
        }
    }

    /// Block until `number` is free and hold it until the guard drops
    pub fn lock(&self, number: AccountNumber) -> AccountGuard {
        let shared = self.shared();
        AccountGuard {
            _account: self.handle(number).lock_arc(),
            _shared: shared,
            _release: self.release(vec![number]),
        }
    }

    /// Lock two accounts in ascending order; a self pair takes one lock
    pub fn lock_pair(&self, a: AccountNumber, b: AccountNumber) -> PairGuard {
        let shared = self.shared();
        if a == b {
            return PairGuard {
                _first: self.handle(a).lock_arc(),
                _second: None,
                _shared: shared,
                _release: self.release(vec![a]),
            };
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let first = self.handle(low).lock_arc();
        let second = self.handle(high).lock_arc();
        PairGuard {
            _first: first,
            _second: Some(second),
            _shared: shared,
            _release: self.release(vec![low, high]),
        }
    }

    pub fn shared(&self) -> SharedGuard {
        self.maintenance.read_arc()
    }

    /// Wait for all account operations to finish and keep new ones out
    pub fn exclusive(&self) -> ExclusiveGuard {
        self.maintenance.write_arc()
    }
}

//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};

use crate::domain::result::Error;
use crate::domain::{Account, AccountNumber, Transaction, TransactionKind};
use crate::migrations::LEDGER_MIGRATION;
use crate::ports::{ChangeSet, Repository};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const ACCOUNT_COLUMNS: &str = "account_number, name, balance, total_deposited, total_withdrawn,
    total_transferred, password_attempts, code_attempts, is_locked, two_factor_enabled,
    otp_secret, password_hash, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "transaction_id, account_number, kind, amount, created_at";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Check if an error comes from touching the ledger schema after a wipe
fn is_missing_ledger_schema(err_msg: &str) -> bool {
    err_msg.contains("does not exist")
        && (err_msg.contains("sys_accounts")
            || err_msg.contains("sys_transactions")
            || err_msg.contains("seq_transaction_id"))
}

/// Map an adapter failure onto the port's error type
fn storage<T>(result: Result<T>) -> crate::Result<T> {
    result.map_err(|e| {
        let msg = format!("{:#}", e);
        if is_missing_ledger_schema(&msg) {
            Error::Uninitialized
        } else {
            Error::storage(msg)
        }
    })
}

/// DuckDB repository implementation
///
/// One connection behind a mutex; every changeset runs inside a single
/// DuckDB transaction so it lands completely or not at all.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff on file locking errors, which show up
    /// when another process is closing the same file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[vaultbank] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// Open a throwaway in-memory database
    pub fn in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run pending migrations and report what was applied
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.connection()?;
        MigrationService::new(&conn).run_pending()
    }

    // === Account operations ===

    fn load_account(&self, number: AccountNumber) -> Result<Option<Account>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_accounts WHERE account_number = ?",
            ACCOUNT_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![number], row_to_account)?;
        Ok(rows.next().transpose()?)
    }

    fn load_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_accounts ORDER BY account_number",
            ACCOUNT_COLUMNS
        ))?;
        let accounts = stmt
            .query_map([], row_to_account)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    fn max_account_number(&self) -> Result<AccountNumber> {
        let conn = self.connection()?;
        // Ledger entries of deleted accounts keep their number reserved
        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(account_number), 0) FROM (
                 SELECT account_number FROM sys_accounts
                 UNION ALL
                 SELECT account_number FROM sys_transactions
             )",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn remove_account(&self, number: AccountNumber) -> Result<bool> {
        let conn = self.connection()?;
        let removed = conn.execute(
            "DELETE FROM sys_accounts WHERE account_number = ?",
            params![number],
        )?;
        Ok(removed > 0)
    }

    // === Ledger operations ===

    fn load_transactions(&self, number: AccountNumber) -> Result<Vec<Transaction>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_transactions WHERE account_number = ? ORDER BY transaction_id",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map(params![number], row_to_transaction)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(transactions)
    }

    fn load_orphans(&self) -> Result<Vec<AccountNumber>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT t.account_number
             FROM sys_transactions t
             LEFT JOIN sys_accounts a ON a.account_number = t.account_number
             WHERE a.account_number IS NULL
             ORDER BY t.account_number",
        )?;
        let numbers = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(numbers)
    }

    fn write_changes(&self, changes: &ChangeSet) -> Result<Vec<Transaction>> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        for account in &changes.accounts {
            upsert_account(&tx, account)?;
        }

        let mut written = Vec::with_capacity(changes.transactions.len());
        for entry in &changes.transactions {
            let id: i64 =
                tx.query_row("SELECT nextval('seq_transaction_id')", [], |row| row.get(0))?;
            tx.execute(
                "INSERT INTO sys_transactions (transaction_id, account_number, kind, amount, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    id,
                    entry.account,
                    entry.kind.as_str(),
                    entry.amount,
                    entry.created_at.to_rfc3339(),
                ],
            )?;
            written.push(entry.clone().with_id(id));
        }

        tx.commit()?;
        Ok(written)
    }

    // === Admin secret ===

    fn load_admin_secret(&self) -> Result<Option<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT password_hash FROM sys_admin WHERE singleton = 1")?;
        let mut rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.next().transpose()?)
    }

    fn store_admin_secret(&self, digest: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO sys_admin (singleton, password_hash, updated_at) VALUES (1, ?, ?)
             ON CONFLICT (singleton) DO UPDATE SET
                password_hash = EXCLUDED.password_hash,
                updated_at = EXCLUDED.updated_at",
            params![digest, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove_admin_secret(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM sys_admin", [])?;
        Ok(())
    }

    // === Maintenance ===

    fn truncate_ledger(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM sys_transactions", [])?;
        tx.execute("DELETE FROM sys_accounts", [])?;
        tx.commit()?;
        Ok(())
    }

    fn drop_ledger(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DROP TABLE IF EXISTS sys_transactions;
             DROP TABLE IF EXISTS sys_accounts;
             DROP SEQUENCE IF EXISTS seq_transaction_id;",
        )?;
        MigrationService::new(&tx).forget(LEDGER_MIGRATION)?;
        tx.commit()?;
        Ok(())
    }
}

impl Repository for DuckDbRepository {
    fn ensure_schema(&self) -> crate::Result<()> {
        storage(self.run_migrations().map(|_| ()))
    }

    fn next_account_id(&self) -> crate::Result<AccountNumber> {
        storage(self.max_account_number()).map(|max| max + 1)
    }

    fn get_account(&self, number: AccountNumber) -> crate::Result<Option<Account>> {
        storage(self.load_account(number))
    }

    fn list_accounts(&self) -> crate::Result<Vec<Account>> {
        storage(self.load_accounts())
    }

    fn delete_account(&self, number: AccountNumber) -> crate::Result<bool> {
        storage(self.remove_account(number))
    }

    fn list_transactions(&self, number: AccountNumber) -> crate::Result<Vec<Transaction>> {
        storage(self.load_transactions(number))
    }

    fn orphaned_account_numbers(&self) -> crate::Result<Vec<AccountNumber>> {
        storage(self.load_orphans())
    }

    fn commit(&self, changes: &ChangeSet) -> crate::Result<Vec<Transaction>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        storage(self.write_changes(changes))
    }

    fn get_admin_secret(&self) -> crate::Result<Option<String>> {
        storage(self.load_admin_secret())
    }

    fn put_admin_secret(&self, digest: &str) -> crate::Result<()> {
        storage(self.store_admin_secret(digest))
    }

    fn delete_admin_secret(&self) -> crate::Result<()> {
        storage(self.remove_admin_secret())
    }

    fn clear_all(&self) -> crate::Result<()> {
        storage(self.truncate_ledger())
    }

    fn wipe_all(&self) -> crate::Result<()> {
        storage(self.drop_ledger())
    }
}

fn upsert_account(conn: &Connection, account: &Account) -> Result<()> {
    conn.execute(
        "INSERT INTO sys_accounts (account_number, name, balance, total_deposited, total_withdrawn,
                                   total_transferred, password_attempts, code_attempts, is_locked,
                                   two_factor_enabled, otp_secret, password_hash, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (account_number) DO UPDATE SET
            name = EXCLUDED.name,
            balance = EXCLUDED.balance,
            total_deposited = EXCLUDED.total_deposited,
            total_withdrawn = EXCLUDED.total_withdrawn,
            total_transferred = EXCLUDED.total_transferred,
            password_attempts = EXCLUDED.password_attempts,
            code_attempts = EXCLUDED.code_attempts,
            is_locked = EXCLUDED.is_locked,
            two_factor_enabled = EXCLUDED.two_factor_enabled,
            otp_secret = EXCLUDED.otp_secret,
            password_hash = EXCLUDED.password_hash,
            updated_at = EXCLUDED.updated_at",
        params![
            account.number,
            account.name,
            account.balance,
            account.total_deposited,
            account.total_withdrawn,
            account.total_transferred,
            account.password_attempts as i64,
            account.code_attempts as i64,
            account.is_locked,
            account.two_factor_enabled,
            account.otp_secret,
            account.password_hash,
            account.created_at.to_rfc3339(),
            account.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn row_to_account(row: &duckdb::Row) -> duckdb::Result<Account> {
    let created: String = row.get(12)?;
    let updated: String = row.get(13)?;
    Ok(Account {
        number: row.get(0)?,
        name: row.get(1)?,
        balance: row.get(2)?,
        total_deposited: row.get(3)?,
        total_withdrawn: row.get(4)?,
        total_transferred: row.get(5)?,
        password_attempts: to_counter(row.get(6)?),
        code_attempts: to_counter(row.get(7)?),
        is_locked: row.get(8)?,
        two_factor_enabled: row.get(9)?,
        otp_secret: row.get(10)?,
        password_hash: row.get(11)?,
        created_at: parse_timestamp(12, &created)?,
        updated_at: parse_timestamp(13, &updated)?,
    })
}

fn row_to_transaction(row: &duckdb::Row) -> duckdb::Result<Transaction> {
    let kind: String = row.get(2)?;
    let created: String = row.get(4)?;
    Ok(Transaction {
        id: row.get(0)?,
        account: row.get(1)?,
        kind: kind.parse::<TransactionKind>().map_err(|e| {
            duckdb::Error::FromSqlConversionFailure(2, duckdb::types::Type::Text, e.into())
        })?,
        amount: row.get(3)?,
        created_at: parse_timestamp(4, &created)?,
    })
}

fn to_counter(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

// Helper functions

/// Stored timestamps identify account records, so a bad one is an error rather than "now"
fn parse_timestamp(column: usize, s: &str) -> duckdb::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(column, duckdb::types::Type::Text, e.into()))
}

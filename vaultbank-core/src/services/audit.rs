//! Audit log - structured security event logging to DuckDB
//!
//! Events are stored in audit.duckdb next to the ledger database so they
//! survive a ledger wipe. Passwords, one-time codes, authenticator secrets
//! and balances are never logged; an entry names the event, who caused it
//! and which account it concerns.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::Utc;
use duckdb::Connection;
use serde::{Deserialize, Serialize};

use crate::domain::AccountNumber;
use crate::log_migrations::LOG_MIGRATIONS;
use crate::services::MigrationService;

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    let timestamp = now_ms().max(0) as u64;

    // Lower 16 bits hold the counter (65536 unique IDs per millisecond)
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

/// Get current unix timestamp in milliseconds
fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Who caused an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Customer,
    Admin,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Customer => "customer",
            Actor::Admin => "admin",
            Actor::System => "system",
        }
    }
}

/// An audit event to be recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event: String,
    pub actor: Actor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<AccountNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditEvent {
    /// Create a customer event with just a name
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            actor: Actor::Customer,
            account_number: None,
            detail: None,
            error_message: None,
        }
    }

    /// Create an event caused by the administrator
    pub fn admin(event: impl Into<String>) -> Self {
        Self::new(event).by(Actor::Admin)
    }

    pub fn by(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    /// Set the account the event concerns
    pub fn for_account(mut self, number: AccountNumber) -> Self {
        self.account_number = Some(number);
        self
    }

    /// Free-form detail (never a secret)
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set error information
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// An audit entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: i64,
    pub actor: String,
    pub event: String,
    pub account_number: Option<AccountNumber>,
    pub detail: Option<String>,
    pub error_message: Option<String>,
}

const ENTRY_COLUMNS: &str = "id, timestamp, actor, event, account_number, detail, error_message";

fn row_to_entry(row: &duckdb::Row) -> duckdb::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        actor: row.get(2)?,
        event: row.get(3)?,
        account_number: row.get(4)?,
        detail: row.get(5)?,
        error_message: row.get(6)?,
    })
}

/// Service for audit logging
///
/// Manages the audit.duckdb database and provides methods for recording
/// events and querying the history.
pub struct AuditLog {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl AuditLog {
    /// Open or create audit.duckdb in the data directory and run any
    /// pending migrations.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("audit.duckdb");
        let conn = Connection::open(&db_path)?;
        Self::init(conn, Some(db_path))
    }

    /// Audit log that lives only as long as the process
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        MigrationService::with_migrations(&conn, LOG_MIGRATIONS).run_pending()?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    /// Record an event
    pub fn record(&self, event: AuditEvent) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO sys_audit (id, timestamp, actor, event, account_number, detail, error_message)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            duckdb::params![
                generate_id(),
                now_ms(),
                event.actor.as_str(),
                &event.event,
                &event.account_number,
                &event.detail,
                &event.error_message,
            ],
        )?;
        Ok(())
    }

    /// Most recent entries first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_audit ORDER BY timestamp DESC, id DESC LIMIT ?",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map([limit as i64], row_to_entry)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Most recent entries concerning one account
    pub fn for_account(&self, number: AccountNumber, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_audit WHERE account_number = ?
             ORDER BY timestamp DESC, id DESC LIMIT ?",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map([number, limit as i64], row_to_entry)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Number of entries per event name, most frequent first
    pub fn counts_by_event(&self) -> Result<Vec<(String, u64)>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT event, COUNT(*) FROM sys_audit GROUP BY event ORDER BY 2 DESC, 1",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Get the total number of entries
    pub fn count(&self) -> Result<u64> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sys_audit", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete entries older than the specified timestamp (unix ms)
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.connection()?;
        let deleted = conn.execute("DELETE FROM sys_audit WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    /// Path to the audit database, `None` when in memory
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

/// Fire-and-forget handle the services record through
///
/// A failing audit write never fails the operation that caused it; the
/// problem is reported on stderr instead.
#[derive(Clone, Default)]
pub struct AuditTrail(Option<Arc<AuditLog>>);

impl AuditTrail {
    pub fn new(log: Arc<AuditLog>) -> Self {
        Self(Some(log))
    }

    /// Trail that records nothing
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn record(&self, event: AuditEvent) {
        if let Some(log) = &self.0 {
            if let Err(e) = log.record(event) {
                eprintln!("[vaultbank] Failed to write audit entry: {}", e);
            }
        }
    }

    pub fn log(&self) -> Option<&Arc<AuditLog>> {
        self.0.as_ref()
    }
}

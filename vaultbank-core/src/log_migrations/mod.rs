//! Audit log migrations - embedded SQL files
//!
//! Kept apart from the ledger migrations: the audit log lives in its own
//! database file and survives a ledger wipe.

/// All audit log migrations, embedded at compile time.
/// Format: (filename, sql_content)
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_audit_log.sql", include_str!("001_audit_log.sql")),
];

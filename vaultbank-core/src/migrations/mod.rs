//! Database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary at build time using include_str!.
//! Each migration is a tuple of (name, sql_content).
//! Migrations are applied in order.

/// The migration that creates accounts and the ledger.
/// A wipe drops its tables and forgets it was applied.
pub const LEDGER_MIGRATION: &str = "002_ledger_schema.sql";

/// All migrations, embedded at compile time.
/// Format: (filename, sql_content)
///
/// When adding a new migration create `NNN_description.sql` and add it here in order.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_admin_secret.sql", include_str!("001_admin_secret.sql")),
    (LEDGER_MIGRATION, include_str!("002_ledger_schema.sql")),
];

//! VaultBank Core - account authentication and ledger logic
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, Transaction, Session, etc.)
//! - **ports**: Trait definitions for external dependencies (Repository, CredentialHasher, OneTimeCodes)
//! - **services**: Business logic orchestration (authentication, ledger, admin, audit)
//! - **adapters**: Concrete implementations (DuckDB, in-memory, Argon2, TOTP)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;

use adapters::{Argon2Credentials, DuckDbRepository, MemoryRepository, Sha256Credentials, TotpCodes};
use config::{Config, CredentialScheme};
use ports::{CredentialHasher, OneTimeCodes, Repository};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result};
pub use domain::{
    Account, AccountNumber, AccountView, AdminSession, Enrollment, Login, Session, Transaction,
    TransactionKind,
};
pub use services::{AuditEntry, AuditEvent, AuditLog, DoctorResult, Reconciliation};

/// Name of the ledger database inside the data directory
pub const DATABASE_FILE: &str = "vaultbank.duckdb";

/// Name of the lock file that keeps a second process out
pub const LOCK_FILE: &str = "vaultbank.lock";

/// Main context for VaultBank operations
///
/// Holds the configuration, the repository, and the three services that
/// share one account lock table.
pub struct VaultBank {
    pub config: Config,
    pub repository: Arc<dyn Repository>,
    pub auth: AuthService,
    pub ledger: LedgerService,
    pub admin: AdminService,
    pub audit: AuditTrail,
    data_dir: Option<PathBuf>,
    // Holds the exclusive lock until dropped
    _lock_file: Option<File>,
}

impl VaultBank {
    /// Open the bank stored in `data_dir`, creating it if needed
    ///
    /// Fails fast with a configuration error when another process holds the
    /// directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let lock_path = data_dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(|_| {
            Error::config(format!(
                "{} is in use by another VaultBank process",
                data_dir.display()
            ))
        })?;

        let config = Config::load(data_dir)?;
        let repository = DuckDbRepository::new(&data_dir.join(DATABASE_FILE))
            .map_err(|e| Error::storage(format!("{:#}", e)))?;

        // A broken audit log must not keep the bank closed
        let audit = match AuditLog::new(data_dir) {
            Ok(log) => AuditTrail::new(Arc::new(log)),
            Err(e) => {
                eprintln!("[vaultbank] Audit log unavailable: {:#}", e);
                AuditTrail::disabled()
            }
        };

        let mut bank = Self::with_parts(config, Arc::new(repository), audit)?;
        bank.data_dir = Some(data_dir.to_path_buf());
        bank._lock_file = Some(lock_file);
        Ok(bank)
    }

    /// A bank that lives only in memory
    pub fn ephemeral(config: Config) -> Result<Self> {
        let audit = AuditLog::in_memory()
            .map(|log| AuditTrail::new(Arc::new(log)))
            .map_err(|e| Error::storage(format!("{:#}", e)))?;
        Self::with_parts(config, Arc::new(MemoryRepository::new()), audit)
    }

    /// Wire the services over an existing repository and run its migrations
    pub fn with_parts(config: Config, repository: Arc<dyn Repository>, audit: AuditTrail) -> Result<Self> {
        repository.ensure_schema()?;

        let credentials = credentials_for(config.credential_scheme);
        let codes: Arc<dyn OneTimeCodes> = Arc::new(TotpCodes::new(
            config.two_factor.issuer.clone(),
            config.two_factor.digits,
            config.two_factor.step_seconds,
            config.two_factor.skew_steps,
        ));
        let locks = Arc::new(AccountLocks::new());
        let max_attempts = config.max_attempts;

        let auth = AuthService::new(
            Arc::clone(&repository),
            Arc::clone(&credentials),
            codes,
            Arc::clone(&locks),
            audit.clone(),
            max_attempts,
        );
        let ledger = LedgerService::new(Arc::clone(&repository), Arc::clone(&locks), max_attempts);
        let admin = AdminService::new(
            Arc::clone(&repository),
            credentials,
            locks,
            audit.clone(),
            max_attempts,
        );

        Ok(Self {
            config,
            repository,
            auth,
            ledger,
            admin,
            audit,
            data_dir: None,
            _lock_file: None,
        })
    }

    /// Data directory, `None` for ephemeral banks
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }
}

/// Credential adapter for a configured scheme
pub fn credentials_for(scheme: CredentialScheme) -> Arc<dyn CredentialHasher> {
    match scheme {
        CredentialScheme::Argon2id => Arc::new(Argon2Credentials::new()),
        CredentialScheme::Sha256 => Arc::new(Sha256Credentials::new()),
    }
}

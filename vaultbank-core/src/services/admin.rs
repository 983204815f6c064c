//! Admin service - the admin secret and account lifecycle
//!
//! Authorization never counts attempts. Every privileged operation takes an
//! [`AdminSession`], which is checked against the stored secret on each call.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountNumber, AccountView, AdminSession};
use crate::ports::{CredentialHasher, Repository};
use crate::services::audit::{AuditEvent, AuditTrail};
use crate::services::doctor::{DoctorResult, DoctorService};
use crate::services::locks::AccountLocks;

/// Admin authority and self-service account creation
pub struct AdminService {
    repository: Arc<dyn Repository>,
    credentials: Arc<dyn CredentialHasher>,
    locks: Arc<AccountLocks>,
    audit: AuditTrail,
    doctor: DoctorService,
    max_attempts: u32,
    /// Serializes reads and writes of the admin secret
    secret: Mutex<()>,
    /// Serializes number assignment
    numbering: Mutex<()>,
}

fn require(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::MissingCredential);
    }
    Ok(())
}

impl AdminService {
    pub fn new(
        repository: Arc<dyn Repository>,
        credentials: Arc<dyn CredentialHasher>,
        locks: Arc<AccountLocks>,
        audit: AuditTrail,
        max_attempts: u32,
    ) -> Self {
        Self {
            doctor: DoctorService::new(Arc::clone(&repository), max_attempts),
            repository,
            credentials,
            locks,
            audit,
            max_attempts,
            secret: Mutex::new(()),
            numbering: Mutex::new(()),
        }
    }

    // === Admin secret ===

    /// Whether an admin secret has been set
    pub fn has_secret(&self) -> Result<bool> {
        Ok(self.repository.get_admin_secret()?.is_some())
    }

    /// Set the first admin secret
    pub fn bootstrap(&self, secret: &str) -> Result<()> {
        require(secret)?;
        let _guard = self.secret.lock();
        if self.repository.get_admin_secret()?.is_some() {
            return Err(Error::AdminExists);
        }
        let digest = self.credentials.hash(secret)?;
        self.repository.put_admin_secret(&digest)?;
        self.audit.record(AuditEvent::admin("admin_secret_changed").with_detail("bootstrap"));
        Ok(())
    }

    /// Check a candidate secret; false when no secret is set
    pub fn authorize(&self, candidate: &str) -> Result<bool> {
        let _guard = self.secret.lock();
        Ok(self.stored_digest_matching(candidate)?.is_some())
    }

    /// Exchange the admin secret for a session handle
    pub fn elevate(&self, candidate: &str) -> Result<AdminSession> {
        let _guard = self.secret.lock();
        match self.stored_digest_matching(candidate)? {
            Some(digest) => Ok(AdminSession::new(digest)),
            None => {
                self.audit.record(AuditEvent::admin("admin_unauthorized").with_detail("login"));
                Err(Error::Unauthorized)
            }
        }
    }

    fn stored_digest_matching(&self, candidate: &str) -> Result<Option<String>> {
        Ok(self
            .repository
            .get_admin_secret()?
            .filter(|digest| self.credentials.matches(digest, candidate)))
    }

    /// Reject handles issued for a secret that has since changed or been removed
    fn check(&self, admin: &AdminSession, operation: &str) -> Result<()> {
        let _guard = self.secret.lock();
        match self.repository.get_admin_secret()? {
            Some(digest) if digest == admin.digest() => Ok(()),
            _ => {
                self.audit.record(AuditEvent::admin("admin_unauthorized").with_detail(operation));
                Err(Error::Unauthorized)
            }
        }
    }

    pub fn change_secret(&self, current: &str, new_secret: &str) -> Result<()> {
        require(new_secret)?;
        let _guard = self.secret.lock();
        if self.stored_digest_matching(current)?.is_none() {
            self.audit.record(AuditEvent::admin("admin_unauthorized").with_detail("change_secret"));
            return Err(Error::Unauthorized);
        }
        let digest = self.credentials.hash(new_secret)?;
        self.repository.put_admin_secret(&digest)?;
        self.audit.record(AuditEvent::admin("admin_secret_changed"));
        Ok(())
    }

    /// Remove the secret; no admin operation is possible until a new bootstrap
    pub fn remove_secret(&self, current: &str) -> Result<()> {
        let _guard = self.secret.lock();
        if self.stored_digest_matching(current)?.is_none() {
            self.audit.record(AuditEvent::admin("admin_unauthorized").with_detail("remove_secret"));
            return Err(Error::Unauthorized);
        }
        self.repository.delete_admin_secret()?;
        self.audit.record(AuditEvent::admin("admin_secret_removed"));
        Ok(())
    }

    // === Accounts ===

    fn load(&self, number: AccountNumber) -> Result<Account> {
        self.repository
            .get_account(number)?
            .ok_or(Error::AccountNotFound(number))
    }

    /// Open a new account with zero balance under the next free number
    pub fn create_account(&self, name: &str, password: &str) -> Result<AccountView> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("account name cannot be empty"));
        }
        require(password)?;
        let digest = self.credentials.hash(password)?;

        let _shared = self.locks.shared();
        let _guard = self.numbering.lock();
        let number = self.repository.next_account_id()?;
        let account = Account::new(number, name, digest);
        account.validate().map_err(Error::validation)?;
        self.repository.put_account(&account)?;

        self.audit.record(AuditEvent::new("account_created").for_account(number));
        Ok(account.view(self.max_attempts))
    }

    /// All accounts with their computed lock status
    pub fn list_accounts(&self, admin: &AdminSession) -> Result<Vec<AccountView>> {
        self.check(admin, "list")?;
        Ok(self
            .repository
            .list_accounts()?
            .iter()
            .map(|a| a.view(self.max_attempts))
            .collect())
    }

    /// Show an account after checking the holder's password; counters are not touched
    pub fn inspect(&self, admin: &AdminSession, number: AccountNumber, password: &str) -> Result<AccountView> {
        self.check(admin, "inspect")?;
        let account = self.load(number)?;
        if !self.credentials.matches(&account.password_hash, password) {
            return Err(Error::IncorrectPassword { remaining: None });
        }
        Ok(account.view(self.max_attempts))
    }

    /// Set the lock flag regardless of counters
    pub fn lock(&self, admin: &AdminSession, number: AccountNumber) -> Result<AccountView> {
        self.check(admin, "lock")?;
        let _guard = self.locks.lock(number);
        let account = self.load(number)?;

        let mut updated = account.clone();
        updated.is_locked = true;
        updated.touch();
        self.repository.put_account(&updated)?;

        self.audit.record(AuditEvent::admin("account_locked_by_admin").for_account(number));
        Ok(updated.view(self.max_attempts))
    }

    /// Clear the lock and both counters and install a new password, in one write
    pub fn unlock(&self, admin: &AdminSession, number: AccountNumber, new_password: &str) -> Result<AccountView> {
        self.check(admin, "unlock")?;
        require(new_password)?;
        let digest = self.credentials.hash(new_password)?;

        let _guard = self.locks.lock(number);
        let account = self.load(number)?;

        let mut updated = account.clone();
        updated.is_locked = false;
        updated.password_attempts = 0;
        updated.code_attempts = 0;
        updated.password_hash = digest;
        updated.touch();
        self.repository.put_account(&updated)?;

        self.audit.record(AuditEvent::admin("account_unlocked").for_account(number));
        Ok(updated.view(self.max_attempts))
    }

    /// Delete an account after checking its own password; its ledger entries stay
    pub fn delete_account(&self, admin: &AdminSession, number: AccountNumber, password: &str) -> Result<()> {
        self.check(admin, "delete")?;
        let _guard = self.locks.lock(number);
        let account = self.load(number)?;
        if !self.credentials.matches(&account.password_hash, password) {
            return Err(Error::IncorrectPassword { remaining: None });
        }
        if !self.repository.delete_account(number)? {
            return Err(Error::AccountNotFound(number));
        }
        self.audit.record(AuditEvent::admin("account_deleted").for_account(number));
        Ok(())
    }

    // === Maintenance ===

    /// Remove every account and ledger entry; the schema and admin secret stay
    pub fn clear_all(&self, admin: &AdminSession) -> Result<()> {
        self.check(admin, "clear")?;
        let _all = self.locks.exclusive();
        self.repository.clear_all()?;
        self.audit.record(AuditEvent::admin("ledger_cleared"));
        Ok(())
    }

    /// Drop the ledger schema; account operations fail until `reinitialize`
    pub fn wipe_all(&self, admin: &AdminSession) -> Result<()> {
        self.check(admin, "wipe")?;
        let _all = self.locks.exclusive();
        self.repository.wipe_all()?;
        self.audit.record(AuditEvent::admin("ledger_wiped"));
        Ok(())
    }

    /// Recreate the ledger schema after a wipe; a no-op otherwise
    pub fn reinitialize(&self, admin: &AdminSession) -> Result<()> {
        self.check(admin, "reinitialize")?;
        let _all = self.locks.exclusive();
        self.repository.ensure_schema()
    }

    /// Run the ledger health checks
    pub fn diagnose(&self, admin: &AdminSession) -> Result<DoctorResult> {
        self.check(admin, "diagnose")?;
        let _all = self.locks.exclusive();
        self.doctor.run_checks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryRepository, Sha256Credentials};

    fn service() -> (Arc<MemoryRepository>, AdminService) {
        let repo = Arc::new(MemoryRepository::new());
        let admin = AdminService::new(
            repo.clone(),
            Arc::new(Sha256Credentials::new()),
            Arc::new(AccountLocks::new()),
            AuditTrail::disabled(),
            3,
        );
        (repo, admin)
    }

    fn elevated() -> (Arc<MemoryRepository>, AdminService, AdminSession) {
        let (repo, admin) = service();
        admin.bootstrap("root").unwrap();
        let session = admin.elevate("root").unwrap();
        (repo, admin, session)
    }

    #[test]
    fn test_bootstrap_only_once() {
        let (_, admin) = service();
        assert!(!admin.has_secret().unwrap());
        assert!(!admin.authorize("root").unwrap());
        admin.bootstrap("root").unwrap();
        assert!(matches!(admin.bootstrap("other"), Err(Error::AdminExists)));
        assert!(admin.authorize("root").unwrap());
        assert!(!admin.authorize("other").unwrap());
    }

    #[test]
    fn test_blank_secrets_rejected() {
        let (_, admin) = service();
        assert!(matches!(admin.bootstrap("  "), Err(Error::MissingCredential)));
        admin.bootstrap("root").unwrap();
        assert!(matches!(admin.change_secret("root", ""), Err(Error::MissingCredential)));
    }

    #[test]
    fn test_authorize_never_counts() {
        let (_, admin) = service();
        admin.bootstrap("root").unwrap();
        for _ in 0..10 {
            assert!(matches!(admin.elevate("nope"), Err(Error::Unauthorized)));
        }
        assert!(admin.elevate("root").is_ok());
    }

    #[test]
    fn test_session_revoked_by_secret_change() {
        let (_, admin, session) = elevated();
        admin.change_secret("root", "new-root").unwrap();
        assert!(matches!(admin.list_accounts(&session), Err(Error::Unauthorized)));

        let fresh = admin.elevate("new-root").unwrap();
        assert!(admin.list_accounts(&fresh).is_ok());

        admin.remove_secret("new-root").unwrap();
        assert!(matches!(admin.list_accounts(&fresh), Err(Error::Unauthorized)));
        assert!(!admin.has_secret().unwrap());
    }

    #[test]
    fn test_change_requires_current_secret() {
        let (_, admin, _) = elevated();
        assert!(matches!(admin.change_secret("wrong", "x"), Err(Error::Unauthorized)));
        assert!(matches!(admin.remove_secret("wrong"), Err(Error::Unauthorized)));
        assert!(admin.authorize("root").unwrap());
    }

    #[test]
    fn test_accounts_numbered_from_one() {
        let (_, admin) = service();
        assert_eq!(admin.create_account("Alice", "a").unwrap().number, 1);
        assert_eq!(admin.create_account("Bob", "b").unwrap().number, 2);
        assert!(matches!(admin.create_account(" ", "c"), Err(Error::Validation(_))));
        assert!(matches!(admin.create_account("Carol", ""), Err(Error::MissingCredential)));
    }

    #[test]
    fn test_lock_and_unlock() {
        let (repo, admin, session) = elevated();
        admin.create_account("Alice", "old").unwrap();
        let mut account = repo.get_account(1).unwrap().unwrap();
        account.password_attempts = 2;
        account.code_attempts = 3;
        repo.put_account(&account).unwrap();

        assert!(admin.lock(&session, 1).unwrap().locked);
        assert!(matches!(admin.unlock(&session, 1, "   "), Err(Error::MissingCredential)));
        assert!(repo.get_account(1).unwrap().unwrap().is_locked);

        let view = admin.unlock(&session, 1, "new").unwrap();
        assert!(!view.locked);
        let account = repo.get_account(1).unwrap().unwrap();
        assert_eq!((account.password_attempts, account.code_attempts), (0, 0));
        assert!(admin.inspect(&session, 1, "new").is_ok());
        assert!(matches!(
            admin.inspect(&session, 1, "old"),
            Err(Error::IncorrectPassword { remaining: None })
        ));
    }

    #[test]
    fn test_delete_requires_account_password() {
        let (repo, admin, session) = elevated();
        admin.create_account("Alice", "pw").unwrap();
        assert!(matches!(
            admin.delete_account(&session, 1, "nope"),
            Err(Error::IncorrectPassword { remaining: None })
        ));
        assert_eq!(repo.get_account(1).unwrap().unwrap().password_attempts, 0);

        admin.delete_account(&session, 1, "pw").unwrap();
        assert!(matches!(admin.delete_account(&session, 1, "pw"), Err(Error::AccountNotFound(1))));
    }

    #[test]
    fn test_wipe_then_reinitialize() {
        let (_, admin, session) = elevated();
        admin.create_account("Alice", "pw").unwrap();
        admin.create_account("Bob", "pw").unwrap();

        admin.wipe_all(&session).unwrap();
        assert!(matches!(admin.create_account("Carol", "pw"), Err(Error::Uninitialized)));
        assert!(matches!(admin.list_accounts(&session), Err(Error::Uninitialized)));

        admin.reinitialize(&session).unwrap();
        assert_eq!(admin.create_account("Carol", "pw").unwrap().number, 1);
    }

    #[test]
    fn test_clear_keeps_secret() {
        let (_, admin, session) = elevated();
        admin.create_account("Alice", "pw").unwrap();
        admin.clear_all(&session).unwrap();
        assert!(admin.list_accounts(&session).unwrap().is_empty());
        assert!(admin.authorize("root").unwrap());
        assert!(admin.diagnose(&session).unwrap().is_healthy());
    }
}

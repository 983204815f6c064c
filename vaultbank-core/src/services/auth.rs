//! Authentication service - credential checks, attempt counters and lockout
//!
//! Password and one-time-code failures are counted separately. Reaching the
//! threshold on either counter locks the account in the same write that
//! records the failure; only the admin `unlock` clears it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountNumber, AccountView, Enrollment, Login, Session};
use crate::ports::{CredentialHasher, OneTimeCodes, Repository};
use crate::services::audit::{AuditEvent, AuditTrail};
use crate::services::locks::AccountLocks;

/// A password check that still owes a one-time code
///
/// Stamped with the record and credential it was earned against: a challenge
/// survives neither a credential rotation nor the account being replaced.
struct Challenge {
    account_created_at: DateTime<Utc>,
    password_hash: String,
}

impl Challenge {
    fn new(account: &Account) -> Self {
        Self {
            account_created_at: account.created_at,
            password_hash: account.password_hash.clone(),
        }
    }

    fn is_for(&self, account: &Account) -> bool {
        self.account_created_at == account.created_at && self.password_hash == account.password_hash
    }
}

/// Authentication gate for account holders
pub struct AuthService {
    repository: Arc<dyn Repository>,
    credentials: Arc<dyn CredentialHasher>,
    codes: Arc<dyn OneTimeCodes>,
    locks: Arc<AccountLocks>,
    audit: AuditTrail,
    max_attempts: u32,
    /// Accounts whose password was accepted and that now owe a one-time code
    pending: Mutex<HashMap<AccountNumber, Challenge>>,
}

impl AuthService {
    pub fn new(
        repository: Arc<dyn Repository>,
        credentials: Arc<dyn CredentialHasher>,
        codes: Arc<dyn OneTimeCodes>,
        locks: Arc<AccountLocks>,
        audit: AuditTrail,
        max_attempts: u32,
    ) -> Self {
        Self {
            repository,
            credentials,
            codes,
            locks,
            audit,
            max_attempts,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn load(&self, number: AccountNumber) -> Result<Account> {
        self.repository
            .get_account(number)?
            .ok_or(Error::AccountNotFound(number))
    }

    /// Load the account a session was issued for; a reused number counts as missing
    fn load_session(&self, session: &Session) -> Result<Account> {
        let account = self.load(session.account())?;
        if !session.is_for(&account) {
            return Err(Error::AccountNotFound(session.account()));
        }
        Ok(account)
    }

    /// Check a password
    ///
    /// A locked account is rejected before the password is looked at. Any
    /// half-finished two-factor login for the account is discarded.
    pub fn authenticate(&self, number: AccountNumber, password: &str) -> Result<Login> {
        let _guard = self.locks.lock(number);
        self.pending.lock().remove(&number);

        let account = self.load(number)?;
        if account.is_locked_out(self.max_attempts) {
            self.audit.record(
                AuditEvent::new("login_failed")
                    .for_account(number)
                    .with_error(Error::AccountLocked.to_string()),
            );
            return Err(Error::AccountLocked);
        }

        if !self.credentials.matches(&account.password_hash, password) {
            let mut updated = account.clone();
            updated.password_attempts = account.password_attempts.saturating_add(1);
            let attempts = updated.password_attempts;
            return Err(self.record_failure(updated, attempts, "login_failed", |remaining| {
                Error::IncorrectPassword { remaining }
            }));
        }

        if account.password_attempts != 0 {
            let mut updated = account.clone();
            updated.password_attempts = 0;
            updated.touch();
            self.repository.put_account(&updated)?;
        }

        if account.two_factor_enabled {
            self.pending.lock().insert(number, Challenge::new(&account));
            return Ok(Login::CodeRequired(number));
        }

        self.audit.record(AuditEvent::new("login_succeeded").for_account(number));
        Ok(Login::Authenticated(Session::new(&account)))
    }

    /// Answer the second-factor challenge issued by `authenticate`
    pub fn submit_code(&self, number: AccountNumber, code: &str) -> Result<Session> {
        let _guard = self.locks.lock(number);
        if !self.pending.lock().contains_key(&number) {
            return Err(Error::NoPendingChallenge(number));
        }

        let account = match self.load(number) {
            Ok(account) => account,
            Err(e) => {
                self.pending.lock().remove(&number);
                return Err(e);
            }
        };
        let current = self
            .pending
            .lock()
            .get(&number)
            .map(|challenge| challenge.is_for(&account))
            .unwrap_or(false);
        if !current {
            self.pending.lock().remove(&number);
            return Err(Error::NoPendingChallenge(number));
        }
        if account.is_locked_out(self.max_attempts) {
            self.pending.lock().remove(&number);
            return Err(Error::AccountLocked);
        }

        let verified = account
            .otp_secret
            .as_deref()
            .map(|secret| self.codes.verify(secret, code))
            .unwrap_or(false);

        if !verified {
            let mut updated = account.clone();
            updated.code_attempts = account.code_attempts.saturating_add(1);
            let attempts = updated.code_attempts;
            let error = self.record_failure(updated, attempts, "code_failed", |remaining| {
                Error::IncorrectCode { remaining }
            });
            if matches!(error, Error::AccountLocked) {
                self.pending.lock().remove(&number);
            }
            return Err(error);
        }

        if account.code_attempts != 0 {
            let mut updated = account.clone();
            updated.code_attempts = 0;
            updated.touch();
            self.repository.put_account(&updated)?;
        }

        self.pending.lock().remove(&number);
        self.audit.record(
            AuditEvent::new("login_succeeded")
                .for_account(number)
                .with_detail("two-factor"),
        );
        Ok(Session::new(&account))
    }

    /// Persist a failed attempt, locking the account once `attempts` reaches the threshold
    ///
    /// Returns the error to hand back: a storage failure, `AccountLocked`,
    /// or the one built by `incorrect`.
    fn record_failure(
        &self,
        mut updated: Account,
        attempts: u32,
        event: &str,
        incorrect: impl FnOnce(Option<u32>) -> Error,
    ) -> Error {
        let locking = attempts >= self.max_attempts;
        if locking {
            updated.is_locked = true;
        }
        updated.touch();
        if let Err(e) = self.repository.put_account(&updated) {
            return e;
        }

        self.audit.record(AuditEvent::new(event).for_account(updated.number));
        if locking {
            self.audit.record(AuditEvent::new("account_locked").for_account(updated.number));
            return Error::AccountLocked;
        }
        incorrect(Some(self.max_attempts - attempts))
    }

    /// Fresh secret, the code it produces right now and an import URI
    pub fn begin_enrollment(&self, session: &Session) -> Result<Enrollment> {
        let account = self.load_session(session)?;
        if account.two_factor_enabled {
            return Err(Error::AlreadyEnabled);
        }
        let secret = self.codes.new_secret();
        let current_code = self.codes.current_code(&secret)?;
        let label = format!("{} #{}", account.name, account.number);
        Ok(Enrollment {
            provisioning_uri: self.codes.provisioning_uri(&secret, &label),
            current_code,
            secret,
        })
    }

    /// Turn on two-factor once the holder proves they can produce codes
    /// for `secret`. Calling it again on an enabled account changes nothing.
    pub fn enable_two_factor(&self, session: &Session, secret: &str, proof_code: &str) -> Result<()> {
        let number = session.account();
        let _guard = self.locks.lock(number);
        let account = self.load_session(session)?;

        if account.two_factor_enabled {
            return Err(Error::AlreadyEnabled);
        }
        if account.is_locked_out(self.max_attempts) {
            return Err(Error::AccountLocked);
        }
        if !self.codes.verify(secret, proof_code) {
            return Err(Error::ProofFailed);
        }

        let mut updated = account.clone();
        updated.two_factor_enabled = true;
        updated.otp_secret = Some(secret.to_string());
        updated.code_attempts = 0;
        updated.touch();
        self.repository.put_account(&updated)?;

        self.audit.record(AuditEvent::new("two_factor_enabled").for_account(number));
        Ok(())
    }

    /// End the session and return the account summary
    pub fn logout(&self, session: Session) -> Result<AccountView> {
        Ok(self.load_session(&session)?.view(self.max_attempts))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

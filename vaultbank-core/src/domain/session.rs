//! Session handles issued by the authentication gate and admin authority
//!
//! Neither handle can be built outside this crate, so holding one is proof
//! that the corresponding check passed. Both live in memory only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{Account, AccountNumber};

/// An authenticated account holder
///
/// Not `Clone`: ending the session with `logout` consumes it. Bound to the
/// account record it was issued for, so a number reused after a delete,
/// clear or wipe does not hand the new holder's account to an old session.
#[derive(Debug, PartialEq, Eq)]
pub struct Session {
    id: Uuid,
    account: AccountNumber,
    account_created_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(account: &Account) -> Self {
        Self {
            id: Uuid::new_v4(),
            account: account.number,
            account_created_at: account.created_at,
            started_at: Utc::now(),
        }
    }

    /// Whether `account` is the record this session was issued for
    pub(crate) fn is_for(&self, account: &Account) -> bool {
        self.account == account.number && self.account_created_at == account.created_at
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account(&self) -> AccountNumber {
        self.account
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Outcome of a successful password check
#[derive(Debug)]
pub enum Login {
    /// No second factor configured; the session is ready
    Authenticated(Session),
    /// Password accepted, a one-time code must follow via `submit_code`
    CodeRequired(AccountNumber),
}

impl Login {
    /// The session, if no second step is needed
    pub fn into_session(self) -> Option<Session> {
        match self {
            Login::Authenticated(session) => Some(session),
            Login::CodeRequired(_) => None,
        }
    }
}

/// Proof that the admin secret was presented
///
/// Bound to the digest current at authorization time: once the secret is
/// changed or removed the handle stops being accepted.
#[derive(Debug)]
pub struct AdminSession {
    digest: String,
    granted_at: DateTime<Utc>,
}

impl AdminSession {
    pub(crate) fn new(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            granted_at: Utc::now(),
        }
    }

    pub(crate) fn digest(&self) -> &str {
        &self.digest
    }

    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }
}

/// Material shown to the user while enrolling an authenticator
#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub secret: String,
    pub current_code: String,
    pub provisioning_uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_are_unique() {
        let account = Account::new(1, "Alice", "digest");
        let a = Session::new(&account);
        let b = Session::new(&account);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.account(), 1);
    }

    #[test]
    fn test_session_rejects_reused_number() {
        let alice = Account::new(1, "Alice", "digest");
        let session = Session::new(&alice);
        assert!(session.is_for(&alice));

        let mut bob = Account::new(1, "Bob", "digest");
        bob.created_at = alice.created_at + chrono::Duration::microseconds(1);
        assert!(!session.is_for(&bob));
    }

    #[test]
    fn test_login_into_session() {
        assert!(Login::Authenticated(Session::new(&Account::new(2, "Bob", "digest"))).into_session().is_some());
        assert!(Login::CodeRequired(2).into_session().is_none());
    }
}

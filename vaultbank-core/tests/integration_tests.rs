//! Integration tests for vaultbank-core services
//!
//! These tests drive the public API over a real DuckDB file in a temporary
//! directory: authentication and lockout, ledger arithmetic, admin overrides,
//! wipe/re-initialize and persistence across reopen.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use tempfile::TempDir;

use vaultbank_core::adapters::{DuckDbRepository, TotpCodes};
use vaultbank_core::domain::{Account, NewTransaction};
use vaultbank_core::ports::{ChangeSet, OneTimeCodes, Repository};
use vaultbank_core::{AccountNumber, Error, Login, Session, TransactionKind, VaultBank};

// ============================================================================
// Test Helpers
// ============================================================================

/// Open a bank in `dir` using fast SHA-256 credentials
fn open_bank(dir: &TempDir) -> VaultBank {
    std::fs::write(
        dir.path().join("settings.json"),
        r#"{"security": {"credentialScheme": "sha256"}}"#,
    )
    .unwrap();
    VaultBank::open(dir.path()).expect("Failed to open bank")
}

/// Log in to an account without two-factor
fn login(bank: &VaultBank, number: AccountNumber, password: &str) -> Session {
    bank.auth
        .authenticate(number, password)
        .expect("login failed")
        .into_session()
        .expect("unexpected two-factor challenge")
}

/// Create an account and fund it
fn open_account(bank: &VaultBank, name: &str, password: &str, balance: i64) -> AccountNumber {
    let number = bank.admin.create_account(name, password).unwrap().number;
    if balance > 0 {
        let session = login(bank, number, password);
        bank.ledger.deposit(&session, balance).unwrap();
    }
    number
}

fn balance(bank: &VaultBank, number: AccountNumber) -> i64 {
    bank.repository.get_account(number).unwrap().unwrap().balance
}

/// Enable two-factor and return the shared secret
fn enable_two_factor(bank: &VaultBank, number: AccountNumber, password: &str) -> String {
    let session = login(bank, number, password);
    let enrollment = bank.auth.begin_enrollment(&session).unwrap();
    bank.auth
        .enable_two_factor(&session, &enrollment.secret, &enrollment.current_code)
        .unwrap();
    enrollment.secret
}

// ============================================================================
// Ledger Scenarios
// ============================================================================

#[test]
fn test_deposit_then_withdraw() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let number = open_account(&bank, "Alice", "pw", 0);
    let session = login(&bank, number, "pw");

    bank.ledger.deposit(&session, 100).unwrap();
    let view = bank.ledger.withdraw(&session, 40).unwrap();

    assert_eq!(view.balance, 60);
    assert_eq!(view.total_deposited, 100);
    assert_eq!(view.total_withdrawn, 40);

    let history = bank.ledger.history(&session).unwrap();
    let amounts: Vec<i64> = history.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![100, -40]);
    assert!(history[0].id < history[1].id);
}

#[test]
fn test_transfer_conserves_pair_sum() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "a", 50);
    let b = open_account(&bank, "Bob", "b", 10);

    let session = login(&bank, a, "a");
    bank.ledger.transfer(&session, b, 20).unwrap();

    let alice = bank.repository.get_account(a).unwrap().unwrap();
    let bob = bank.repository.get_account(b).unwrap().unwrap();
    assert_eq!(alice.balance, 30);
    assert_eq!(bob.balance, 30);
    assert_eq!(alice.total_transferred, 20);
    assert_eq!(bob.total_transferred, 0);

    let bob_history = bank.repository.list_transactions(b).unwrap();
    assert_eq!(bob_history.last().unwrap().kind, TransactionKind::TransferIn);
    assert_eq!(bob_history.last().unwrap().amount, 20);
}

#[test]
fn test_overdraft_leaves_everything_unchanged() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "a", 30);
    let b = open_account(&bank, "Bob", "b", 0);
    let session = login(&bank, a, "a");

    assert!(matches!(bank.ledger.withdraw(&session, 31), Err(Error::InsufficientFunds)));
    assert!(matches!(bank.ledger.transfer(&session, b, 31), Err(Error::InsufficientFunds)));
    assert!(matches!(
        bank.ledger.transfer(&session, 99, 1),
        Err(Error::TargetAccountNotFound(99))
    ));

    assert_eq!(balance(&bank, a), 30);
    assert_eq!(balance(&bank, b), 0);
    assert_eq!(bank.repository.list_transactions(a).unwrap().len(), 1);
    assert!(bank.repository.list_transactions(b).unwrap().is_empty());
}

#[test]
fn test_balances_reconcile_after_mixed_operations() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "a", 500);
    let b = open_account(&bank, "Bob", "b", 100);
    let alice = login(&bank, a, "a");
    let bob = login(&bank, b, "b");

    bank.ledger.transfer(&alice, b, 120).unwrap();
    bank.ledger.withdraw(&bob, 200).unwrap();
    bank.ledger.transfer(&bob, a, 5).unwrap();
    bank.ledger.transfer(&alice, a, 50).unwrap();
    bank.ledger.deposit(&alice, 1).unwrap();

    for number in [a, b] {
        let reconciliation = bank.ledger.reconcile(number).unwrap();
        assert!(reconciliation.is_balanced(), "{:?}", reconciliation);
        assert!(reconciliation.balance >= 0);
    }
    let admin = {
        bank.admin.bootstrap("root").unwrap();
        bank.admin.elevate("root").unwrap()
    };
    assert!(bank.admin.diagnose(&admin).unwrap().is_healthy());
}

#[test]
fn test_csv_statement_export() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "a", 75);
    let session = login(&bank, a, "a");

    let path = dir.path().join("statement.csv");
    let file = std::fs::File::create(&path).unwrap();
    assert_eq!(bank.ledger.export_history_csv(&session, file).unwrap(), 1);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("id,date,kind,amount"));
    assert!(text.contains(",deposit,75"));
}

// ============================================================================
// Authentication and Lockout
// ============================================================================

#[test]
fn test_three_wrong_passwords_lock_the_account() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "right", 0);

    for _ in 0..3 {
        assert!(bank.auth.authenticate(a, "wrong").is_err());
    }
    assert!(matches!(bank.auth.authenticate(a, "right"), Err(Error::AccountLocked)));

    let account = bank.repository.get_account(a).unwrap().unwrap();
    assert!(account.is_locked);
    assert_eq!(account.password_attempts, 3);
}

#[test]
fn test_lockout_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let a = {
        let bank = open_bank(&dir);
        let a = open_account(&bank, "Alice", "right", 0);
        for _ in 0..3 {
            let _ = bank.auth.authenticate(a, "wrong");
        }
        a
    };

    let bank = open_bank(&dir);
    assert!(matches!(bank.auth.authenticate(a, "right"), Err(Error::AccountLocked)));
}

#[test]
fn test_two_factor_counter_is_independent() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "pw", 0);
    let secret = enable_two_factor(&bank, a, "pw");

    assert!(matches!(bank.auth.authenticate(a, "pw").unwrap(), Login::CodeRequired(n) if n == a));
    for _ in 0..3 {
        assert!(bank.auth.submit_code(a, "not-a-code").is_err());
    }

    let account = bank.repository.get_account(a).unwrap().unwrap();
    assert_eq!(account.code_attempts, 3);
    assert_eq!(account.password_attempts, 0);
    assert!(account.is_locked);

    let code = TotpCodes::default().current_code(&secret).unwrap();
    assert!(matches!(bank.auth.submit_code(a, &code), Err(Error::NoPendingChallenge(_))));
    assert!(matches!(bank.auth.authenticate(a, "pw"), Err(Error::AccountLocked)));
}

#[test]
fn test_two_factor_login() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "pw", 10);
    let secret = enable_two_factor(&bank, a, "pw");

    assert!(bank.auth.authenticate(a, "pw").unwrap().into_session().is_none());
    let code = TotpCodes::default().current_code(&secret).unwrap();
    let session = bank.auth.submit_code(a, &code).unwrap();
    assert_eq!(bank.ledger.details(&session).unwrap().balance, 10);

    let summary = bank.auth.logout(session).unwrap();
    assert!(summary.two_factor_enabled);
}

#[test]
fn test_enable_two_factor_twice() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "pw", 0);
    let secret = enable_two_factor(&bank, a, "pw");

    let code = TotpCodes::default().current_code(&secret).unwrap();
    bank.auth.authenticate(a, "pw").unwrap();
    let session = bank.auth.submit_code(a, &code).unwrap();

    let before = bank.repository.get_account(a).unwrap().unwrap();
    let codes = TotpCodes::default();
    let other = codes.new_secret();
    let other_code = codes.current_code(&other).unwrap();
    assert!(matches!(
        bank.auth.enable_two_factor(&session, &other, &other_code),
        Err(Error::AlreadyEnabled)
    ));
    assert_eq!(bank.repository.get_account(a).unwrap().unwrap(), before);
}

#[test]
fn test_argon2_credentials_end_to_end() {
    let dir = TempDir::new().unwrap();
    let bank = VaultBank::open(dir.path()).unwrap();
    let a = bank.admin.create_account("Alice", "correct horse").unwrap().number;

    let stored = bank.repository.get_account(a).unwrap().unwrap();
    assert!(stored.password_hash.starts_with("$argon2id$"));
    assert!(bank.auth.authenticate(a, "correct horse").is_ok());
    assert!(matches!(
        bank.auth.authenticate(a, "battery staple"),
        Err(Error::IncorrectPassword { remaining: Some(2) })
    ));
}

// ============================================================================
// Admin Authority
// ============================================================================

#[test]
fn test_unlock_requires_and_installs_new_password() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "old", 0);
    for _ in 0..3 {
        let _ = bank.auth.authenticate(a, "wrong");
    }

    bank.admin.bootstrap("root").unwrap();
    let admin = bank.admin.elevate("root").unwrap();

    assert!(matches!(bank.admin.unlock(&admin, a, ""), Err(Error::MissingCredential)));
    assert!(matches!(bank.auth.authenticate(a, "old"), Err(Error::AccountLocked)));

    bank.admin.unlock(&admin, a, "new").unwrap();
    let account = bank.repository.get_account(a).unwrap().unwrap();
    assert!(!account.is_locked);
    assert_eq!(account.password_attempts, 0);
    assert_eq!(account.code_attempts, 0);

    assert!(bank.auth.authenticate(a, "new").is_ok());
    assert!(matches!(
        bank.auth.authenticate(a, "old"),
        Err(Error::IncorrectPassword { .. })
    ));
}

#[test]
fn test_admin_lock_blocks_login() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "pw", 0);
    bank.admin.bootstrap("root").unwrap();
    let admin = bank.admin.elevate("root").unwrap();

    bank.admin.lock(&admin, a).unwrap();
    assert!(matches!(bank.auth.authenticate(a, "pw"), Err(Error::AccountLocked)));

    let listed = bank.admin.list_accounts(&admin).unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].locked);
}

#[test]
fn test_deleted_number_is_not_recycled() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    open_account(&bank, "Alice", "a", 0);
    let b = open_account(&bank, "Bob", "b", 25);
    bank.admin.bootstrap("root").unwrap();
    let admin = bank.admin.elevate("root").unwrap();

    bank.admin.delete_account(&admin, b, "b").unwrap();
    assert!(bank.repository.get_account(b).unwrap().is_none());
    // Ledger entries of the deleted account stay behind
    assert_eq!(bank.repository.list_transactions(b).unwrap().len(), 1);

    let c = bank.admin.create_account("Carol", "c").unwrap().number;
    assert_eq!(c, b + 1);
}

#[test]
fn test_wipe_then_reinitialize() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    open_account(&bank, "Alice", "a", 10);
    open_account(&bank, "Bob", "b", 10);
    bank.admin.bootstrap("root").unwrap();
    let admin = bank.admin.elevate("root").unwrap();

    bank.admin.wipe_all(&admin).unwrap();
    assert!(matches!(bank.admin.create_account("Carol", "c"), Err(Error::Uninitialized)));
    assert!(matches!(bank.auth.authenticate(1, "a"), Err(Error::Uninitialized)));

    // The admin secret survives a wipe
    let admin = bank.admin.elevate("root").unwrap();
    bank.admin.reinitialize(&admin).unwrap();
    assert_eq!(bank.admin.create_account("Carol", "c").unwrap().number, 1);
}

#[test]
fn test_old_session_cannot_reach_account_with_reused_number() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "a", 0);
    let alice = login(&bank, a, "a");
    bank.admin.bootstrap("root").unwrap();
    let admin = bank.admin.elevate("root").unwrap();

    bank.admin.clear_all(&admin).unwrap();
    let b = open_account(&bank, "Bob", "b", 500);
    assert_eq!(b, a);

    assert!(matches!(bank.ledger.withdraw(&alice, 500), Err(Error::AccountNotFound(_))));
    assert!(matches!(bank.ledger.details(&alice), Err(Error::AccountNotFound(_))));
    assert_eq!(balance(&bank, b), 500);

    // Same after a wipe and re-initialize
    let carol_session = login(&bank, b, "b");
    bank.admin.wipe_all(&admin).unwrap();
    bank.admin.reinitialize(&admin).unwrap();
    let c = open_account(&bank, "Carol", "c", 70);
    assert_eq!(c, b);
    assert!(matches!(
        bank.ledger.transfer(&carol_session, c, 70),
        Err(Error::AccountNotFound(_))
    ));
    assert_eq!(balance(&bank, c), 70);
}

#[test]
fn test_unlock_voids_pending_code_challenge() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "old", 0);
    let secret = enable_two_factor(&bank, a, "old");
    bank.admin.bootstrap("root").unwrap();
    let admin = bank.admin.elevate("root").unwrap();

    assert!(matches!(bank.auth.authenticate(a, "old"), Ok(Login::CodeRequired(_))));
    bank.admin.lock(&admin, a).unwrap();
    bank.admin.unlock(&admin, a, "rotated").unwrap();

    let code = TotpCodes::default().current_code(&secret).unwrap();
    assert!(matches!(bank.auth.submit_code(a, &code), Err(Error::NoPendingChallenge(_))));

    // The rotated password starts a fresh challenge that does complete
    assert!(matches!(bank.auth.authenticate(a, "rotated"), Ok(Login::CodeRequired(_))));
    let code = TotpCodes::default().current_code(&secret).unwrap();
    assert!(bank.auth.submit_code(a, &code).is_ok());
}

#[test]
fn test_admin_session_revoked_after_secret_change() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    bank.admin.bootstrap("root").unwrap();
    let admin = bank.admin.elevate("root").unwrap();

    bank.admin.change_secret("root", "toor").unwrap();
    assert!(matches!(bank.admin.clear_all(&admin), Err(Error::Unauthorized)));
    assert!(!bank.admin.authorize("root").unwrap());
    assert!(bank.admin.authorize("toor").unwrap());
}

#[test]
fn test_audit_log_records_security_events() {
    let dir = TempDir::new().unwrap();
    let bank = open_bank(&dir);
    let a = open_account(&bank, "Alice", "pw", 0);
    for _ in 0..3 {
        let _ = bank.auth.authenticate(a, "wrong");
    }

    let log = bank.audit.log().expect("audit log should be open");
    let events: Vec<String> = log
        .for_account(a, 50)
        .unwrap()
        .into_iter()
        .map(|e| e.event)
        .collect();
    assert_eq!(events.iter().filter(|e| *e == "login_failed").count(), 3);
    assert!(events.contains(&"account_locked".to_string()));

    // Nothing secret ends up in the log
    for entry in log.get_recent(100).unwrap() {
        assert!(!entry.detail.unwrap_or_default().contains("wrong"));
    }
}

// ============================================================================
// Process and Storage Guarantees
// ============================================================================

#[test]
fn test_second_open_is_refused() {
    let dir = TempDir::new().unwrap();
    let _bank = open_bank(&dir);
    assert!(matches!(VaultBank::open(dir.path()), Err(Error::Config(_))));
}

#[test]
fn test_balances_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let (a, b) = {
        let bank = open_bank(&dir);
        let a = open_account(&bank, "Alice", "a", 80);
        let b = open_account(&bank, "Bob", "b", 0);
        bank.ledger.transfer(&login(&bank, a, "a"), b, 30).unwrap();
        (a, b)
    };

    let bank = open_bank(&dir);
    assert_eq!(balance(&bank, a), 50);
    assert_eq!(balance(&bank, b), 30);
    assert_eq!(bank.admin.create_account("Carol", "c").unwrap().number, 3);
}

#[test]
fn test_failed_changeset_rolls_back() {
    let dir = TempDir::new().unwrap();
    let repo = DuckDbRepository::new(&dir.path().join("test.duckdb")).unwrap();
    repo.ensure_schema().unwrap();

    let mut alice = Account::new(1, "Alice", "digest");
    alice.balance = 50;
    repo.commit(
        &ChangeSet::new()
            .put(alice.clone())
            .append(NewTransaction::new(1, TransactionKind::Deposit, 50)),
    )
    .unwrap();

    // Second record violates the balance constraint
    let mut debited = alice.clone();
    debited.balance = 30;
    let mut broken = Account::new(2, "Bob", "digest");
    broken.balance = -20;
    let result = repo.commit(
        &ChangeSet::new()
            .put(debited)
            .put(broken)
            .append(NewTransaction::new(1, TransactionKind::TransferOut, 20))
            .append(NewTransaction::new(2, TransactionKind::TransferIn, 20)),
    );

    assert!(matches!(result, Err(Error::Storage(_))));
    assert_eq!(repo.get_account(1).unwrap().unwrap().balance, 50);
    assert!(repo.get_account(2).unwrap().is_none());
    assert_eq!(repo.list_transactions(1).unwrap().len(), 1);
    assert!(repo.list_transactions(2).unwrap().is_empty());
}

#[test]
fn test_migrations_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let repo = DuckDbRepository::new(&dir.path().join("test.duckdb")).unwrap();

    let first = repo.run_migrations().unwrap();
    assert!(!first.applied.is_empty());
    let second = repo.run_migrations().unwrap();
    assert!(second.applied.is_empty());
    assert_eq!(second.already_applied, first.applied.len());
}

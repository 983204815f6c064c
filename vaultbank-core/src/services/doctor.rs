//! Doctor service - ledger health checks

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::domain::result::Result;
use crate::ports::Repository;
use crate::services::ledger::reconcile_account;

/// Doctor service for health checks
pub struct DoctorService {
    repository: Arc<dyn Repository>,
    max_attempts: u32,
}

impl DoctorService {
    pub fn new(repository: Arc<dyn Repository>, max_attempts: u32) -> Self {
        Self {
            repository,
            max_attempts,
        }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let mut checks = BTreeMap::new();
        let accounts = self.repository.list_accounts()?;

        // Balance must equal the sum of the account's ledger entries
        let mut unbalanced = Vec::new();
        for account in &accounts {
            let reconciliation = reconcile_account(self.repository.as_ref(), account)?;
            if !reconciliation.is_balanced() {
                unbalanced.push(json!({
                    "account": reconciliation.account,
                    "balance": reconciliation.balance,
                    "ledger_sum": reconciliation.ledger_sum,
                }));
            }
        }
        checks.insert(
            "balance_reconciliation".to_string(),
            CheckResult::from_findings(
                unbalanced,
                "error",
                format!("All {} account balance(s) match their ledger", accounts.len()),
                |n| format!("{} account(s) differ from their ledger", n),
            ),
        );

        let negative: Vec<_> = accounts
            .iter()
            .filter(|a| a.balance < 0)
            .map(|a| json!({"account": a.number, "balance": a.balance}))
            .collect();
        checks.insert(
            "negative_balances".to_string(),
            CheckResult::from_findings(
                negative,
                "error",
                "No negative balances".to_string(),
                |n| format!("{} account(s) have a negative balance", n),
            ),
        );

        // Entries left behind by deleted accounts are expected until a clear
        let orphans: Vec<_> = self
            .repository
            .orphaned_account_numbers()?
            .into_iter()
            .map(|n| json!({"account": n}))
            .collect();
        checks.insert(
            "orphaned_transactions".to_string(),
            CheckResult::from_findings(
                orphans,
                "warning",
                "No orphaned ledger entries".to_string(),
                |n| format!("{} deleted account(s) still have ledger entries", n),
            ),
        );

        let unflagged: Vec<_> = accounts
            .iter()
            .filter(|a| {
                !a.is_locked
                    && (a.password_attempts >= self.max_attempts
                        || a.code_attempts >= self.max_attempts)
            })
            .map(|a| {
                json!({
                    "account": a.number,
                    "password_attempts": a.password_attempts,
                    "code_attempts": a.code_attempts,
                })
            })
            .collect();
        checks.insert(
            "lock_consistency".to_string(),
            CheckResult::from_findings(
                unflagged,
                "warning",
                "Lock flags agree with attempt counters".to_string(),
                |n| format!("{} account(s) are over the attempt limit without the lock flag", n),
            ),
        );

        let missing_secret: Vec<_> = accounts
            .iter()
            .filter(|a| a.two_factor_enabled && a.otp_secret.is_none())
            .map(|a| json!({"account": a.number}))
            .collect();
        checks.insert(
            "two_factor_secrets".to_string(),
            CheckResult::from_findings(
                missing_secret,
                "error",
                "Every two-factor account has a secret".to_string(),
                |n| format!("{} two-factor account(s) have no secret", n),
            ),
        );

        // Calculate summary
        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary {
                passed,
                warnings,
                errors,
            },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorResult {
    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn from_findings(
        findings: Vec<serde_json::Value>,
        severity: &str,
        ok_message: String,
        failed_message: impl FnOnce(usize) -> String,
    ) -> Self {
        if findings.is_empty() {
            Self {
                status: "pass".to_string(),
                message: ok_message,
                details: None,
            }
        } else {
            Self {
                status: severity.to_string(),
                message: failed_message(findings.len()),
                details: Some(findings),
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}

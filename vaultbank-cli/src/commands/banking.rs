//! Ledger commands - each one authenticates, runs one operation, and logs out

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use vaultbank_core::{AccountNumber, Session, VaultBank};

use super::{emit_json, get_context, login};
use crate::output;

pub fn deposit(account: AccountNumber, amount: i64, json: bool) -> Result<()> {
    let bank = get_context()?;
    let session = login(&bank, account)?;
    let result = bank.ledger.deposit(&session, amount);
    bank.auth.logout(session)?;

    if json {
        return emit_json(result);
    }
    let view = result?;
    output::success(&format!("Deposited {}. New balance: {}", amount, view.balance));
    Ok(())
}

pub fn withdraw(account: AccountNumber, amount: i64, json: bool) -> Result<()> {
    let bank = get_context()?;
    let session = login(&bank, account)?;
    let result = bank.ledger.withdraw(&session, amount);
    bank.auth.logout(session)?;

    if json {
        return emit_json(result);
    }
    let view = result?;
    output::success(&format!("Withdrew {}. New balance: {}", amount, view.balance));
    Ok(())
}

pub fn transfer(account: AccountNumber, to: AccountNumber, amount: i64, json: bool) -> Result<()> {
    let bank = get_context()?;
    let session = login(&bank, account)?;
    let result = bank.ledger.transfer(&session, to, amount);
    bank.auth.logout(session)?;

    if json {
        return emit_json(result);
    }
    let view = result?;
    output::success(&format!(
        "Transferred {} to account {}. New balance: {}",
        amount, to, view.balance
    ));
    Ok(())
}

pub fn details(account: AccountNumber, json: bool) -> Result<()> {
    let bank = get_context()?;
    let session = login(&bank, account)?;
    let result = bank.ledger.details(&session);
    bank.auth.logout(session)?;

    if json {
        return emit_json(result);
    }
    output::account(&result?);
    Ok(())
}

pub fn history(account: AccountNumber, csv: Option<PathBuf>, json: bool) -> Result<()> {
    let bank = get_context()?;
    let session = login(&bank, account)?;

    if let Some(path) = csv {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let written = bank.ledger.export_history_csv(&session, BufWriter::new(file));
        bank.auth.logout(session)?;
        let written = written?;
        output::success(&format!("Exported {} transactions to {}", written, path.display()));
        return Ok(());
    }

    let result = bank.ledger.history(&session);
    bank.auth.logout(session)?;

    if json {
        return emit_json(result);
    }
    let entries = result?;
    if entries.is_empty() {
        println!("No transactions yet.");
        return Ok(());
    }
    output::transactions(&entries);
    Ok(())
}

pub fn enable_two_factor(account: AccountNumber) -> Result<()> {
    let bank = get_context()?;
    let session = login(&bank, account)?;
    let result = enroll(&bank, &session);
    bank.auth.logout(session)?;
    result
}

/// Walk the account holder through authenticator enrollment
pub fn enroll(bank: &VaultBank, session: &Session) -> Result<()> {
    let enrollment = bank.auth.begin_enrollment(session)?;

    println!("{}", "Add this account to your authenticator app:".bold());
    println!("  Secret: {}", enrollment.secret.cyan());
    println!("  URI:    {}", enrollment.provisioning_uri);
    println!();

    let code = super::read_code()?;
    bank.auth.enable_two_factor(session, &enrollment.secret, code.trim())?;
    output::success("Two-factor authentication enabled.");
    Ok(())
}

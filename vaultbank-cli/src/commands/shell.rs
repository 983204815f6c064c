//! Shell command - interactive menus over the same operations as the subcommands
//!
//! Recoverable outcomes (wrong password, insufficient funds, ...) are printed
//! and the menu carries on. Storage and configuration failures end the shell.

use std::fs::File;
use std::io::BufWriter;

use anyhow::{bail, Result};
use dialoguer::{Confirm, Input, Password, Select};
use vaultbank_core::{AccountNumber, AdminSession, Error, Session, VaultBank};

use super::banking::enroll;
use super::{doctor, get_context, login};
use crate::output;

const MAIN_MENU: &[&str] = &["Log in", "Open an account", "Admin", "Quit"];

const ACCOUNT_MENU: &[&str] = &[
    "Deposit",
    "Withdraw",
    "Transfer",
    "Details",
    "History",
    "Export history (CSV)",
    "Enable two-factor",
    "Log out",
];

const ADMIN_MENU: &[&str] = &[
    "Create account",
    "List accounts",
    "Inspect account",
    "Lock account",
    "Unlock account",
    "Delete account",
    "Diagnose",
    "Clear all data",
    "Wipe all data",
    "Re-initialize",
    "Change admin password",
    "Remove admin password",
    "Back",
];

/// Print a recoverable error and carry on; anything else ends the shell
fn report(result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<Error>() {
            Some(core) if core.is_recoverable() => {
                output::error(&core.to_string());
                Ok(())
            }
            _ => Err(e),
        },
    }
}

fn is_locked(result: &Result<()>) -> bool {
    matches!(
        result.as_ref().err().and_then(|e| e.downcast_ref::<Error>()),
        Some(Error::AccountLocked)
    )
}

fn ask_number(prompt: &str) -> Result<AccountNumber> {
    Ok(Input::<AccountNumber>::new().with_prompt(prompt).interact_text()?)
}

fn ask_amount() -> Result<i64> {
    Ok(Input::<i64>::new().with_prompt("Amount").interact_text()?)
}

fn ask_password(prompt: &str) -> Result<String> {
    Ok(Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()?)
}

fn ask_new_password(prompt: &str) -> Result<String> {
    Ok(Password::new()
        .with_prompt(prompt)
        .with_confirmation("Confirm password", "Passwords do not match")
        .allow_empty_password(true)
        .interact()?)
}

pub fn run() -> Result<()> {
    if atty::isnt(atty::Stream::Stdin) {
        bail!("The shell needs an interactive terminal");
    }
    let bank = get_context()?;
    output::info("Welcome to VaultBank.");

    loop {
        let choice = Select::new()
            .with_prompt("Main menu")
            .items(MAIN_MENU)
            .default(0)
            .interact()?;

        match choice {
            0 => report(account_session(&bank))?,
            1 => report(open_account(&bank))?,
            2 => report(admin_session(&bank))?,
            _ => break,
        }
    }

    output::info("Goodbye.");
    Ok(())
}

fn open_account(bank: &VaultBank) -> Result<()> {
    let name: String = Input::new().with_prompt("Your name").interact_text()?;
    let password = ask_new_password("Choose a password")?;
    let view = bank.admin.create_account(&name, &password)?;
    output::success(&format!("Account {} opened for {}.", view.number, view.name));
    output::info("Keep the account number: it is needed to log in.");
    Ok(())
}

fn account_session(bank: &VaultBank) -> Result<()> {
    let number = ask_number("Account number")?;
    let session = login(bank, number)?;
    output::success(&format!("Logged in to account {}.", number));

    loop {
        let choice = Select::new()
            .with_prompt(format!("Account {}", number))
            .items(ACCOUNT_MENU)
            .default(0)
            .interact()?;

        let result = match choice {
            0 => ask_amount().and_then(|amount| {
                let view = bank.ledger.deposit(&session, amount)?;
                output::success(&format!("New balance: {}", view.balance));
                Ok(())
            }),
            1 => ask_amount().and_then(|amount| {
                let view = bank.ledger.withdraw(&session, amount)?;
                output::success(&format!("New balance: {}", view.balance));
                Ok(())
            }),
            2 => transfer(bank, &session),
            3 => bank
                .ledger
                .details(&session)
                .map(|view| output::account(&view))
                .map_err(Into::into),
            4 => history(bank, &session),
            5 => export(bank, &session),
            6 => enroll(bank, &session),
            _ => break,
        };

        let locked = is_locked(&result);
        report(result)?;
        if locked {
            break;
        }
    }

    let view = bank.auth.logout(session)?;
    output::info(&format!("Logged out. Balance: {}", view.balance));
    Ok(())
}

fn transfer(bank: &VaultBank, session: &Session) -> Result<()> {
    let destination = ask_number("Destination account")?;
    let amount = ask_amount()?;
    let view = bank.ledger.transfer(session, destination, amount)?;
    output::success(&format!(
        "Transferred {} to account {}. New balance: {}",
        amount, destination, view.balance
    ));
    Ok(())
}

fn history(bank: &VaultBank, session: &Session) -> Result<()> {
    let entries = bank.ledger.history(session)?;
    if entries.is_empty() {
        println!("No transactions yet.");
    } else {
        output::transactions(&entries);
    }
    Ok(())
}

fn export(bank: &VaultBank, session: &Session) -> Result<()> {
    let path: String = Input::new()
        .with_prompt("File name")
        .default(format!("account-{}.csv", session.account()))
        .interact_text()?;
    let file = File::create(&path)?;
    let written = bank.ledger.export_history_csv(session, BufWriter::new(file))?;
    output::success(&format!("Exported {} transactions to {}", written, path));
    Ok(())
}

fn admin_session(bank: &VaultBank) -> Result<()> {
    if !bank.admin.has_secret()? {
        output::warning("No admin password is set yet.");
        let secret = ask_new_password("Choose an admin password")?;
        bank.admin.bootstrap(&secret)?;
        output::success("Admin password set.");
    }
    let admin = bank.admin.elevate(&ask_password("Admin password")?)?;

    loop {
        let choice = Select::new()
            .with_prompt("Admin")
            .items(ADMIN_MENU)
            .default(0)
            .interact()?;

        let result = match choice {
            0 => open_account(bank),
            1 => list(bank, &admin),
            2 => inspect(bank, &admin),
            3 => ask_number("Account number").and_then(|number| {
                bank.admin.lock(&admin, number)?;
                output::success(&format!("Account {} locked.", number));
                Ok(())
            }),
            4 => unlock(bank, &admin),
            5 => delete(bank, &admin),
            6 => bank
                .admin
                .diagnose(&admin)
                .map(|result| doctor::print_result(&result, true))
                .map_err(Into::into),
            7 => confirmed("Delete ALL accounts and transactions?").and_then(|yes| {
                if yes {
                    bank.admin.clear_all(&admin)?;
                    output::success("All accounts and transactions deleted.");
                }
                Ok(())
            }),
            8 => confirmed("Drop the ledger tables?").and_then(|yes| {
                if yes {
                    bank.admin.wipe_all(&admin)?;
                    output::warning("Ledger wiped. Choose Re-initialize to start over.");
                }
                Ok(())
            }),
            9 => bank
                .admin
                .reinitialize(&admin)
                .map(|()| output::success("Ledger initialized."))
                .map_err(Into::into),
            // A changed or removed secret revokes this admin session
            10 => match change_secret(bank) {
                Ok(()) => return Ok(()),
                Err(e) => Err(e),
            },
            11 => match remove_secret(bank) {
                Ok(()) => return Ok(()),
                Err(e) => Err(e),
            },
            _ => break,
        };

        report(result)?;
    }

    Ok(())
}

fn confirmed(prompt: &str) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

fn list(bank: &VaultBank, admin: &AdminSession) -> Result<()> {
    let accounts = bank.admin.list_accounts(admin)?;
    if accounts.is_empty() {
        println!("No accounts.");
    } else {
        output::accounts(&accounts);
    }
    Ok(())
}

fn inspect(bank: &VaultBank, admin: &AdminSession) -> Result<()> {
    let number = ask_number("Account number")?;
    let password = ask_password("Account password")?;
    output::account(&bank.admin.inspect(admin, number, &password)?);
    Ok(())
}

fn unlock(bank: &VaultBank, admin: &AdminSession) -> Result<()> {
    let number = ask_number("Account number")?;
    let password = ask_new_password("New password for the account")?;
    bank.admin.unlock(admin, number, &password)?;
    output::success(&format!("Account {} unlocked.", number));
    Ok(())
}

fn delete(bank: &VaultBank, admin: &AdminSession) -> Result<()> {
    let number = ask_number("Account number")?;
    let password = ask_password("Account password")?;
    if !confirmed(&format!("Delete account {}?", number))? {
        return Ok(());
    }
    bank.admin.delete_account(admin, number, &password)?;
    output::success(&format!("Account {} deleted.", number));
    Ok(())
}

fn change_secret(bank: &VaultBank) -> Result<()> {
    let current = ask_password("Current admin password")?;
    let new_secret = ask_new_password("New admin password")?;
    bank.admin.change_secret(&current, &new_secret)?;
    output::success("Admin password changed. Log in again to continue.");
    Ok(())
}

fn remove_secret(bank: &VaultBank) -> Result<()> {
    let current = ask_password("Current admin password")?;
    if !confirmed("Remove the admin password?")? {
        return Ok(());
    }
    bank.admin.remove_secret(&current)?;
    output::warning("Admin password removed.");
    Ok(())
}

//! CLI command implementations

pub mod account;
pub mod admin;
pub mod banking;
pub mod doctor;
pub mod logs;
pub mod shell;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use dialoguer::{Input, Password};
use serde::Serialize;
use vaultbank_core::{AccountNumber, AdminSession, Login, OperationResult, Session, VaultBank};

/// Account password for scripted use
pub const PASSWORD_ENV: &str = "VAULTBANK_PASSWORD";
/// Admin password for scripted use
pub const ADMIN_PASSWORD_ENV: &str = "VAULTBANK_ADMIN_PASSWORD";
/// One-time code for scripted use
pub const CODE_ENV: &str = "VAULTBANK_CODE";

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("VAULTBANK_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".vaultbank"))
}

/// Open the bank in the data directory
pub fn get_context() -> Result<VaultBank> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    VaultBank::open(&data_dir).context("Failed to open VaultBank")
}

fn interactive() -> bool {
    atty::is(atty::Stream::Stdin)
}

/// Get a secret from the environment, or prompt for it
pub fn read_secret(prompt: &str, env_var: &str) -> Result<String> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(value);
    }
    if !interactive() {
        bail!("{} is not set and stdin is not a terminal", env_var);
    }
    let value = Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()?;
    Ok(value)
}

/// Get a new secret from the environment, or prompt twice for it
pub fn read_new_secret(prompt: &str, env_var: &str) -> Result<String> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(value);
    }
    if !interactive() {
        bail!("{} is not set and stdin is not a terminal", env_var);
    }
    let value = Password::new()
        .with_prompt(prompt)
        .with_confirmation("Confirm password", "Passwords do not match")
        .allow_empty_password(true)
        .interact()?;
    Ok(value)
}

/// Get a one-time code from the environment, or prompt for it
pub fn read_code() -> Result<String> {
    if let Ok(code) = std::env::var(CODE_ENV) {
        return Ok(code);
    }
    if !interactive() {
        bail!("{} is not set and stdin is not a terminal", CODE_ENV);
    }
    let code: String = Input::new()
        .with_prompt("Verification code")
        .interact_text()?;
    Ok(code)
}

/// Authenticate an account holder, asking for a code when two-factor is on
pub fn login(bank: &VaultBank, number: AccountNumber) -> Result<Session> {
    let password = read_secret("Password", PASSWORD_ENV)?;
    match bank.auth.authenticate(number, &password)? {
        Login::Authenticated(session) => Ok(session),
        Login::CodeRequired(number) => {
            let code = read_code()?;
            Ok(bank.auth.submit_code(number, code.trim())?)
        }
    }
}

/// Present the admin password and get an admin session
pub fn admin_login(bank: &VaultBank) -> Result<AdminSession> {
    if !bank.admin.has_secret()? {
        bail!("No admin password is set. Run 'vb admin init' first.");
    }
    let secret = read_secret("Admin password", ADMIN_PASSWORD_ENV)?;
    Ok(bank.admin.elevate(&secret)?)
}

/// Print an operation outcome as JSON, then hand the error back for the exit code
pub fn emit_json<T: Serialize>(result: vaultbank_core::Result<T>) -> Result<()> {
    match result {
        Ok(data) => {
            println!("{}", serde_json::to_string_pretty(&OperationResult::ok(data))?);
            Ok(())
        }
        Err(e) => {
            let envelope: OperationResult<T> = OperationResult::fail(e.to_string());
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Err(e.into())
        }
    }
}

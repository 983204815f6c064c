//! Admin commands - account management and ledger maintenance

use anyhow::{bail, Result};
use clap::Subcommand;
use dialoguer::Confirm;
use vaultbank_core::AccountNumber;

use super::{
    admin_login, emit_json, get_context, get_data_dir, read_new_secret, read_secret,
    ADMIN_PASSWORD_ENV, PASSWORD_ENV,
};
use crate::output;

/// New admin password for `passwd`
const NEW_ADMIN_PASSWORD_ENV: &str = "VAULTBANK_NEW_ADMIN_PASSWORD";

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Set the admin password for the first time
    Init,
    /// Check the admin password
    Login,
    /// Create an account on behalf of a customer
    Create {
        /// Account holder name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one account (asks for the account password)
    Inspect {
        /// Account number
        account: AccountNumber,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an account (asks for the account password)
    Delete {
        /// Account number
        account: AccountNumber,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Lock an account
    Lock {
        /// Account number
        account: AccountNumber,
    },
    /// Unlock an account and set a new password
    Unlock {
        /// Account number
        account: AccountNumber,
    },
    /// Delete every account and transaction
    Clear {
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Drop the ledger tables entirely
    Wipe {
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Recreate the ledger tables after a wipe
    Reinit,
    /// Change the admin password
    Passwd,
    /// Remove the admin password
    RemoveSecret {
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}

fn confirm(prompt: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }
    if atty::isnt(atty::Stream::Stdin) {
        bail!("Refusing to continue without --force when stdin is not a terminal");
    }
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

pub fn run(command: AdminCommands) -> Result<()> {
    let bank = get_context()?;

    match command {
        AdminCommands::Init => {
            let data_dir = get_data_dir()?;
            if !data_dir.join("settings.json").exists() {
                bank.config.save(&data_dir)?;
            }
            let secret = read_new_secret("Choose an admin password", ADMIN_PASSWORD_ENV)?;
            bank.admin.bootstrap(&secret)?;
            output::success("Admin password set.");
        }

        AdminCommands::Login => {
            if !bank.admin.has_secret()? {
                bail!("No admin password is set. Run 'vb admin init' first.");
            }
            let secret = read_secret("Admin password", ADMIN_PASSWORD_ENV)?;
            if bank.admin.authorize(&secret)? {
                output::success("Admin password accepted.");
            } else {
                bail!("Unauthorized access");
            }
        }

        AdminCommands::Create { name, json } => {
            let _admin = admin_login(&bank)?;
            let password = read_new_secret("Password for the new account", PASSWORD_ENV)?;
            let result = bank.admin.create_account(&name, &password);
            if json {
                return emit_json(result);
            }
            let view = result?;
            output::success(&format!("Account {} created for {}.", view.number, view.name));
        }

        AdminCommands::List { json } => {
            let admin = admin_login(&bank)?;
            let result = bank.admin.list_accounts(&admin);
            if json {
                return emit_json(result);
            }
            let accounts = result?;
            if accounts.is_empty() {
                println!("No accounts.");
            } else {
                output::accounts(&accounts);
            }
        }

        AdminCommands::Inspect { account, json } => {
            let admin = admin_login(&bank)?;
            let password = read_secret("Account password", PASSWORD_ENV)?;
            let result = bank.admin.inspect(&admin, account, &password);
            if json {
                return emit_json(result);
            }
            output::account(&result?);
        }

        AdminCommands::Delete { account, force } => {
            let admin = admin_login(&bank)?;
            let password = read_secret("Account password", PASSWORD_ENV)?;
            if !confirm(&format!("Delete account {}?", account), force)? {
                output::info("Cancelled.");
                return Ok(());
            }
            bank.admin.delete_account(&admin, account, &password)?;
            output::success(&format!("Account {} deleted.", account));
        }

        AdminCommands::Lock { account } => {
            let admin = admin_login(&bank)?;
            bank.admin.lock(&admin, account)?;
            output::success(&format!("Account {} locked.", account));
        }

        AdminCommands::Unlock { account } => {
            let admin = admin_login(&bank)?;
            let password = read_new_secret("New password for the account", PASSWORD_ENV)?;
            bank.admin.unlock(&admin, account, &password)?;
            output::success(&format!("Account {} unlocked.", account));
        }

        AdminCommands::Clear { force } => {
            let admin = admin_login(&bank)?;
            if !confirm("Delete ALL accounts and transactions?", force)? {
                output::info("Cancelled.");
                return Ok(());
            }
            bank.admin.clear_all(&admin)?;
            output::success("All accounts and transactions deleted.");
        }

        AdminCommands::Wipe { force } => {
            let admin = admin_login(&bank)?;
            if !confirm("Drop the ledger tables? Nothing works until 'vb admin reinit'.", force)? {
                output::info("Cancelled.");
                return Ok(());
            }
            bank.admin.wipe_all(&admin)?;
            output::warning("Ledger wiped. Run 'vb admin reinit' to start over.");
        }

        AdminCommands::Reinit => {
            let admin = admin_login(&bank)?;
            bank.admin.reinitialize(&admin)?;
            output::success("Ledger initialized.");
        }

        AdminCommands::Passwd => {
            let current = read_secret("Current admin password", ADMIN_PASSWORD_ENV)?;
            let new_secret = read_new_secret("New admin password", NEW_ADMIN_PASSWORD_ENV)?;
            bank.admin.change_secret(&current, &new_secret)?;
            output::success("Admin password changed.");
        }

        AdminCommands::RemoveSecret { force } => {
            let current = read_secret("Current admin password", ADMIN_PASSWORD_ENV)?;
            if !confirm("Remove the admin password?", force)? {
                output::info("Cancelled.");
                return Ok(());
            }
            bank.admin.remove_secret(&current)?;
            output::warning("Admin password removed. Run 'vb admin init' to set a new one.");
        }
    }

    Ok(())
}

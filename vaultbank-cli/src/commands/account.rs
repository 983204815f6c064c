//! Account command - open a new account

use anyhow::Result;
use clap::Subcommand;

use super::{emit_json, get_context, read_new_secret, PASSWORD_ENV};
use crate::output;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account with zero balance
    Open {
        /// Account holder name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::Open { name, json } => {
            let bank = get_context()?;
            let password = read_new_secret("Choose a password", PASSWORD_ENV)?;
            let result = bank.admin.create_account(&name, &password);

            if json {
                return emit_json(result);
            }
            let view = result?;
            output::success(&format!("Account {} opened for {}.", view.number, view.name));
            output::info("Keep the account number: it is needed to log in.");
            Ok(())
        }
    }
}

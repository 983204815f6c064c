//! VaultBank CLI - accounts and ledger in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{account, admin, banking, doctor, logs, shell};
use vaultbank_core::AccountNumber;

/// VaultBank - accounts and ledger in your terminal
#[derive(Parser)]
#[command(name = "vb", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Admin operations (requires the admin password)
    Admin {
        #[command(subcommand)]
        command: admin::AdminCommands,
    },

    /// Open a new account
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Deposit into an account
    Deposit {
        /// Account number
        account: AccountNumber,
        /// Amount in whole units
        amount: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Withdraw from an account
    Withdraw {
        /// Account number
        account: AccountNumber,
        /// Amount in whole units
        amount: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transfer to another account
    Transfer {
        /// Source account number
        account: AccountNumber,
        /// Destination account number
        to: AccountNumber,
        /// Amount in whole units
        amount: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show account details
    Details {
        /// Account number
        account: AccountNumber,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the transaction history of an account
    History {
        /// Account number
        account: AccountNumber,
        /// Export to a CSV file instead of printing
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Enable two-factor authentication on an account
    #[command(name = "enable-2fa")]
    EnableTwoFactor {
        /// Account number
        account: AccountNumber,
    },

    /// Interactive menu
    Shell,

    /// Run ledger health checks (requires the admin password)
    Doctor {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the audit log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Admin { command } => admin::run(command),
        Commands::Account { command } => account::run(command),
        Commands::Deposit { account, amount, json } => banking::deposit(account, amount, json),
        Commands::Withdraw { account, amount, json } => banking::withdraw(account, amount, json),
        Commands::Transfer { account, to, amount, json } => banking::transfer(account, to, amount, json),
        Commands::Details { account, json } => banking::details(account, json),
        Commands::History { account, csv, json } => banking::history(account, csv, json),
        Commands::EnableTwoFactor { account } => banking::enable_two_factor(account),
        Commands::Shell => shell::run(),
        Commands::Doctor { verbose, json } => doctor::run(verbose, json),
        Commands::Logs { command } => logs::run(command),
    }
}

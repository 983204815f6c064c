//! Logs command - view and manage the audit log

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::Cell;
use dialoguer::Confirm;
use vaultbank_core::{AccountNumber, AuditLog, VaultBank};

use super::{admin_login, get_context};
use crate::output;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent audit entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Only entries concerning this account
        #[arg(long)]
        account: Option<AccountNumber>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear old audit entries
    Clear {
        /// Delete entries older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u32,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show audit statistics and database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn audit_log(bank: &VaultBank) -> Result<Arc<AuditLog>> {
    bank.audit
        .log()
        .cloned()
        .context("The audit log is unavailable")
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(command: LogsCommands) -> Result<()> {
    let bank = get_context()?;
    let _admin = admin_login(&bank)?;
    let log = audit_log(&bank)?;

    match command {
        LogsCommands::List { limit, account, json } => {
            let entries = match account {
                Some(number) => log.for_account(number, limit)?,
                None => log.get_recent(limit)?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("No audit entries found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Actor", "Event", "Account", "Detail"]);

            for entry in entries {
                let detail = match (&entry.detail, &entry.error_message) {
                    (_, Some(err)) => err.red().to_string(),
                    (Some(detail), None) => detail.clone(),
                    (None, None) => String::new(),
                };
                table.add_row(vec![
                    Cell::new(format_timestamp(entry.timestamp)),
                    Cell::new(&entry.actor),
                    Cell::new(&entry.event),
                    Cell::new(entry.account_number.map(|n| n.to_string()).unwrap_or_default()),
                    Cell::new(detail),
                ]);
            }

            println!("{}", table);
        }

        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => {
            let cutoff_ms = (Utc::now() - Duration::days(i64::from(older_than_days))).timestamp_millis();

            if !force && !json {
                if atty::isnt(atty::Stream::Stdin) {
                    bail!("Refusing to continue without --force when stdin is not a terminal");
                }
                if !Confirm::new()
                    .with_prompt(format!("Delete audit entries older than {} days?", older_than_days))
                    .default(false)
                    .interact()?
                {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let deleted = log.delete_before(cutoff_ms)?;

            if json {
                println!("{}", serde_json::json!({"deleted": deleted}));
            } else {
                println!("Deleted {} audit entries", deleted);
            }
        }

        LogsCommands::Stats { json } => {
            let total = log.count()?;
            let by_event = log.counts_by_event()?;
            let db_path = log.db_path().map(|p| p.to_path_buf());
            let size_bytes = db_path
                .as_ref()
                .and_then(|p| std::fs::metadata(p).ok())
                .map(|m| m.len())
                .unwrap_or(0);

            if json {
                let events: serde_json::Map<String, serde_json::Value> = by_event
                    .iter()
                    .map(|(event, count)| (event.clone(), serde_json::json!(count)))
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "total_entries": total,
                        "events": events,
                        "database_path": db_path.as_ref().map(|p| p.to_string_lossy()),
                        "database_size_bytes": size_bytes
                    })
                );
            } else {
                println!("{}", "Audit Statistics".bold());
                println!("  Total entries: {}", total);
                for (event, count) in &by_event {
                    println!("    {}: {}", event, count);
                }
                if let Some(path) = &db_path {
                    println!("  Database: {}", path.display());
                }
                println!("  Size: {} bytes", size_bytes);
            }
        }
    }

    Ok(())
}

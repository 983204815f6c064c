//! Doctor command - run ledger health checks

use anyhow::{bail, Result};
use colored::Colorize;
use comfy_table::{Cell, Color};
use serde_json::Value;
use vaultbank_core::DoctorResult;

use super::{admin_login, get_context};
use crate::output;

/// Format a detail JSON value for display
fn format_detail(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}: {}", k, s),
                _ => format!("{}: {}", k, v),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

/// Render a health check result as a table plus a summary line
pub fn print_result(result: &DoctorResult, verbose: bool) {
    println!("{}", "Ledger Health Check".bold());
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["Check", "Status", "Message"]);

    for (check_name, check_result) in &result.checks {
        let status_cell = match check_result.status.as_str() {
            "pass" => Cell::new("PASS").fg(Color::Green),
            "warning" => Cell::new("WARN").fg(Color::Yellow),
            "error" => Cell::new("ERROR").fg(Color::Red),
            _ => Cell::new(&check_result.status),
        };

        table.add_row(vec![
            Cell::new(check_name),
            status_cell,
            Cell::new(&check_result.message),
        ]);

        if verbose {
            if let Some(details) = &check_result.details {
                for detail in details {
                    table.add_row(vec![
                        Cell::new(""),
                        Cell::new(""),
                        Cell::new(format!("  - {}", format_detail(detail))),
                    ]);
                }
            }
        }
    }

    println!("{}", table);
    println!();

    println!(
        "Summary: {} passed, {} warnings, {} errors",
        result.summary.passed.to_string().green(),
        result.summary.warnings.to_string().yellow(),
        result.summary.errors.to_string().red(),
    );
}

pub fn run(verbose: bool, json: bool) -> Result<()> {
    let bank = get_context()?;
    let admin = admin_login(&bank)?;
    let result = bank.admin.diagnose(&admin)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, verbose);
    }

    if !result.is_healthy() {
        bail!("{} health check(s) failed", result.summary.errors);
    }
    Ok(())
}

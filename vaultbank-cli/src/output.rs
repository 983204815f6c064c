//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use vaultbank_core::{AccountView, Transaction};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn status_cell(view: &AccountView) -> Cell {
    if view.locked {
        Cell::new("LOCKED").fg(Color::Red)
    } else {
        Cell::new("active").fg(Color::Green)
    }
}

/// Print one account as a two-column table
pub fn account(view: &AccountView) {
    let mut table = create_table();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec![Cell::new("Account"), Cell::new(view.number)]);
    table.add_row(vec![Cell::new("Name"), Cell::new(&view.name)]);
    table.add_row(vec![Cell::new("Balance"), Cell::new(view.balance)]);
    table.add_row(vec![Cell::new("Total deposited"), Cell::new(view.total_deposited)]);
    table.add_row(vec![Cell::new("Total withdrawn"), Cell::new(view.total_withdrawn)]);
    table.add_row(vec![Cell::new("Total transferred"), Cell::new(view.total_transferred)]);
    table.add_row(vec![Cell::new("Failed passwords"), Cell::new(view.password_attempts)]);
    table.add_row(vec![Cell::new("Failed codes"), Cell::new(view.code_attempts)]);
    table.add_row(vec![
        Cell::new("Two-factor"),
        Cell::new(if view.two_factor_enabled { "enabled" } else { "disabled" }),
    ]);
    table.add_row(vec![Cell::new("Status"), status_cell(view)]);
    table.add_row(vec![
        Cell::new("Opened"),
        Cell::new(view.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
    ]);
    println!("{}", table);
}

/// Print a list of accounts, one per row
pub fn accounts(views: &[AccountView]) {
    let mut table = create_table();
    table.set_header(vec!["Account", "Name", "Balance", "2FA", "Status"]);
    for view in views {
        table.add_row(vec![
            Cell::new(view.number),
            Cell::new(&view.name),
            Cell::new(view.balance),
            Cell::new(if view.two_factor_enabled { "yes" } else { "no" }),
            status_cell(view),
        ]);
    }
    println!("{}", table);
}

/// Print ledger entries, oldest first
pub fn transactions(entries: &[Transaction]) {
    let mut table = create_table();
    table.set_header(vec!["ID", "Date", "Kind", "Amount"]);
    for entry in entries {
        let amount = if entry.amount < 0 {
            Cell::new(entry.amount).fg(Color::Red)
        } else {
            Cell::new(entry.amount).fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new(entry.id),
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(entry.kind),
            amount,
        ]);
    }
    println!("{}", table);
}

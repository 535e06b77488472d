//! Output formatting utilities

use colored::{ColoredString, Colorize};
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use rust_decimal::Decimal;
use serde::Serialize;

use cardledger_core::{DisplayStatus, OperationResult};

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

/// Print data wrapped in a success envelope
pub fn json_ok<T: Serialize>(data: T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&OperationResult::ok(data))?);
    Ok(())
}

/// Print a failure envelope on stdout
pub fn json_failure(err: &anyhow::Error) {
    let envelope: OperationResult<()> = match err.downcast_ref::<cardledger_core::Error>() {
        Some(core) => OperationResult::fail(core),
        None => OperationResult {
            success: false,
            data: None,
            error: Some(format!("{:#}", err)),
            error_kind: None,
        },
    };
    match serde_json::to_string_pretty(&envelope) {
        Ok(text) => println!("{}", text),
        Err(_) => eprintln!("{:#}", err),
    }
}

pub fn format_money(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {}", amount, currency)
}

pub fn colored_status(status: DisplayStatus) -> ColoredString {
    match status {
        DisplayStatus::Active => status.as_str().green(),
        DisplayStatus::Blocked => status.as_str().red(),
        DisplayStatus::Expired => status.as_str().yellow(),
    }
}

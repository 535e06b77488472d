//! Status command - show the owner's card and transfer summary

use anyhow::Result;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use uuid::Uuid;

use super::{get_context, require_owner};
use crate::output;

pub fn run(owner: Option<Uuid>, json: bool) -> Result<()> {
    let owner = require_owner(owner)?;
    let ctx = get_context()?;
    let status = ctx.status_service.summary(owner)?;

    if json {
        return output::json_ok(status);
    }

    println!("{}", "Card Ledger Status".bold());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec!["Cards".to_string(), status.total_cards.to_string()]);
    for (card_type, count) in &status.cards_by_type {
        table.add_row(vec![format!("  {}", card_type), count.to_string()]);
    }
    for (card_status, count) in &status.cards_by_status {
        table.add_row(vec![format!("  {}", card_status), count.to_string()]);
    }
    table.add_row(vec!["Transfers".to_string(), status.total_transfers.to_string()]);

    println!("{}", table);

    if !status.balances.is_empty() {
        println!();
        println!("{}", "Balances".bold());
        for balance in &status.balances {
            println!(
                "  {}",
                output::format_money(balance.total, &balance.currency)
            );
        }
    }

    Ok(())
}

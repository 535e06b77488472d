//! Transfer commands - move funds and inspect transfer history

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use rust_decimal::Decimal;
use uuid::Uuid;

use cardledger_core::{PageRequest, Transaction, TransferRequest};

use super::{get_context, require_owner};
use crate::output;

#[derive(Subcommand)]
pub enum TransferCommands {
    /// Move funds from one of the owner's cards to another
    Send {
        /// Source card
        from: Uuid,
        /// Destination card
        to: Uuid,
        /// Amount to move
        amount: Decimal,
        /// Currency of the amount; must match both cards
        #[arg(long)]
        currency: String,
        /// Free-text note stored with the transfer
        #[arg(long)]
        description: Option<String>,
    },

    /// Show one transfer
    Show {
        transaction_id: Uuid,
    },

    /// List the owner's transfers, newest first
    List {
        /// Zero-based page number
        #[arg(long, default_value = "0")]
        page: usize,
        /// Page size (1-100)
        #[arg(long, default_value = "20")]
        size: usize,
    },
}

impl TransferCommands {
    pub fn name(&self) -> &'static str {
        match self {
            TransferCommands::Send { .. } => "transfer send",
            TransferCommands::Show { .. } => "transfer show",
            TransferCommands::List { .. } => "transfer list",
        }
    }
}

pub fn run(command: TransferCommands, owner: Option<Uuid>, json: bool) -> Result<()> {
    let owner = require_owner(owner)?;
    let ctx = get_context()?;

    match command {
        TransferCommands::Send {
            from,
            to,
            amount,
            currency,
            description,
        } => {
            let mut request = TransferRequest::new(from, to, amount, currency);
            if let Some(text) = description {
                request = request.with_description(text);
            }

            let transaction = ctx.transfers.transfer(owner, &request)?;

            if json {
                return output::json_ok(transaction);
            }
            output::success(&format!(
                "Transferred {}",
                output::format_money(transaction.amount, &transaction.currency)
            ));
            println!("  Reference: {}", transaction.reference);
            println!("  Transaction: {}", transaction.id);
        }
        TransferCommands::Show { transaction_id } => {
            let transaction = ctx.transfers.get_transfer_details(transaction_id, owner)?;

            if json {
                return output::json_ok(transaction);
            }
            print_transaction(&transaction);
        }
        TransferCommands::List { page, size } => {
            let transfers = ctx
                .transfers
                .list_transfers(owner, PageRequest::new(page, size))?;

            if json {
                return output::json_ok(transfers);
            }

            if transfers.is_empty() {
                println!("No transfers found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Reference", "Date", "From", "To", "Amount", "Status"]);
            for tx in &transfers.items {
                table.add_row(vec![
                    tx.reference.clone(),
                    tx.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    tx.from_card_id.map(short_id).unwrap_or_default(),
                    short_id(tx.to_card_id),
                    output::format_money(tx.amount, &tx.currency),
                    tx.status.to_string(),
                ]);
            }
            println!("{}", table);
            println!(
                "{}",
                format!(
                    "Page {} of {} ({} transfers)",
                    transfers.page + 1,
                    transfers.total_pages.max(1),
                    transfers.total_items
                )
                .dimmed()
            );
        }
    }

    Ok(())
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn print_transaction(tx: &Transaction) {
    let mut table = output::create_table();
    table.add_row(vec!["ID".to_string(), tx.id.to_string()]);
    table.add_row(vec!["Reference".to_string(), tx.reference.clone()]);
    table.add_row(vec![
        "From".to_string(),
        tx.from_card_id.map(|id| id.to_string()).unwrap_or_default(),
    ]);
    table.add_row(vec!["To".to_string(), tx.to_card_id.to_string()]);
    table.add_row(vec![
        "Amount".to_string(),
        output::format_money(tx.amount, &tx.currency),
    ]);
    table.add_row(vec!["Fee".to_string(), output::format_money(tx.fee, &tx.currency)]);
    table.add_row(vec!["Status".to_string(), tx.status.to_string()]);
    table.add_row(vec![
        "Description".to_string(),
        tx.description.clone().unwrap_or_default(),
    ]);
    table.add_row(vec![
        "Created".to_string(),
        tx.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    ]);
    println!("{}", table);
}

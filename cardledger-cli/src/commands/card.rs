//! Card commands - open, list, inspect, block and delete cards

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use rust_decimal::Decimal;
use uuid::Uuid;

use cardledger_core::{
    CardFilter, CardStatus, CardType, CardView, NewCard, Page, PageRequest,
};

use super::{get_context, require_owner};
use crate::output;

#[derive(Subcommand)]
pub enum CardCommands {
    /// Open a new card
    New {
        /// Cardholder name
        #[arg(long)]
        holder: String,
        /// Card type (debit, credit)
        #[arg(long = "type", default_value = "debit")]
        card_type: CardType,
        /// Three-letter currency code
        #[arg(long)]
        currency: String,
        /// Opening balance
        #[arg(long, default_value = "0")]
        balance: Decimal,
        /// Expiration date (YYYY-MM-DD); defaults to the configured validity
        #[arg(long)]
        expires: Option<NaiveDate>,
    },

    /// List cards with optional filters
    List {
        /// Persisted status (active, blocked)
        #[arg(long)]
        status: Option<CardStatus>,
        /// Card type (debit, credit)
        #[arg(long = "type")]
        card_type: Option<CardType>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        min_balance: Option<Decimal>,
        #[arg(long)]
        max_balance: Option<Decimal>,
        /// Expiring on or after (YYYY-MM-DD)
        #[arg(long)]
        expires_from: Option<NaiveDate>,
        /// Expiring on or before (YYYY-MM-DD)
        #[arg(long)]
        expires_to: Option<NaiveDate>,
        /// Only expired cards (true) or only unexpired cards (false)
        #[arg(long)]
        expired: Option<bool>,
        /// Created after (RFC 3339)
        #[arg(long)]
        created_after: Option<DateTime<Utc>>,
        /// Created before (RFC 3339)
        #[arg(long)]
        created_before: Option<DateTime<Utc>>,
        /// Zero-based page number
        #[arg(long, default_value = "0")]
        page: usize,
        /// Page size (1-100)
        #[arg(long, default_value = "20")]
        size: usize,
    },

    /// Show one card
    Show {
        card_id: Uuid,
    },

    /// Show a card's balance
    Balance {
        card_id: Uuid,
    },

    /// Block an active card
    Block {
        card_id: Uuid,
    },

    /// Delete a blocked card with zero balance
    Delete {
        card_id: Uuid,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl CardCommands {
    pub fn name(&self) -> &'static str {
        match self {
            CardCommands::New { .. } => "card new",
            CardCommands::List { .. } => "card list",
            CardCommands::Show { .. } => "card show",
            CardCommands::Balance { .. } => "card balance",
            CardCommands::Block { .. } => "card block",
            CardCommands::Delete { .. } => "card delete",
        }
    }
}

pub fn run(command: CardCommands, owner: Option<Uuid>, json: bool) -> Result<()> {
    let owner = require_owner(owner)?;
    let ctx = get_context()?;

    match command {
        CardCommands::New {
            holder,
            card_type,
            currency,
            balance,
            expires,
        } => {
            let mut request = NewCard::new(holder, card_type, currency, balance);
            if let Some(date) = expires {
                request = request.expiring_on(date);
            }

            let card = ctx.ledger.create(owner, &request)?;
            let view = ctx.ledger.view(&card)?;

            if json {
                return output::json_ok(view);
            }
            output::success("Card created");
            print_card(&view);
        }
        CardCommands::List {
            status,
            card_type,
            currency,
            min_balance,
            max_balance,
            expires_from,
            expires_to,
            expired,
            created_after,
            created_before,
            page,
            size,
        } => {
            let filter = CardFilter {
                status,
                card_type,
                currency,
                min_balance,
                max_balance,
                expires_from,
                expires_to,
                expired,
                created_after,
                created_before,
            };
            let cards = ctx
                .ledger
                .list_views(owner, &filter, PageRequest::new(page, size))?;

            if json {
                return output::json_ok(cards);
            }
            print_card_page(&cards);
        }
        CardCommands::Show { card_id } => {
            let card = ctx.ledger.get_details(card_id, owner)?;
            let view = ctx.ledger.view(&card)?;

            if json {
                return output::json_ok(view);
            }
            print_card(&view);
        }
        CardCommands::Balance { card_id } => {
            let balance = ctx.ledger.get_balance(card_id, owner)?;

            if json {
                return output::json_ok(balance);
            }
            println!(
                "{}  (updated {})",
                output::format_money(balance.balance, &balance.currency).bold(),
                balance.last_updated.format("%Y-%m-%d %H:%M:%S")
            );
        }
        CardCommands::Block { card_id } => {
            let card = ctx.ledger.block(card_id, owner)?;
            let view = ctx.ledger.view(&card)?;

            if json {
                return output::json_ok(view);
            }
            output::success(&format!("Card {} blocked", view.masked_number));
        }
        CardCommands::Delete { card_id, force } => {
            if !force && !json {
                let card = ctx.ledger.get_details(card_id, owner)?;
                let view = ctx.ledger.view(&card)?;
                output::warning(&format!(
                    "This will permanently delete card {}.",
                    view.masked_number
                ));
                println!("{}", "Transfers involving it remain in the history.".dimmed());

                if !Confirm::new()
                    .with_prompt("Are you sure?")
                    .default(false)
                    .interact()?
                {
                    println!("{}", "Cancelled".dimmed());
                    return Ok(());
                }
            }

            ctx.ledger.delete(card_id, owner)?;

            if json {
                return output::json_ok(serde_json::json!({ "deleted": card_id }));
            }
            output::success(&format!("Card {} deleted", card_id));
        }
    }

    Ok(())
}

fn print_card(view: &CardView) {
    let mut table = output::create_table();
    table.add_row(vec!["ID".to_string(), view.id.to_string()]);
    table.add_row(vec!["Number".to_string(), view.masked_number.clone()]);
    table.add_row(vec!["Holder".to_string(), view.holder_name.clone()]);
    table.add_row(vec!["Type".to_string(), view.card_type.to_string()]);
    table.add_row(vec![
        "Status".to_string(),
        output::colored_status(view.status).to_string(),
    ]);
    table.add_row(vec![
        "Balance".to_string(),
        output::format_money(view.balance, &view.currency),
    ]);
    table.add_row(vec![
        "Expires".to_string(),
        view.expiration_date.to_string(),
    ]);
    table.add_row(vec![
        "Created".to_string(),
        view.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    ]);
    println!("{}", table);
}

fn print_card_page(page: &Page<CardView>) {
    if page.is_empty() {
        println!("No cards found.");
        return;
    }

    let mut table = output::create_table();
    table.set_header(vec!["ID", "Number", "Holder", "Type", "Status", "Balance", "Expires"]);
    for card in &page.items {
        table.add_row(vec![
            card.id.to_string(),
            card.masked_number.clone(),
            card.holder_name.clone(),
            card.card_type.to_string(),
            output::colored_status(card.status).to_string(),
            output::format_money(card.balance, &card.currency),
            card.expiration_date.to_string(),
        ]);
    }
    println!("{}", table);
    println!(
        "{}",
        format!(
            "Page {} of {} ({} cards)",
            page.page + 1,
            page.total_pages.max(1),
            page.total_items
        )
        .dimmed()
    );
}

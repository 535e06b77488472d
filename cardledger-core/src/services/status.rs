//! Status service - per-owner card and transfer summaries

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::ports::Repository;
use crate::services::ledger::today;

pub struct StatusService {
    repository: Arc<dyn Repository>,
}

impl StatusService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Summarize an owner's cards and transfers
    pub fn summary(&self, owner_id: Uuid) -> Result<StatusSummary> {
        let cards = self.repository.cards_for_owner(owner_id)?;
        let total_transfers = self.repository.count_transactions_for_owner(owner_id)?;
        let today = today();

        let mut by_type = BTreeMap::new();
        let mut by_status = BTreeMap::new();
        let mut balances: BTreeMap<String, Decimal> = BTreeMap::new();
        for card in &cards {
            *by_type.entry(card.card_type.to_string()).or_insert(0) += 1;
            *by_status
                .entry(card.display_status(today).to_string())
                .or_insert(0) += 1;
            *balances.entry(card.currency.clone()).or_default() += card.balance;
        }

        Ok(StatusSummary {
            total_cards: cards.len(),
            cards_by_type: by_type,
            cards_by_status: by_status,
            balances: balances
                .into_iter()
                .map(|(currency, total)| CurrencyBalance { currency, total })
                .collect(),
            total_transfers,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_cards: usize,
    pub cards_by_type: BTreeMap<String, usize>,
    pub cards_by_status: BTreeMap<String, usize>,
    pub balances: Vec<CurrencyBalance>,
    pub total_transfers: usize,
}

#[derive(Debug, Serialize)]
pub struct CurrencyBalance {
    pub currency: String,
    pub total: Decimal,
}

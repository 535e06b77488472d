//! Read models handed to upstream callers
//!
//! Views never carry ciphertext or the CVV. The card number only appears
//! masked.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::card::{Card, CardType, DisplayStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardView {
    pub id: Uuid,
    pub masked_number: String,
    pub holder_name: String,
    pub expiration_date: NaiveDate,
    pub balance: Decimal,
    pub currency: String,
    pub status: DisplayStatus,
    pub card_type: CardType,
    pub is_expired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CardView {
    pub fn new(card: &Card, masked_number: String, today: NaiveDate) -> Self {
        Self {
            id: card.id,
            masked_number,
            holder_name: card.holder_name.clone(),
            expiration_date: card.expiration_date,
            balance: card.balance,
            currency: card.currency.clone(),
            status: card.display_status(today),
            card_type: card.card_type,
            is_expired: card.is_expired(today),
            created_at: card.created_at,
            updated_at: card.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceView {
    pub card_id: Uuid,
    pub balance: Decimal,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
}

impl From<&Card> for BalanceView {
    fn from(card: &Card) -> Self {
        Self {
            card_id: card.id,
            balance: card.balance,
            currency: card.currency.clone(),
            last_updated: card.updated_at,
        }
    }
}

//! Transaction domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a transfer description, in characters
pub const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Immutable audit record of a completed transfer
///
/// Cards are referenced by id only. `owner_id` is the holder of both cards
/// at transfer time, so scoped lookups keep working after a card is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Public, human-referenceable transaction reference
    pub reference: String,
    pub owner_id: Uuid,
    /// Absent for deposits; always set for transfers
    pub from_card_id: Option<Uuid>,
    pub to_card_id: Uuid,
    pub amount: Decimal,
    pub fee: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Record of a transfer that has been applied to both cards
    pub fn completed_transfer(
        reference: String,
        owner_id: Uuid,
        from_card_id: Uuid,
        to_card_id: Uuid,
        amount: Decimal,
        currency: &str,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id: Uuid::new_v4(),
            reference,
            owner_id,
            from_card_id: Some(from_card_id),
            to_card_id,
            amount,
            fee: Decimal::ZERO,
            currency: currency.to_string(),
            status: TransactionStatus::Completed,
            description,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a public reference: `TXN_<unix millis>_<8 hex chars>`
    pub fn format_reference(at: DateTime<Utc>, entropy: [u8; 4]) -> String {
        format!(
            "TXN_{}_{}",
            at.timestamp_millis(),
            hex::encode_upper(entropy)
        )
    }

    pub fn is_successful(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    /// True if the transaction touches the given card on either side
    pub fn involves(&self, card_id: Uuid) -> bool {
        self.to_card_id == card_id || self.from_card_id == Some(card_id)
    }

    /// Normalize an optional description: trim, drop if blank
    pub fn normalize_description(description: Option<&str>) -> Option<String> {
        description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }
}

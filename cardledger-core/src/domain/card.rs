//! Card domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, NaiveDate, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of the holder name, in characters
pub const MAX_HOLDER_NAME_LEN: usize = 100;

/// Decimal places kept for balances and amounts
pub const MONEY_SCALE: u32 = 2;

/// Persisted card status. Expiry is derived from the date, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    Active,
    Blocked,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "ACTIVE",
            CardStatus::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ACTIVE" => Ok(CardStatus::Active),
            "BLOCKED" => Ok(CardStatus::Blocked),
            other => Err(format!("unknown card status: {}", other)),
        }
    }
}

/// Status shown to callers, including the derived EXPIRED state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayStatus {
    Active,
    Blocked,
    Expired,
}

impl DisplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayStatus::Active => "ACTIVE",
            DisplayStatus::Blocked => "BLOCKED",
            DisplayStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardType {
    Debit,
    Credit,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Debit => "DEBIT",
            CardType::Credit => "CREDIT",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEBIT" => Ok(CardType::Debit),
            "CREDIT" => Ok(CardType::Credit),
            other => Err(format!("unknown card type: {}", other)),
        }
    }
}

/// A balance-bearing card owned by exactly one account holder
///
/// The card number and CVV are only ever held in encrypted form here;
/// plaintext exists inside the crypto boundary and in masked views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub number_encrypted: String,
    pub cvv_encrypted: String,
    pub holder_name: String,
    pub expiration_date: NaiveDate,
    pub balance: Decimal,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    pub status: CardStatus,
    pub card_type: CardType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Create a new active card
    ///
    /// Inputs are expected to be validated already (see [`Card::validate`]).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner_id: Uuid,
        number_encrypted: String,
        cvv_encrypted: String,
        holder_name: impl Into<String>,
        card_type: CardType,
        currency: &str,
        balance: Decimal,
        expiration_date: NaiveDate,
    ) -> Self {
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id: Uuid::new_v4(),
            owner_id,
            number_encrypted,
            cvv_encrypted,
            holder_name: holder_name.into().trim().to_string(),
            expiration_date,
            balance,
            currency: Self::normalize_currency(currency),
            status: CardStatus::Active,
            card_type,
            created_at: now,
            updated_at: now,
        }
    }

    /// Default expiration: `years` after the given date
    pub fn default_expiration(from: NaiveDate, years: u32) -> NaiveDate {
        from.checked_add_months(Months::new(years * 12))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Check a currency code is three ASCII letters
    pub fn validate_currency(currency: &str) -> Result<(), &'static str> {
        let code = currency.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err("currency must be a 3-letter code");
        }
        Ok(())
    }

    /// Check a monetary amount fits the stored scale
    pub fn validate_scale(amount: Decimal) -> Result<(), &'static str> {
        if amount.normalize().scale() > MONEY_SCALE {
            return Err("amount has more than 2 decimal places");
        }
        Ok(())
    }

    /// Validate card data
    pub fn validate(&self) -> Result<(), &'static str> {
        let name = self.holder_name.trim();
        if name.is_empty() {
            return Err("holder name cannot be empty");
        }
        if name.chars().count() > MAX_HOLDER_NAME_LEN {
            return Err("holder name must not exceed 100 characters");
        }
        Self::validate_currency(&self.currency)?;
        if self.balance < Decimal::ZERO {
            return Err("balance cannot be negative");
        }
        Self::validate_scale(self.balance)?;
        Ok(())
    }

    pub fn is_blocked(&self) -> bool {
        self.status == CardStatus::Blocked
    }

    /// True once `today` is past the expiration date
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        today > self.expiration_date
    }

    pub fn display_status(&self, today: NaiveDate) -> DisplayStatus {
        match self.status {
            CardStatus::Blocked => DisplayStatus::Blocked,
            CardStatus::Active if self.is_expired(today) => DisplayStatus::Expired,
            CardStatus::Active => DisplayStatus::Active,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now().trunc_subsecs(6);
    }
}

//! Card query filter - owner-scoped conjunctive predicates over cards
//!
//! A [`CardFilter`] is what a caller asks for. [`CardPredicate::build`] turns
//! it into a flat list of [`CardCondition`]s that are AND-ed together. The
//! owner condition is always first and always present; every other field
//! contributes a condition only when it is set.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::card::{Card, CardStatus, CardType};

/// Optional listing constraints supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardFilter {
    pub status: Option<CardStatus>,
    pub card_type: Option<CardType>,
    pub currency: Option<String>,
    pub min_balance: Option<Decimal>,
    pub max_balance: Option<Decimal>,
    pub expires_from: Option<NaiveDate>,
    pub expires_to: Option<NaiveDate>,
    /// Derived expiry flag, evaluated against the date the predicate is built
    pub expired: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl CardFilter {
    pub fn with_status(mut self, status: CardStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, card_type: CardType) -> Self {
        self.card_type = Some(card_type);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_balance_range(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.min_balance = min;
        self.max_balance = max;
        self
    }

    pub fn with_expired(mut self, expired: bool) -> Self {
        self.expired = Some(expired);
        self
    }
}

/// A single constraint on a card
#[derive(Debug, Clone, PartialEq)]
pub enum CardCondition {
    Owner(Uuid),
    Status(CardStatus),
    Type(CardType),
    Currency(String),
    MinBalance(Decimal),
    MaxBalance(Decimal),
    ExpiresOnOrAfter(NaiveDate),
    ExpiresOnOrBefore(NaiveDate),
    /// `today > expiration_date` equals `expired`
    Expired { today: NaiveDate, expired: bool },
    CreatedAfter(DateTime<Utc>),
    CreatedBefore(DateTime<Utc>),
}

impl CardCondition {
    pub fn matches(&self, card: &Card) -> bool {
        match self {
            CardCondition::Owner(owner) => card.owner_id == *owner,
            CardCondition::Status(status) => card.status == *status,
            CardCondition::Type(card_type) => card.card_type == *card_type,
            CardCondition::Currency(currency) => card.currency == *currency,
            CardCondition::MinBalance(min) => card.balance >= *min,
            CardCondition::MaxBalance(max) => card.balance <= *max,
            CardCondition::ExpiresOnOrAfter(date) => card.expiration_date >= *date,
            CardCondition::ExpiresOnOrBefore(date) => card.expiration_date <= *date,
            CardCondition::Expired { today, expired } => card.is_expired(*today) == *expired,
            CardCondition::CreatedAfter(at) => card.created_at > *at,
            CardCondition::CreatedBefore(at) => card.created_at < *at,
        }
    }
}

/// Conjunction of card conditions, always scoped to one owner
#[derive(Debug, Clone, PartialEq)]
pub struct CardPredicate {
    owner_id: Uuid,
    conditions: Vec<CardCondition>,
}

impl CardPredicate {
    /// Build the predicate for an owner's listing
    pub fn build(owner_id: Uuid, filter: &CardFilter, today: NaiveDate) -> Self {
        let mut conditions = vec![CardCondition::Owner(owner_id)];

        if let Some(status) = filter.status {
            conditions.push(CardCondition::Status(status));
        }
        if let Some(card_type) = filter.card_type {
            conditions.push(CardCondition::Type(card_type));
        }
        if let Some(currency) = &filter.currency {
            conditions.push(CardCondition::Currency(Card::normalize_currency(currency)));
        }
        if let Some(min) = filter.min_balance {
            conditions.push(CardCondition::MinBalance(min));
        }
        if let Some(max) = filter.max_balance {
            conditions.push(CardCondition::MaxBalance(max));
        }
        if let Some(from) = filter.expires_from {
            conditions.push(CardCondition::ExpiresOnOrAfter(from));
        }
        if let Some(to) = filter.expires_to {
            conditions.push(CardCondition::ExpiresOnOrBefore(to));
        }
        if let Some(expired) = filter.expired {
            conditions.push(CardCondition::Expired { today, expired });
        }
        if let Some(after) = filter.created_after {
            conditions.push(CardCondition::CreatedAfter(after));
        }
        if let Some(before) = filter.created_before {
            conditions.push(CardCondition::CreatedBefore(before));
        }

        Self {
            owner_id,
            conditions,
        }
    }

    /// Predicate matching every card of an owner
    pub fn owner_only(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            conditions: vec![CardCondition::Owner(owner_id)],
        }
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn conditions(&self) -> &[CardCondition] {
        &self.conditions
    }

    pub fn matches(&self, card: &Card) -> bool {
        self.conditions.iter().all(|c| c.matches(card))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn card_for(owner: Uuid, currency: &str, balance: i64) -> Card {
        Card::new(
            owner,
            format!("v1:{}", Uuid::new_v4()),
            "v1:cvv".to_string(),
            "Holder",
            CardType::Debit,
            currency,
            Decimal::new(balance, 2),
            NaiveDate::from_ymd_opt(2027, 1, 15).unwrap(),
        )
    }

    #[test]
    fn test_empty_filter_scopes_to_owner_only() {
        let owner = Uuid::new_v4();
        let predicate = CardPredicate::build(owner, &CardFilter::default(), today());

        assert_eq!(predicate.conditions(), &[CardCondition::Owner(owner)]);
        assert!(predicate.matches(&card_for(owner, "USD", 0)));
        assert!(!predicate.matches(&card_for(Uuid::new_v4(), "USD", 0)));
    }

    #[test]
    fn test_present_fields_are_anded() {
        let owner = Uuid::new_v4();
        let filter = CardFilter::default()
            .with_status(CardStatus::Active)
            .with_type(CardType::Debit)
            .with_currency("eur");
        let predicate = CardPredicate::build(owner, &filter, today());

        assert_eq!(predicate.conditions().len(), 4);
        assert!(predicate.conditions().contains(&CardCondition::Currency("EUR".into())));
        assert!(predicate.matches(&card_for(owner, "EUR", 100)));
        assert!(!predicate.matches(&card_for(owner, "USD", 100)));

        let mut blocked = card_for(owner, "EUR", 100);
        blocked.status = CardStatus::Blocked;
        assert!(!predicate.matches(&blocked));
    }

    #[test]
    fn test_balance_range_is_inclusive() {
        let owner = Uuid::new_v4();
        let filter = CardFilter::default()
            .with_balance_range(Some(Decimal::new(1000, 2)), Some(Decimal::new(5000, 2)));
        let predicate = CardPredicate::build(owner, &filter, today());

        assert!(predicate.matches(&card_for(owner, "USD", 1000)));
        assert!(predicate.matches(&card_for(owner, "USD", 5000)));
        assert!(!predicate.matches(&card_for(owner, "USD", 999)));
        assert!(!predicate.matches(&card_for(owner, "USD", 5001)));
    }

    #[test]
    fn test_expired_flag_uses_build_date() {
        let owner = Uuid::new_v4();
        let mut old = card_for(owner, "USD", 0);
        old.expiration_date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let fresh = card_for(owner, "USD", 0);

        let expired = CardPredicate::build(owner, &CardFilter::default().with_expired(true), today());
        assert!(expired.matches(&old));
        assert!(!expired.matches(&fresh));

        let live = CardPredicate::build(owner, &CardFilter::default().with_expired(false), today());
        assert!(!live.matches(&old));
        assert!(live.matches(&fresh));
    }
}

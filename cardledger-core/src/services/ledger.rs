//! Card ledger - card lifecycle and read models
//!
//! Every lookup is scoped to the calling owner. A card that exists but
//! belongs to someone else is reported exactly like a missing card.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    BalanceView, Card, CardFilter, CardPredicate, CardStatus, CardType, CardView, Page,
    PageRequest, MAX_HOLDER_NAME_LEN,
};
use crate::ports::Repository;
use crate::services::crypto::CardCrypto;
use crate::services::issuer::CardNumberIssuer;
use crate::services::locks::CardLocks;

/// Request to open a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCard {
    pub holder_name: String,
    pub card_type: CardType,
    pub currency: String,
    pub initial_balance: Decimal,
    /// Defaults to today plus the configured validity
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

impl NewCard {
    pub fn new(
        holder_name: impl Into<String>,
        card_type: CardType,
        currency: impl Into<String>,
        initial_balance: Decimal,
    ) -> Self {
        Self {
            holder_name: holder_name.into(),
            card_type,
            currency: currency.into(),
            initial_balance,
            expiration_date: None,
        }
    }

    pub fn expiring_on(mut self, date: NaiveDate) -> Self {
        self.expiration_date = Some(date);
        self
    }
}

pub struct CardLedger {
    repository: Arc<dyn Repository>,
    crypto: Arc<CardCrypto>,
    issuer: CardNumberIssuer,
    locks: Arc<CardLocks>,
    validity_years: u32,
}

impl CardLedger {
    pub fn new(
        repository: Arc<dyn Repository>,
        crypto: Arc<CardCrypto>,
        issuer: CardNumberIssuer,
        locks: Arc<CardLocks>,
        validity_years: u32,
    ) -> Self {
        Self {
            repository,
            crypto,
            issuer,
            locks,
            validity_years,
        }
    }

    /// Open a new active card with a freshly issued number and CVV
    pub fn create(&self, owner_id: Uuid, request: &NewCard) -> Result<Card> {
        let today = today();
        Self::validate_new_card(request, today)?;

        let issued = self.issuer.issue()?;
        let cvv_encrypted = self.crypto.encrypt(&self.issuer.generate_cvv())?;
        let expiration = request
            .expiration_date
            .unwrap_or_else(|| Card::default_expiration(today, self.validity_years));

        let card = Card::new(
            owner_id,
            issued.encrypted,
            cvv_encrypted,
            request.holder_name.as_str(),
            request.card_type,
            &request.currency,
            request.initial_balance,
            expiration,
        );
        card.validate().map_err(Error::validation)?;
        self.repository.insert_card(&card)?;

        tracing::info!(
            card_id = %card.id,
            owner_id = %owner_id,
            card_type = %card.card_type,
            currency = %card.currency,
            "card created"
        );
        Ok(card)
    }

    fn validate_new_card(request: &NewCard, today: NaiveDate) -> Result<()> {
        let name = request.holder_name.trim();
        if name.is_empty() {
            return Err(Error::validation("holder name cannot be empty"));
        }
        if name.chars().count() > MAX_HOLDER_NAME_LEN {
            return Err(Error::validation(format!(
                "holder name must not exceed {} characters",
                MAX_HOLDER_NAME_LEN
            )));
        }
        Card::validate_currency(&request.currency).map_err(Error::validation)?;
        if request.initial_balance < Decimal::ZERO {
            return Err(Error::validation("initial balance cannot be negative"));
        }
        Card::validate_scale(request.initial_balance).map_err(Error::validation)?;
        if let Some(date) = request.expiration_date {
            if date <= today {
                return Err(Error::validation("expiration date must be in the future"));
            }
        }
        Ok(())
    }

    /// Block an active, unexpired card
    pub fn block(&self, card_id: Uuid, owner_id: Uuid) -> Result<Card> {
        let _guard = self.locks.lock(card_id);
        let mut card = self.get_details(card_id, owner_id)?;

        if card.is_blocked() {
            return Err(Error::card_operation("card is already blocked"));
        }
        if card.is_expired(today()) {
            return Err(Error::card_operation("cannot block an expired card"));
        }

        card.status = CardStatus::Blocked;
        card.touch();
        self.repository.update_card(&card)?;

        tracing::info!(card_id = %card_id, owner_id = %owner_id, "card blocked");
        Ok(card)
    }

    /// Delete an empty blocked card
    ///
    /// The guard reads the stored status, so an expired card that was never
    /// blocked stays. Transfer history referencing the card is kept.
    pub fn delete(&self, card_id: Uuid, owner_id: Uuid) -> Result<()> {
        let _guard = self.locks.lock(card_id);
        let card = self.get_details(card_id, owner_id)?;

        if card.balance > Decimal::ZERO {
            return Err(Error::card_operation("cannot delete a card with a positive balance"));
        }
        if card.status == CardStatus::Active {
            return Err(Error::card_operation("cannot delete an active card; block it first"));
        }

        self.repository.delete_card(card_id)?;
        tracing::info!(card_id = %card_id, owner_id = %owner_id, "card deleted");
        Ok(())
    }

    /// Owner-scoped point lookup
    pub fn get_details(&self, card_id: Uuid, owner_id: Uuid) -> Result<Card> {
        self.repository
            .find_card(card_id, owner_id)?
            .ok_or_else(|| Error::not_found(format!("Card {} not found", card_id)))
    }

    /// Page through the owner's cards matching `filter`
    pub fn list(&self, owner_id: Uuid, filter: &CardFilter, page: PageRequest) -> Result<Page<Card>> {
        for bound in [filter.min_balance, filter.max_balance].into_iter().flatten() {
            Card::validate_scale(bound).map_err(Error::validation)?;
        }
        if let (Some(min), Some(max)) = (filter.min_balance, filter.max_balance) {
            if min > max {
                return Err(Error::validation("min balance exceeds max balance"));
            }
        }
        if let Some(currency) = &filter.currency {
            Card::validate_currency(currency).map_err(Error::validation)?;
        }

        let predicate = CardPredicate::build(owner_id, filter, today());
        self.repository.query_cards(&predicate, page)
    }

    /// Masked read model of a card
    pub fn view(&self, card: &Card) -> Result<CardView> {
        let number = self.crypto.decrypt(&card.number_encrypted)?;
        Ok(CardView::new(card, CardCrypto::mask(&number), today()))
    }

    /// [`CardLedger::list`] mapped through [`CardLedger::view`]
    pub fn list_views(
        &self,
        owner_id: Uuid,
        filter: &CardFilter,
        page: PageRequest,
    ) -> Result<Page<CardView>> {
        self.list(owner_id, filter, page)?
            .try_map(|card| self.view(&card))
    }

    pub fn get_balance(&self, card_id: Uuid, owner_id: Uuid) -> Result<BalanceView> {
        let card = self.get_details(card_id, owner_id)?;
        Ok(BalanceView::from(&card))
    }

    /// All of an owner's cards, unpaged
    pub fn cards_for_owner(&self, owner_id: Uuid) -> Result<Vec<Card>> {
        self.repository.cards_for_owner(owner_id)
    }
}

/// The ledger's notion of the current date (UTC)
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryRepository;
    use crate::adapters::random::SeededRandom;
    use crate::config::IssuanceSettings;
    use crate::domain::result::ErrorKind;
    use crate::domain::DisplayStatus;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        crypto: Arc<CardCrypto>,
        ledger: CardLedger,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let crypto = Arc::new(CardCrypto::from_key([3u8; 32]));
        let issuer = CardNumberIssuer::new(
            Arc::clone(&crypto),
            repo.clone(),
            Arc::new(SeededRandom::new(11)),
            IssuanceSettings::default(),
        );
        let ledger = CardLedger::new(
            repo.clone(),
            Arc::clone(&crypto),
            issuer,
            Arc::new(CardLocks::new(16)),
            3,
        );
        Fixture { repo, crypto, ledger }
    }

    fn usd(amount: i64) -> NewCard {
        NewCard::new("Ada Lovelace", CardType::Debit, "usd", Decimal::new(amount, 2))
    }

    #[test]
    fn test_create_defaults() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let card = f.ledger.create(owner, &usd(100000)).unwrap();

        assert_eq!(card.status, CardStatus::Active);
        assert_eq!(card.currency, "USD");
        assert_eq!(card.owner_id, owner);
        assert_eq!(card.expiration_date, Card::default_expiration(today(), 3));

        let number = f.crypto.decrypt(&card.number_encrypted).unwrap();
        assert_eq!(number.len(), 19);
        let cvv = f.crypto.decrypt(&card.cvv_encrypted).unwrap();
        assert_eq!(cvv.len(), 3);
        assert!(cvv.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_create_validation() {
        let f = fixture();
        let owner = Uuid::new_v4();

        let negative = f.ledger.create(owner, &usd(-1)).unwrap_err();
        assert_eq!(negative.kind(), ErrorKind::Validation);

        let blank = NewCard::new("  ", CardType::Debit, "USD", Decimal::ZERO);
        assert!(f.ledger.create(owner, &blank).is_err());

        let bad_currency = NewCard::new("A", CardType::Debit, "US1", Decimal::ZERO);
        assert!(f.ledger.create(owner, &bad_currency).is_err());

        let fractional = NewCard::new("A", CardType::Debit, "USD", Decimal::new(1, 3));
        assert!(f.ledger.create(owner, &fractional).is_err());

        let past = usd(0).expiring_on(today());
        assert!(f.ledger.create(owner, &past).is_err());

        assert!(f.repo.cards_for_owner(owner).unwrap().is_empty());
    }

    #[test]
    fn test_block_transitions_once() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let card = f.ledger.create(owner, &usd(0)).unwrap();

        let blocked = f.ledger.block(card.id, owner).unwrap();
        assert_eq!(blocked.status, CardStatus::Blocked);

        let err = f.ledger.block(card.id, owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CardOperation);
        assert!(err.to_string().contains("already blocked"));
    }

    #[test]
    fn test_block_expired_card_rejected() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let mut card = f.ledger.create(owner, &usd(0)).unwrap();
        card.expiration_date = today().pred_opt().unwrap();
        f.repo.update_card(&card).unwrap();

        let err = f.ledger.block(card.id, owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CardOperation);
        assert_eq!(f.ledger.get_details(card.id, owner).unwrap().status, CardStatus::Active);
    }

    #[test]
    fn test_foreign_card_is_not_found() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let card = f.ledger.create(owner, &usd(0)).unwrap();

        assert_eq!(f.ledger.get_details(card.id, intruder).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(f.ledger.block(card.id, intruder).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(f.ledger.delete(card.id, intruder).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_delete_guards() {
        let f = fixture();
        let owner = Uuid::new_v4();

        let active = f.ledger.create(owner, &usd(0)).unwrap();
        let err = f.ledger.delete(active.id, owner).unwrap_err();
        assert!(err.to_string().contains("active"));

        let funded = f.ledger.create(owner, &usd(5000)).unwrap();
        f.ledger.block(funded.id, owner).unwrap();
        let err = f.ledger.delete(funded.id, owner).unwrap_err();
        assert!(err.to_string().contains("positive balance"));
        assert!(f.ledger.get_details(funded.id, owner).is_ok());

        f.ledger.block(active.id, owner).unwrap();
        f.ledger.delete(active.id, owner).unwrap();
        assert_eq!(f.ledger.get_details(active.id, owner).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_expired_unblocked_card_cannot_be_deleted() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let mut card = f.ledger.create(owner, &usd(0)).unwrap();
        card.expiration_date = today().pred_opt().unwrap();
        f.repo.update_card(&card).unwrap();

        let stored = f.ledger.get_details(card.id, owner).unwrap();
        assert_eq!(stored.status, CardStatus::Active);
        assert_eq!(stored.display_status(today()), DisplayStatus::Expired);

        let err = f.ledger.delete(card.id, owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CardOperation);
        assert!(f.ledger.get_details(card.id, owner).is_ok());
    }

    #[test]
    fn test_view_masks_number() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let card = f.ledger.create(owner, &usd(100)).unwrap();
        let number = f.crypto.decrypt(&card.number_encrypted).unwrap();

        let view = f.ledger.view(&card).unwrap();
        assert!(view.masked_number.starts_with("**** **** **** "));
        assert!(view.masked_number.ends_with(&number[15..]));
        assert_eq!(view.status, DisplayStatus::Active);

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains(&number));
        assert!(!json.contains(&card.cvv_encrypted));
    }

    #[test]
    fn test_list_filters_and_validates() {
        let f = fixture();
        let owner = Uuid::new_v4();
        f.ledger.create(owner, &usd(100)).unwrap();
        f.ledger
            .create(owner, &NewCard::new("B", CardType::Credit, "EUR", Decimal::ZERO))
            .unwrap();
        f.ledger.create(Uuid::new_v4(), &usd(100)).unwrap();

        let all = f.ledger.list(owner, &CardFilter::default(), PageRequest::default()).unwrap();
        assert_eq!(all.total_items, 2);

        let credit = f
            .ledger
            .list(owner, &CardFilter::default().with_type(CardType::Credit), PageRequest::default())
            .unwrap();
        assert_eq!(credit.total_items, 1);
        assert_eq!(credit.items[0].currency, "EUR");

        let inverted = CardFilter::default()
            .with_balance_range(Some(Decimal::new(10, 0)), Some(Decimal::new(1, 0)));
        assert!(f.ledger.list(owner, &inverted, PageRequest::default()).is_err());

        let views = f.ledger.list_views(owner, &CardFilter::default(), PageRequest::default()).unwrap();
        assert_eq!(views.items.len(), 2);
    }

    #[test]
    fn test_get_balance() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let card = f.ledger.create(owner, &usd(12345)).unwrap();
        let balance = f.ledger.get_balance(card.id, owner).unwrap();
        assert_eq!(balance.balance, Decimal::new(12345, 2));
        assert_eq!(balance.currency, "USD");
    }
}

//! Transfer engine - atomic balance moves between two cards of one owner
//!
//! Both cards stay locked from the first read until the commit returns, so
//! the balance checked for sufficient funds is the balance that gets
//! debited. The commit itself is guarded as well: the repository only
//! applies it if both stored balances still equal what was read.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Card, Page, PageRequest, Transaction, MAX_DESCRIPTION_LEN};
use crate::ports::{BalanceChange, RandomSource, Repository};
use crate::services::ledger::{today, CardLedger};
use crate::services::locks::CardLocks;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_card_id: Uuid,
    pub to_card_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferRequest {
    pub fn new(from_card_id: Uuid, to_card_id: Uuid, amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            from_card_id,
            to_card_id,
            amount,
            currency: currency.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub struct TransferEngine {
    ledger: Arc<CardLedger>,
    repository: Arc<dyn Repository>,
    locks: Arc<CardLocks>,
    random: Arc<dyn RandomSource>,
}

impl TransferEngine {
    pub fn new(
        ledger: Arc<CardLedger>,
        repository: Arc<dyn Repository>,
        locks: Arc<CardLocks>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            ledger,
            repository,
            locks,
            random,
        }
    }

    /// Move `amount` from one of the owner's cards to another
    ///
    /// Any error leaves both cards and the transaction log unchanged.
    pub fn transfer(&self, owner_id: Uuid, request: &TransferRequest) -> Result<Transaction> {
        let _guard = self.locks.lock_pair(request.from_card_id, request.to_card_id);

        let from = self.resolve(request.from_card_id, owner_id, "source")?;
        let to = self.resolve(request.to_card_id, owner_id, "destination")?;

        if let Err(e) = Self::validate(&from, &to, request) {
            tracing::info!(
                owner_id = %owner_id,
                from_card_id = %from.id,
                to_card_id = %to.id,
                amount = %request.amount,
                reason = e.kind().as_str(),
                "transfer rejected"
            );
            return Err(e);
        }

        let now = Utc::now().trunc_subsecs(6);
        let debit = BalanceChange::for_card(&from, from.balance - request.amount, now);
        let credit = BalanceChange::for_card(&to, to.balance + request.amount, now);

        let transaction = Transaction::completed_transfer(
            self.new_reference(),
            owner_id,
            from.id,
            to.id,
            request.amount,
            &from.currency,
            Transaction::normalize_description(request.description.as_deref()),
        );

        self.repository.apply_transfer(&debit, &credit, &transaction)?;

        tracing::info!(
            transaction_id = %transaction.id,
            reference = %transaction.reference,
            owner_id = %owner_id,
            from_card_id = %from.id,
            to_card_id = %to.id,
            amount = %transaction.amount,
            currency = %transaction.currency,
            "transfer completed"
        );
        Ok(transaction)
    }

    fn resolve(&self, card_id: Uuid, owner_id: Uuid, side: &str) -> Result<Card> {
        match self.ledger.get_details(card_id, owner_id) {
            Err(Error::NotFound(_)) => Err(Error::not_found(format!(
                "{} card {} not found",
                side, card_id
            ))),
            other => other,
        }
    }

    /// Business rules, checked in a fixed order; the first violation wins
    fn validate(from: &Card, to: &Card, request: &TransferRequest) -> Result<()> {
        if from.id == to.id {
            return Err(Error::validation("same card: source and destination must differ"));
        }

        if request.amount <= Decimal::ZERO {
            return Err(Error::validation("non-positive amount"));
        }
        Card::validate_scale(request.amount).map_err(Error::validation)?;

        let currency = Card::normalize_currency(&request.currency);
        if currency != from.currency || currency != to.currency {
            return Err(Error::validation(format!(
                "currency mismatch: request {}, source {}, destination {}",
                currency, from.currency, to.currency
            )));
        }

        for (side, card) in [("source", from), ("destination", to)] {
            if card.is_blocked() {
                return Err(Error::validation(format!("card blocked: {} card", side)));
            }
        }

        let today = today();
        for (side, card) in [("source", from), ("destination", to)] {
            if card.is_expired(today) {
                return Err(Error::validation(format!("card expired: {} card", side)));
            }
        }

        if from.balance < request.amount {
            return Err(Error::InsufficientFunds {
                requested: request.amount,
                available: from.balance,
            });
        }

        if let Some(description) = &request.description {
            if description.trim().chars().count() > MAX_DESCRIPTION_LEN {
                return Err(Error::validation(format!(
                    "description must not exceed {} characters",
                    MAX_DESCRIPTION_LEN
                )));
            }
        }

        Ok(())
    }

    fn new_reference(&self) -> String {
        let mut entropy = [0u8; 4];
        self.random.fill_bytes(&mut entropy);
        Transaction::format_reference(Utc::now(), entropy)
    }

    /// Owner-scoped lookup of a completed transfer
    pub fn get_transfer_details(&self, transaction_id: Uuid, owner_id: Uuid) -> Result<Transaction> {
        self.repository
            .find_transaction(transaction_id, owner_id)?
            .ok_or_else(|| Error::not_found(format!("Transfer {} not found", transaction_id)))
    }

    /// The owner's transfers, newest first
    pub fn list_transfers(&self, owner_id: Uuid, page: PageRequest) -> Result<Page<Transaction>> {
        self.repository.transactions_for_owner(owner_id, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryRepository;
    use crate::adapters::random::SeededRandom;
    use crate::config::IssuanceSettings;
    use crate::domain::result::ErrorKind;
    use crate::domain::{CardStatus, CardType};
    use crate::services::crypto::CardCrypto;
    use crate::services::issuer::CardNumberIssuer;
    use crate::services::ledger::NewCard;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        ledger: Arc<CardLedger>,
        engine: TransferEngine,
        owner: Uuid,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let crypto = Arc::new(CardCrypto::from_key([9u8; 32]));
        let random: Arc<dyn RandomSource> = Arc::new(SeededRandom::new(5));
        let locks = Arc::new(CardLocks::new(32));
        let issuer = CardNumberIssuer::new(
            Arc::clone(&crypto),
            repo.clone(),
            Arc::clone(&random),
            IssuanceSettings::default(),
        );
        let ledger = Arc::new(CardLedger::new(
            repo.clone(),
            crypto,
            issuer,
            Arc::clone(&locks),
            3,
        ));
        let engine = TransferEngine::new(Arc::clone(&ledger), repo.clone(), locks, random);
        Fixture {
            repo,
            ledger,
            engine,
            owner: Uuid::new_v4(),
        }
    }

    impl Fixture {
        fn card(&self, cents: i64, currency: &str) -> Card {
            self.ledger
                .create(
                    self.owner,
                    &NewCard::new("Holder", CardType::Debit, currency, Decimal::new(cents, 2)),
                )
                .unwrap()
        }

        fn balance(&self, card: &Card) -> Decimal {
            self.ledger.get_details(card.id, self.owner).unwrap().balance
        }
    }

    fn dollars(n: i64) -> Decimal {
        Decimal::new(n * 100, 2)
    }

    #[test]
    fn test_successful_transfer_conserves_funds() {
        let f = fixture();
        let a = f.card(100000, "USD");
        let b = f.card(50000, "USD");

        let tx = f
            .engine
            .transfer(f.owner, &TransferRequest::new(a.id, b.id, dollars(100), "USD"))
            .unwrap();

        assert!(tx.is_successful());
        assert_eq!(tx.from_card_id, Some(a.id));
        assert_eq!(tx.to_card_id, b.id);
        assert!(tx.reference.starts_with("TXN_"));
        assert_eq!(f.balance(&a), dollars(900));
        assert_eq!(f.balance(&b), dollars(600));
        assert_eq!(f.engine.get_transfer_details(tx.id, f.owner).unwrap(), tx);
    }

    #[test]
    fn test_validation_order() {
        let f = fixture();
        let a = f.card(1000, "USD");
        let b = f.card(1000, "USD");
        let eur = f.card(1000, "EUR");

        let same = f
            .engine
            .transfer(f.owner, &TransferRequest::new(a.id, a.id, Decimal::ZERO, "EUR"))
            .unwrap_err();
        assert!(same.to_string().contains("same card"));

        let zero = f
            .engine
            .transfer(f.owner, &TransferRequest::new(a.id, b.id, Decimal::ZERO, "EUR"))
            .unwrap_err();
        assert!(zero.to_string().contains("non-positive amount"));

        let mismatch = f
            .engine
            .transfer(f.owner, &TransferRequest::new(a.id, eur.id, dollars(1), "USD"))
            .unwrap_err();
        assert!(mismatch.to_string().contains("currency mismatch"));

        let too_precise = f
            .engine
            .transfer(f.owner, &TransferRequest::new(a.id, b.id, Decimal::new(1, 3), "USD"))
            .unwrap_err();
        assert_eq!(too_precise.kind(), ErrorKind::Validation);

        let too_much = f
            .engine
            .transfer(f.owner, &TransferRequest::new(a.id, b.id, dollars(11), "usd"))
            .unwrap_err();
        assert!(matches!(too_much, Error::InsufficientFunds { .. }));

        let long = TransferRequest::new(a.id, b.id, dollars(1), "USD")
            .with_description("x".repeat(MAX_DESCRIPTION_LEN + 1));
        assert_eq!(f.engine.transfer(f.owner, &long).unwrap_err().kind(), ErrorKind::Validation);

        assert_eq!(f.balance(&a), dollars(10));
        assert_eq!(f.balance(&b), dollars(10));
        assert_eq!(f.repo.count_transactions_for_owner(f.owner).unwrap(), 0);
    }

    #[test]
    fn test_blocked_before_expired_before_funds() {
        let f = fixture();
        let a = f.card(0, "USD");
        let b = f.card(0, "USD");

        let mut expired = f.ledger.get_details(b.id, f.owner).unwrap();
        expired.expiration_date = today().pred_opt().unwrap();
        f.repo.update_card(&expired).unwrap();

        let err = f
            .engine
            .transfer(f.owner, &TransferRequest::new(a.id, b.id, dollars(5), "USD"))
            .unwrap_err();
        assert!(err.to_string().contains("card expired"));

        let mut blocked = f.ledger.get_details(a.id, f.owner).unwrap();
        blocked.status = CardStatus::Blocked;
        f.repo.update_card(&blocked).unwrap();

        let err = f
            .engine
            .transfer(f.owner, &TransferRequest::new(a.id, b.id, dollars(5), "USD"))
            .unwrap_err();
        assert!(err.to_string().contains("card blocked"));
    }

    #[test]
    fn test_unowned_card_names_the_side() {
        let f = fixture();
        let a = f.card(1000, "USD");
        let missing = Uuid::new_v4();

        let err = f
            .engine
            .transfer(f.owner, &TransferRequest::new(a.id, missing, dollars(1), "USD"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("destination"));

        let err = f
            .engine
            .transfer(Uuid::new_v4(), &TransferRequest::new(a.id, missing, dollars(1), "USD"))
            .unwrap_err();
        assert!(err.to_string().contains("source"));
    }

    #[test]
    fn test_transfer_lookup_is_owner_scoped() {
        let f = fixture();
        let a = f.card(1000, "USD");
        let b = f.card(0, "USD");
        let tx = f
            .engine
            .transfer(
                f.owner,
                &TransferRequest::new(a.id, b.id, dollars(1), "USD").with_description("  lunch "),
            )
            .unwrap();

        assert_eq!(tx.description.as_deref(), Some("lunch"));
        assert_eq!(
            f.engine.get_transfer_details(tx.id, Uuid::new_v4()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_list_transfers_newest_first() {
        let f = fixture();
        let a = f.card(1000, "USD");
        let b = f.card(0, "USD");
        let first = f
            .engine
            .transfer(f.owner, &TransferRequest::new(a.id, b.id, dollars(1), "USD"))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = f
            .engine
            .transfer(f.owner, &TransferRequest::new(b.id, a.id, dollars(1), "USD"))
            .unwrap();

        let page = f.engine.list_transfers(f.owner, PageRequest::default()).unwrap();
        assert_eq!(page.total_items, 2);
        assert_eq!(page.items[0].id, second.id);
        assert_eq!(page.items[1].id, first.id);
    }
}

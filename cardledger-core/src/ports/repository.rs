//! Repository port - persistence abstraction

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Card, CardPredicate, Page, PageRequest, Transaction};

/// A guarded balance write, part of an atomic transfer commit
///
/// The write only applies if the stored balance still equals `expected`.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceChange {
    pub card_id: Uuid,
    pub expected: Decimal,
    pub new_balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl BalanceChange {
    pub fn for_card(card: &Card, new_balance: Decimal, updated_at: DateTime<Utc>) -> Self {
        Self {
            card_id: card.id,
            expected: card.balance,
            new_balance,
            updated_at,
        }
    }
}

/// Card and transaction storage
///
/// Lookups taking an `owner_id` return `None` both for missing rows and rows
/// owned by someone else; callers cannot tell the two apart.
pub trait Repository: Send + Sync {
    // === Cards ===

    /// Get a card by id, scoped to its owner
    fn find_card(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Card>>;

    /// Check whether any card stores this encrypted number
    fn card_number_exists(&self, number_encrypted: &str) -> Result<bool>;

    /// Page through cards matching a predicate, ordered by creation time then id
    fn query_cards(&self, predicate: &CardPredicate, page: PageRequest) -> Result<Page<Card>>;

    /// All cards of an owner, ordered by creation time then id
    fn cards_for_owner(&self, owner_id: Uuid) -> Result<Vec<Card>>;

    /// Insert a new card
    ///
    /// A duplicate encrypted number fails with `Error::Issuance`.
    fn insert_card(&self, card: &Card) -> Result<()>;

    /// Overwrite the mutable fields (status, holder name, expiration, balance, updated_at)
    fn update_card(&self, card: &Card) -> Result<()>;

    /// Remove a card; transactions referencing it are kept
    fn delete_card(&self, id: Uuid) -> Result<()>;

    // === Transfers ===

    /// Apply both balance changes and insert the transaction as one unit
    ///
    /// Fails with `Error::Conflict` and writes nothing if either card's stored
    /// balance no longer matches its `expected` value.
    fn apply_transfer(
        &self,
        debit: &BalanceChange,
        credit: &BalanceChange,
        transaction: &Transaction,
    ) -> Result<()>;

    /// Get a transaction by id, scoped to its owner
    fn find_transaction(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Transaction>>;

    /// Page through an owner's transactions, newest first
    fn transactions_for_owner(&self, owner_id: Uuid, page: PageRequest) -> Result<Page<Transaction>>;

    fn count_transactions_for_owner(&self, owner_id: Uuid) -> Result<usize>;
}

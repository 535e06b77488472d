//! In-memory repository
//!
//! Cards live in an id map with owner and encrypted-number indexes.
//! Transactions are an insert-only arena addressed by index, so card and
//! transaction records refer to each other only by id.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Card, CardPredicate, Page, PageRequest, Transaction};
use crate::ports::{BalanceChange, Repository};

#[derive(Default)]
struct Store {
    cards: HashMap<Uuid, Card>,
    cards_by_number: HashMap<String, Uuid>,
    cards_by_owner: HashMap<Uuid, HashSet<Uuid>>,
    transactions: Vec<Transaction>,
    transaction_index: HashMap<Uuid, usize>,
    transactions_by_owner: HashMap<Uuid, Vec<usize>>,
}

impl Store {
    fn owner_cards(&self, owner_id: Uuid) -> Vec<&Card> {
        let mut cards: Vec<&Card> = self
            .cards_by_owner
            .get(&owner_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.cards.get(id))
            .collect();
        cards.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        cards
    }

    fn check_balance(&self, change: &BalanceChange) -> Result<()> {
        match self.cards.get(&change.card_id) {
            Some(card) if card.balance == change.expected => Ok(()),
            _ => Err(Error::Conflict(format!(
                "balance of card {} changed before commit",
                change.card_id
            ))),
        }
    }

    fn apply_balance(&mut self, change: &BalanceChange) {
        if let Some(card) = self.cards.get_mut(&change.card_id) {
            card.balance = change.new_balance;
            card.updated_at = change.updated_at;
        }
    }
}

/// Repository kept entirely in process memory
#[derive(Default)]
pub struct MemoryRepository {
    store: RwLock<Store>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Store>> {
        self.store
            .read()
            .map_err(|_| Error::database("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Store>> {
        self.store
            .write()
            .map_err(|_| Error::database("memory store lock poisoned"))
    }
}

impl Repository for MemoryRepository {
    fn find_card(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Card>> {
        let store = self.read()?;
        Ok(store
            .cards
            .get(&id)
            .filter(|card| card.owner_id == owner_id)
            .cloned())
    }

    fn card_number_exists(&self, number_encrypted: &str) -> Result<bool> {
        Ok(self.read()?.cards_by_number.contains_key(number_encrypted))
    }

    fn query_cards(&self, predicate: &CardPredicate, page: PageRequest) -> Result<Page<Card>> {
        let store = self.read()?;
        let matching: Vec<Card> = store
            .owner_cards(predicate.owner_id())
            .into_iter()
            .filter(|card| predicate.matches(card))
            .cloned()
            .collect();
        Ok(Page::from_sorted(matching, page))
    }

    fn cards_for_owner(&self, owner_id: Uuid) -> Result<Vec<Card>> {
        let store = self.read()?;
        Ok(store.owner_cards(owner_id).into_iter().cloned().collect())
    }

    fn insert_card(&self, card: &Card) -> Result<()> {
        let mut store = self.write()?;
        if store.cards_by_number.contains_key(&card.number_encrypted) {
            return Err(Error::issuance("card number collided with an existing card"));
        }
        if store.cards.contains_key(&card.id) {
            return Err(Error::database(format!("duplicate card id {}", card.id)));
        }

        store
            .cards_by_number
            .insert(card.number_encrypted.clone(), card.id);
        store
            .cards_by_owner
            .entry(card.owner_id)
            .or_default()
            .insert(card.id);
        store.cards.insert(card.id, card.clone());
        Ok(())
    }

    fn update_card(&self, card: &Card) -> Result<()> {
        let mut store = self.write()?;
        let stored = store
            .cards
            .get_mut(&card.id)
            .ok_or_else(|| Error::not_found(format!("Card {} not found", card.id)))?;

        // Identity, number, owner and currency are fixed at creation
        stored.status = card.status;
        stored.holder_name = card.holder_name.clone();
        stored.expiration_date = card.expiration_date;
        stored.balance = card.balance;
        stored.updated_at = card.updated_at;
        Ok(())
    }

    fn delete_card(&self, id: Uuid) -> Result<()> {
        let mut store = self.write()?;
        if let Some(card) = store.cards.remove(&id) {
            store.cards_by_number.remove(&card.number_encrypted);
            if let Some(ids) = store.cards_by_owner.get_mut(&card.owner_id) {
                ids.remove(&id);
            }
        }
        Ok(())
    }

    fn apply_transfer(
        &self,
        debit: &BalanceChange,
        credit: &BalanceChange,
        transaction: &Transaction,
    ) -> Result<()> {
        let mut store = self.write()?;

        // Check everything before the first write
        store.check_balance(debit)?;
        store.check_balance(credit)?;
        if store.transaction_index.contains_key(&transaction.id) {
            return Err(Error::database(format!(
                "duplicate transaction id {}",
                transaction.id
            )));
        }

        store.apply_balance(debit);
        store.apply_balance(credit);

        let slot = store.transactions.len();
        store.transactions.push(transaction.clone());
        store.transaction_index.insert(transaction.id, slot);
        store
            .transactions_by_owner
            .entry(transaction.owner_id)
            .or_default()
            .push(slot);
        Ok(())
    }

    fn find_transaction(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Transaction>> {
        let store = self.read()?;
        Ok(store
            .transaction_index
            .get(&id)
            .map(|&slot| &store.transactions[slot])
            .filter(|tx| tx.owner_id == owner_id)
            .cloned())
    }

    fn transactions_for_owner(&self, owner_id: Uuid, page: PageRequest) -> Result<Page<Transaction>> {
        let store = self.read()?;
        let mut owned: Vec<Transaction> = store
            .transactions_by_owner
            .get(&owner_id)
            .into_iter()
            .flatten()
            .map(|&slot| store.transactions[slot].clone())
            .collect();
        owned.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(Page::from_sorted(owned, page))
    }

    fn count_transactions_for_owner(&self, owner_id: Uuid) -> Result<usize> {
        Ok(self
            .read()?
            .transactions_by_owner
            .get(&owner_id)
            .map_or(0, Vec::len))
    }
}

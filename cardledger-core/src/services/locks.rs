//! Striped per-card lock table
//!
//! Every card id hashes to one stripe. Holding a stripe gives exclusive
//! access to all cards on it. Pairs are always taken in ascending stripe
//! order, and a pair sharing a stripe takes it once.

use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

pub struct CardLocks {
    stripes: Vec<Mutex<()>>,
}

/// Held stripes; released on drop
#[must_use]
pub struct CardGuard<'a> {
    _first: MutexGuard<'a, ()>,
    _second: Option<MutexGuard<'a, ()>>,
}

impl CardLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    pub fn stripe_of(&self, card_id: Uuid) -> usize {
        (card_id.as_u128() % self.stripes.len() as u128) as usize
    }

    /// Exclusive access to one card
    pub fn lock(&self, card_id: Uuid) -> CardGuard<'_> {
        CardGuard {
            _first: self.acquire(self.stripe_of(card_id)),
            _second: None,
        }
    }

    /// Exclusive access to two cards, deadlock-free against any other pair
    pub fn lock_pair(&self, a: Uuid, b: Uuid) -> CardGuard<'_> {
        let (sa, sb) = (self.stripe_of(a), self.stripe_of(b));
        if sa == sb {
            return CardGuard {
                _first: self.acquire(sa),
                _second: None,
            };
        }

        let (low, high) = if sa < sb { (sa, sb) } else { (sb, sa) };
        let first = self.acquire(low);
        let second = self.acquire(high);
        CardGuard {
            _first: first,
            _second: Some(second),
        }
    }

    fn acquire(&self, stripe: usize) -> MutexGuard<'_, ()> {
        // The stripes guard no data, so a poisoned stripe is still usable
        self.stripes[stripe]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CardLocks {
    fn default() -> Self {
        Self::new(256)
    }
}

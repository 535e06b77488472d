//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod card;
mod encryption;
pub mod filter;
pub mod page;
pub mod result;
mod transaction;
mod view;

pub use card::{Card, CardStatus, CardType, DisplayStatus, MAX_HOLDER_NAME_LEN, MONEY_SCALE};
pub use encryption::{Argon2Params, CryptoSettings, MIN_SALT_LEN, MIN_SECRET_LEN};
pub use filter::{CardCondition, CardFilter, CardPredicate};
pub use page::{Page, PageRequest};
pub use transaction::{Transaction, TransactionStatus, MAX_DESCRIPTION_LEN};
pub use view::{BalanceView, CardView};

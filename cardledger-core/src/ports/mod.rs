//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod random;
mod repository;

pub use random::RandomSource;
pub use repository::{BalanceChange, Repository};

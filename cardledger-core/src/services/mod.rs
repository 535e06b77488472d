//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod crypto;
pub mod issuer;
pub mod ledger;
pub mod locks;
pub mod logging;
pub mod migration;
mod status;
pub mod transfer;

pub use crypto::CardCrypto;
pub use issuer::{is_valid_luhn, CardNumberIssuer, IssuedNumber};
pub use ledger::{CardLedger, NewCard};
pub use locks::CardLocks;
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use status::{CurrencyBalance, StatusService, StatusSummary};
pub use transfer::{TransferEngine, TransferRequest};

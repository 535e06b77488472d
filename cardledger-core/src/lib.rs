//! CardLedger Core - card ledger and transfer engine
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Card, Transaction, filters, pages)
//! - **ports**: Trait definitions for external dependencies (Repository, RandomSource)
//! - **services**: Business logic orchestration (ledger, transfers, issuance, crypto)
//! - **adapters**: Concrete implementations (DuckDB, in-memory, rand)
//!
//! Every operation takes an already-resolved owner id. Authentication and
//! transport belong to the caller.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use adapters::duckdb::DuckDbRepository;
use adapters::random::ThreadRandom;
use config::Config;
use ports::{RandomSource, Repository};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, ErrorKind, OperationResult, Result};
pub use domain::{
    BalanceView, Card, CardFilter, CardStatus, CardType, CardView, DisplayStatus, Page,
    PageRequest, Transaction, TransactionStatus,
};
pub use services::{NewCard, TransferRequest};

pub const LEDGER_DB_FILE: &str = "cardledger.duckdb";

/// Main context for card ledger operations
///
/// Holds the configuration, the repository and all services. The ledger
/// and the transfer engine share one lock table.
pub struct CardLedgerContext {
    pub config: Config,
    pub repository: Arc<dyn Repository>,
    pub crypto: Arc<CardCrypto>,
    pub ledger: Arc<CardLedger>,
    pub transfers: TransferEngine,
    pub status_service: StatusService,
}

impl CardLedgerContext {
    /// Open the ledger stored in `data_dir`
    ///
    /// Fails if the crypto configuration is missing or malformed.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        let crypto = CardCrypto::from_settings(&config.crypto)?;

        let repository = DuckDbRepository::new(&data_dir.join(LEDGER_DB_FILE))?;
        repository.ensure_schema()?;

        Ok(Self::with_parts(
            config,
            Arc::new(repository),
            Arc::new(crypto),
            Arc::new(ThreadRandom),
        ))
    }

    /// Wire services around explicit collaborators
    pub fn with_parts(
        config: Config,
        repository: Arc<dyn Repository>,
        crypto: Arc<CardCrypto>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let locks = Arc::new(CardLocks::new(config.concurrency.lock_stripes));

        let issuer = CardNumberIssuer::new(
            Arc::clone(&crypto),
            Arc::clone(&repository),
            Arc::clone(&random),
            config.issuance.clone(),
        );
        let ledger = Arc::new(CardLedger::new(
            Arc::clone(&repository),
            Arc::clone(&crypto),
            issuer,
            Arc::clone(&locks),
            config.cards.validity_years,
        ));
        let transfers = TransferEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&repository),
            locks,
            random,
        );
        let status_service = StatusService::new(Arc::clone(&repository));

        Self {
            config,
            repository,
            crypto,
            ledger,
            transfers,
            status_service,
        }
    }
}

//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use duckdb::{params, Connection, ToSql};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Card, CardCondition, CardPredicate, Page, PageRequest, Transaction,
};
use crate::ports::{BalanceChange, Repository};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const CARD_COLUMNS: &str = "card_id, owner_id, card_number_enc, cvv_enc, holder_name,
        expiration_date::VARCHAR, CAST(balance AS VARCHAR), currency, status, card_type,
        created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "transaction_id, reference, owner_id, from_card_id, to_card_id,
        CAST(amount AS VARCHAR), CAST(fee AS VARCHAR), currency, status, description,
        created_at, updated_at";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// A duplicate encrypted card number means the issuer lost a race
fn is_duplicate_card_number(err: &duckdb::Error) -> bool {
    let msg = err.to_string();
    msg.contains("card_number_enc") && (msg.contains("Duplicate key") || msg.contains("unique"))
}

/// DuckDB repository implementation
///
/// All access goes through one connection guarded by a mutex, so DuckDB
/// never sees two concurrent writers from this process.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the ledger database at `db_path`
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which occur when another process holds the database briefly.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Open a private in-memory database (tests, dry runs)
    pub fn in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::database("connection lock poisoned"))
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            tracing::info!(applied = ?result.applied, "ledger schema migrated");
        }
        Ok(())
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn load_cards(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Card>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, CardRow::read)?;

        let mut cards = Vec::new();
        for row in rows {
            cards.push(Card::try_from(row?)?);
        }
        Ok(cards)
    }

    fn load_transactions(
        conn: &Connection,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<Transaction>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, TransactionRow::read)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(Transaction::try_from(row?)?);
        }
        Ok(transactions)
    }
}

impl Repository for DuckDbRepository {
    // === Cards ===

    fn find_card(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Card>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sys_cards WHERE card_id = ? AND owner_id = ?",
            CARD_COLUMNS
        );
        let id = id.to_string();
        let owner = owner_id.to_string();
        let mut cards = Self::load_cards(&conn, &sql, &[&id, &owner])?;
        Ok(cards.pop())
    }

    fn card_number_exists(&self, number_encrypted: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_cards WHERE card_number_enc = ?",
            [number_encrypted],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn query_cards(&self, predicate: &CardPredicate, page: PageRequest) -> Result<Page<Card>> {
        let (where_sql, values) = where_clause(predicate);
        let param_refs: Vec<&dyn ToSql> = values.iter().map(|b| b.as_ref()).collect();

        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM sys_cards WHERE {}", where_sql),
            param_refs.as_slice(),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM sys_cards WHERE {} ORDER BY created_at, card_id LIMIT {} OFFSET {}",
            CARD_COLUMNS,
            where_sql,
            page.size,
            page.offset()
        );
        let cards = Self::load_cards(&conn, &sql, param_refs.as_slice())?;

        Ok(Page::new(cards, page, total.max(0) as usize))
    }

    fn cards_for_owner(&self, owner_id: Uuid) -> Result<Vec<Card>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sys_cards WHERE owner_id = ? ORDER BY created_at, card_id",
            CARD_COLUMNS
        );
        let owner = owner_id.to_string();
        Self::load_cards(&conn, &sql, &[&owner])
    }

    fn insert_card(&self, card: &Card) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_cards (card_id, owner_id, card_number_enc, cvv_enc, holder_name,
                                    expiration_date, balance, currency, status, card_type,
                                    created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, CAST(? AS DATE), CAST(? AS DECIMAL(19, 2)), ?, ?, ?, ?, ?)",
            params![
                card.id.to_string(),
                card.owner_id.to_string(),
                card.number_encrypted,
                card.cvv_encrypted,
                card.holder_name,
                card.expiration_date.to_string(),
                card.balance.to_string(),
                card.currency,
                card.status.as_str(),
                card.card_type.as_str(),
                format_timestamp(&card.created_at),
                format_timestamp(&card.updated_at),
            ],
        )
        .map_err(|e| {
            if is_duplicate_card_number(&e) {
                Error::issuance("card number collided with an existing card")
            } else {
                Error::from(e)
            }
        })?;

        Ok(())
    }

    fn update_card(&self, card: &Card) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sys_cards
             SET status = ?, holder_name = ?, expiration_date = CAST(? AS DATE),
                 balance = CAST(? AS DECIMAL(19, 2)), updated_at = ?
             WHERE card_id = ?",
            params![
                card.status.as_str(),
                card.holder_name,
                card.expiration_date.to_string(),
                card.balance.to_string(),
                format_timestamp(&card.updated_at),
                card.id.to_string(),
            ],
        )?;

        if updated == 0 {
            return Err(Error::not_found(format!("Card {} not found", card.id)));
        }
        Ok(())
    }

    fn delete_card(&self, id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sys_cards WHERE card_id = ?", [id.to_string()])?;
        Ok(())
    }

    // === Transfers ===

    fn apply_transfer(
        &self,
        debit: &BalanceChange,
        credit: &BalanceChange,
        transaction: &Transaction,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        // Dropping `tx` without commit rolls back
        let tx = conn.transaction()?;

        for change in [debit, credit] {
            let updated = tx.execute(
                "UPDATE sys_cards
                 SET balance = CAST(? AS DECIMAL(19, 2)), updated_at = ?
                 WHERE card_id = ? AND balance = CAST(? AS DECIMAL(19, 2))",
                params![
                    change.new_balance.to_string(),
                    format_timestamp(&change.updated_at),
                    change.card_id.to_string(),
                    change.expected.to_string(),
                ],
            )?;
            if updated != 1 {
                return Err(Error::Conflict(format!(
                    "balance of card {} changed before commit",
                    change.card_id
                )));
            }
        }

        tx.execute(
            "INSERT INTO sys_card_transactions (transaction_id, reference, owner_id, from_card_id,
                                                to_card_id, amount, fee, currency, status,
                                                description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, CAST(? AS DECIMAL(19, 2)), CAST(? AS DECIMAL(19, 2)),
                     ?, ?, ?, ?, ?)",
            params![
                transaction.id.to_string(),
                transaction.reference,
                transaction.owner_id.to_string(),
                transaction.from_card_id.map(|id| id.to_string()),
                transaction.to_card_id.to_string(),
                transaction.amount.to_string(),
                transaction.fee.to_string(),
                transaction.currency,
                transaction.status.as_str(),
                transaction.description,
                format_timestamp(&transaction.created_at),
                format_timestamp(&transaction.updated_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn find_transaction(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sys_card_transactions WHERE transaction_id = ? AND owner_id = ?",
            TRANSACTION_COLUMNS
        );
        let id = id.to_string();
        let owner = owner_id.to_string();
        let mut transactions = Self::load_transactions(&conn, &sql, &[&id, &owner])?;
        Ok(transactions.pop())
    }

    fn transactions_for_owner(&self, owner_id: Uuid, page: PageRequest) -> Result<Page<Transaction>> {
        let conn = self.conn()?;
        let owner = owner_id.to_string();

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_card_transactions WHERE owner_id = ?",
            [&owner],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM sys_card_transactions WHERE owner_id = ?
             ORDER BY created_at DESC, transaction_id DESC LIMIT {} OFFSET {}",
            TRANSACTION_COLUMNS,
            page.size,
            page.offset()
        );
        let transactions = Self::load_transactions(&conn, &sql, &[&owner])?;

        Ok(Page::new(transactions, page, total.max(0) as usize))
    }

    fn count_transactions_for_owner(&self, owner_id: Uuid) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_card_transactions WHERE owner_id = ?",
            [owner_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}

// === Predicate translation ===

/// Translate a card predicate into a WHERE clause and its bound values
///
/// Every condition binds exactly one value, in condition order.
fn where_clause(predicate: &CardPredicate) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses = Vec::with_capacity(predicate.conditions().len());
    let mut values: Vec<Box<dyn ToSql>> = Vec::with_capacity(predicate.conditions().len());

    for condition in predicate.conditions() {
        let (clause, value): (&str, Box<dyn ToSql>) = match condition {
            CardCondition::Owner(owner) => ("owner_id = ?", Box::new(owner.to_string())),
            CardCondition::Status(status) => ("status = ?", Box::new(status.as_str())),
            CardCondition::Type(card_type) => ("card_type = ?", Box::new(card_type.as_str())),
            CardCondition::Currency(currency) => ("currency = ?", Box::new(currency.clone())),
            CardCondition::MinBalance(min) => {
                ("balance >= CAST(? AS DECIMAL(38, 10))", Box::new(min.to_string()))
            }
            CardCondition::MaxBalance(max) => {
                ("balance <= CAST(? AS DECIMAL(38, 10))", Box::new(max.to_string()))
            }
            CardCondition::ExpiresOnOrAfter(date) => {
                ("expiration_date >= CAST(? AS DATE)", Box::new(date.to_string()))
            }
            CardCondition::ExpiresOnOrBefore(date) => {
                ("expiration_date <= CAST(? AS DATE)", Box::new(date.to_string()))
            }
            CardCondition::Expired { today, expired: true } => {
                ("expiration_date < CAST(? AS DATE)", Box::new(today.to_string()))
            }
            CardCondition::Expired { today, expired: false } => {
                ("expiration_date >= CAST(? AS DATE)", Box::new(today.to_string()))
            }
            CardCondition::CreatedAfter(at) => ("created_at > ?", Box::new(format_timestamp(at))),
            CardCondition::CreatedBefore(at) => {
                ("created_at < ?", Box::new(format_timestamp(at)))
            }
        };
        clauses.push(clause);
        values.push(value);
    }

    (clauses.join(" AND "), values)
}

// === Row mapping ===

/// Raw text columns of a sys_cards row
struct CardRow {
    id: String,
    owner_id: String,
    number_encrypted: String,
    cvv_encrypted: String,
    holder_name: String,
    expiration_date: String,
    balance: String,
    currency: String,
    status: String,
    card_type: String,
    created_at: String,
    updated_at: String,
}

impl CardRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            number_encrypted: row.get(2)?,
            cvv_encrypted: row.get(3)?,
            holder_name: row.get(4)?,
            expiration_date: row.get(5)?,
            balance: row.get(6)?,
            currency: row.get(7)?,
            status: row.get(8)?,
            card_type: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl TryFrom<CardRow> for Card {
    type Error = Error;

    fn try_from(row: CardRow) -> Result<Self> {
        Ok(Card {
            id: parse_uuid(&row.id)?,
            owner_id: parse_uuid(&row.owner_id)?,
            number_encrypted: row.number_encrypted,
            cvv_encrypted: row.cvv_encrypted,
            holder_name: row.holder_name,
            expiration_date: parse_date(&row.expiration_date)?,
            balance: parse_decimal(&row.balance)?,
            currency: row.currency,
            status: row.status.parse().map_err(Error::Database)?,
            card_type: row.card_type.parse().map_err(Error::Database)?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

/// Raw text columns of a sys_card_transactions row
struct TransactionRow {
    id: String,
    reference: String,
    owner_id: String,
    from_card_id: Option<String>,
    to_card_id: String,
    amount: String,
    fee: String,
    currency: String,
    status: String,
    description: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TransactionRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            reference: row.get(1)?,
            owner_id: row.get(2)?,
            from_card_id: row.get(3)?,
            to_card_id: row.get(4)?,
            amount: row.get(5)?,
            fee: row.get(6)?,
            currency: row.get(7)?,
            status: row.get(8)?,
            description: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = Error;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Transaction {
            id: parse_uuid(&row.id)?,
            reference: row.reference,
            owner_id: parse_uuid(&row.owner_id)?,
            from_card_id: row.from_card_id.as_deref().map(parse_uuid).transpose()?,
            to_card_id: parse_uuid(&row.to_card_id)?,
            amount: parse_decimal(&row.amount)?,
            fee: parse_decimal(&row.fee)?,
            currency: row.currency,
            status: row.status.parse().map_err(Error::Database)?,
            description: row.description,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

// Helper functions

/// Fixed-width RFC 3339 UTC text, so lexical order equals time order
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("invalid timestamp '{}': {}", s, e)))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::database(format!("invalid date '{}': {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| Error::database(format!("invalid decimal '{}': {}", s, e)))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::database(format!("invalid id '{}': {}", s, e)))
}

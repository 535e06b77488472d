//! Result and error types for the core library

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
///
/// Every failure is scoped to the request that produced it. Callers that need
/// to branch on the failure use [`Error::kind`] rather than matching messages.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Card operation error: {0}")]
    CardOperation(String),

    #[error("Issuance error: {0}")]
    Issuance(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fieldless discriminant of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    InsufficientFunds,
    CardOperation,
    Issuance,
    Crypto,
    Conflict,
    Database,
    Config,
    Io,
    Json,
}

impl ErrorKind {
    /// Same names as the serde form
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::CardOperation => "card_operation",
            ErrorKind::Issuance => "issuance",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Database => "database",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Json => "json",
        }
    }
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a card operation error
    pub fn card_operation(msg: impl Into<String>) -> Self {
        Self::CardOperation(msg.into())
    }

    /// Create an issuance error
    pub fn issuance(msg: impl Into<String>) -> Self {
        Self::Issuance(msg.into())
    }

    /// Create a crypto error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation(_) => ErrorKind::Validation,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::CardOperation(_) => ErrorKind::CardOperation,
            Error::Issuance(_) => ErrorKind::Issuance,
            Error::Crypto(_) => ErrorKind::Crypto,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Database(_) => ErrorKind::Database,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
        }
    }

    /// Whether resubmitting the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Issuance(_) | Error::Conflict(_))
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Serializable operation outcome (used for `--json` output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(&e),
        }
    }
}

//! CLI command implementations

pub mod card;
pub mod init;
pub mod logs;
pub mod status;
pub mod transfer;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use cardledger_core::services::{EntryPoint, LogEvent, LoggingService};
use cardledger_core::CardLedgerContext;
use uuid::Uuid;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Record a completed command, ignoring logging errors
pub fn log_command(logger: &Option<LoggingService>, command: &str, duration_ms: i64) {
    if let Some(l) = logger {
        if let Err(e) = l.log_command(command, duration_ms) {
            tracing::debug!(error = %e, "failed to record command");
        }
    }
}

/// Record a failed command, ignoring logging errors
pub fn log_failure(
    logger: &Option<LoggingService>,
    command: &str,
    error: &anyhow::Error,
    duration_ms: i64,
) {
    let Some(l) = logger else {
        return;
    };

    let recorded = match error.downcast_ref::<cardledger_core::Error>() {
        Some(core) => l.log_failure(command, core, duration_ms),
        None => l.log(
            LogEvent::new("command_failed")
                .with_command(command)
                .with_error_message(error.to_string())
                .with_duration_ms(duration_ms),
        ),
    };
    if let Err(e) = recorded {
        tracing::debug!(error = %e, "failed to record command failure");
    }
}

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CARDLEDGER_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".cardledger"))
        .ok_or_else(|| anyhow!("Could not find home directory; set CARDLEDGER_DIR"))
}

/// Open the ledger in the data directory
pub fn get_context() -> Result<CardLedgerContext> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    Ok(CardLedgerContext::new(&data_dir)?)
}

/// The owner a command acts for
pub fn require_owner(owner: Option<Uuid>) -> Result<Uuid> {
    owner.ok_or_else(|| anyhow!("No owner given: pass --owner or set CARDLEDGER_OWNER"))
}

//! Logging service - structured usage events in DuckDB
//!
//! Events are stored in logs.duckdb next to the ledger database. Only
//! command names, error kinds, error messages and timings are recorded.
//! Card numbers, CVVs, holder names and balances never reach this log.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use duckdb::Connection;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::log_migrations::LOG_MIGRATIONS;
use crate::services::MigrationService;

pub const LOGS_DB_FILE: &str = "logs.duckdb";

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique ID: millisecond timestamp in the high bits, counter in the low 16
fn generate_id() -> u64 {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    ((now_ms() as u64) << 16) | counter
}

/// Current unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// Which front end produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    Cli,
    Library,
}

impl EntryPoint {
    fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Cli => "cli",
            EntryPoint::Library => "library",
        }
    }
}

/// A log event to be recorded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Record the failure kind and message
    pub fn with_error(mut self, error: &Error) -> Self {
        self.error_kind = Some(error.kind().as_str().to_string());
        self.error_message = Some(error.to_string());
        self
    }

    /// Record a failure that did not come from this crate
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// A log entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: i64,
    pub entry_point: String,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub command: Option<String>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

const ENTRY_COLUMNS: &str = "id, timestamp, entry_point, app_version, platform,
        event, command, error_kind, error_message, duration_ms";

fn read_entry(row: &duckdb::Row) -> duckdb::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        entry_point: row.get(2)?,
        app_version: row.get(3)?,
        platform: row.get(4)?,
        event: row.get(5)?,
        command: row.get(6)?,
        error_kind: row.get(7)?,
        error_message: row.get(8)?,
        duration_ms: row.get(9)?,
    })
}

/// Service for structured event logging
pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    entry_point: EntryPoint,
    app_version: String,
    platform: &'static str,
}

impl LoggingService {
    /// Open or create logs.duckdb in the data directory and migrate it
    pub fn new(
        data_dir: &Path,
        entry_point: EntryPoint,
        app_version: impl Into<String>,
    ) -> Result<Self> {
        let db_path = data_dir.join(LOGS_DB_FILE);
        let conn = Connection::open(&db_path)?;
        MigrationService::with_migrations(&conn, LOG_MIGRATIONS).run_pending()?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            entry_point,
            app_version: app_version.into(),
            platform: detect_platform(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::database("log connection lock poisoned"))
    }

    /// Record an event, stamped with entry point, version and platform
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO sys_logs (
                id, timestamp, entry_point, app_version, platform,
                event, command, error_kind, error_message, duration_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            duckdb::params![
                generate_id(),
                now_ms(),
                self.entry_point.as_str(),
                &self.app_version,
                self.platform,
                &event.event,
                &event.command,
                &event.error_kind,
                &event.error_message,
                &event.duration_ms,
            ],
        )?;
        Ok(())
    }

    /// A command ran to completion
    pub fn log_command(&self, command: &str, duration_ms: i64) -> Result<()> {
        self.log(
            LogEvent::new("command_executed")
                .with_command(command)
                .with_duration_ms(duration_ms),
        )
    }

    /// A command failed
    pub fn log_failure(&self, command: &str, error: &Error, duration_ms: i64) -> Result<()> {
        self.log(
            LogEvent::new("command_failed")
                .with_command(command)
                .with_error(error)
                .with_duration_ms(duration_ms),
        )
    }

    /// Most recent entries first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query(
            &format!(
                "SELECT {} FROM sys_logs ORDER BY timestamp DESC, id DESC LIMIT ?",
                ENTRY_COLUMNS
            ),
            limit,
        )
    }

    /// Most recent failures first
    pub fn get_errors(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query(
            &format!(
                "SELECT {} FROM sys_logs WHERE error_message IS NOT NULL
                 ORDER BY timestamp DESC, id DESC LIMIT ?",
                ENTRY_COLUMNS
            ),
            limit,
        )
    }

    fn query(&self, sql: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([limit as i64], read_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Delete entries older than the given unix-millisecond timestamp
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM sys_logs WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_logging_service_creation() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
        assert!(service.db_path().exists());
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = tempdir().unwrap();
        {
            let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
            service.log_command("card list", 3).unwrap();
        }
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
        assert_eq!(service.count().unwrap(), 1);
    }

    #[test]
    fn test_log_command() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();

        service.log_command("transfer", 12).unwrap();

        let entries = service.get_recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "command_executed");
        assert_eq!(entries[0].command.as_deref(), Some("transfer"));
        assert_eq!(entries[0].duration_ms, Some(12));
        assert_eq!(entries[0].entry_point, "cli");
        assert_eq!(entries[0].app_version, "1.0.0");
    }

    #[test]
    fn test_log_failure_records_kind() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Library, "2.0.0").unwrap();

        service.log_command("card list", 1).unwrap();
        service
            .log_failure("card block", &Error::card_operation("card is already blocked"), 4)
            .unwrap();

        let errors = service.get_errors(10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event, "command_failed");
        assert_eq!(errors[0].error_kind.as_deref(), Some("card_operation"));
        assert!(errors[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("already blocked"));
        assert_eq!(errors[0].entry_point, "library");
    }

    #[test]
    fn test_count_and_delete() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();

        service.log(LogEvent::new("event1")).unwrap();
        service.log(LogEvent::new("event2")).unwrap();
        service.log(LogEvent::new("event3").with_error_message("boom")).unwrap();
        assert_eq!(service.count().unwrap(), 3);

        let deleted = service.delete_before(now_ms() + 1000).unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(service.count().unwrap(), 0);
    }
}

//! Logs command - view and manage the event log

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;

use cardledger_core::services::logging::now_ms;
use cardledger_core::services::{EntryPoint, LoggingService};

use super::get_data_dir;
use crate::output;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only failures
        #[arg(long)]
        errors: bool,
    },
    /// Clear old log entries
    Clear {
        /// Delete logs older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Show log statistics and database path
    Stats,
}

fn get_logging_service() -> Result<LoggingService> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)?;
    Ok(LoggingService::new(
        &data_dir,
        EntryPoint::Cli,
        env!("CARGO_PKG_VERSION"),
    )?)
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(command: LogsCommands, json: bool) -> Result<()> {
    let service = get_logging_service()?;

    match command {
        LogsCommands::List { limit, errors } => {
            let entries = if errors {
                service.get_errors(limit)?
            } else {
                service.get_recent(limit)?
            };

            if json {
                return output::json_ok(entries);
            }

            if entries.is_empty() {
                println!("No log entries found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Event", "Command", "Duration", "Error"]);

            for entry in entries {
                let error = match (&entry.error_kind, &entry.error_message) {
                    (Some(kind), _) => kind.red().to_string(),
                    (None, Some(_)) => "!".red().to_string(),
                    (None, None) => String::new(),
                };

                table.add_row(vec![
                    format_timestamp(entry.timestamp),
                    entry.event,
                    entry.command.unwrap_or_default(),
                    entry
                        .duration_ms
                        .map(|ms| format!("{} ms", ms))
                        .unwrap_or_default(),
                    error,
                ]);
            }

            println!("{}", table);

            if !errors {
                let recent_errors = service.get_errors(3)?;
                if !recent_errors.is_empty() {
                    println!();
                    println!("{}", "Recent Errors:".red().bold());
                    for err in &recent_errors {
                        println!(
                            "  {} [{}]: {}",
                            format_timestamp(err.timestamp).dimmed(),
                            err.command.as_deref().unwrap_or(&err.event),
                            err.error_message.as_deref().unwrap_or("Unknown error")
                        );
                    }
                }
            }
        }
        LogsCommands::Clear {
            older_than_days,
            force,
        } => {
            let cutoff_ms = now_ms() - older_than_days as i64 * DAY_MS;

            if !force && !json {
                if !Confirm::new()
                    .with_prompt(format!("Delete logs older than {} days?", older_than_days))
                    .default(false)
                    .interact()?
                {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let deleted = service.delete_before(cutoff_ms)?;

            if json {
                return output::json_ok(serde_json::json!({ "deleted": deleted }));
            }
            println!("Deleted {} log entries", deleted);
        }
        LogsCommands::Stats => {
            let total = service.count()?;
            let errors = service.get_errors(1000)?.len();
            let db_path = service.db_path().to_path_buf();
            let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

            if json {
                return output::json_ok(serde_json::json!({
                    "total_entries": total,
                    "error_count": errors,
                    "database_path": db_path.to_string_lossy(),
                    "database_size_bytes": size_bytes
                }));
            }

            println!("{}", "Log Statistics".bold());
            println!("  Total entries: {}", total);
            println!("  Errors: {}", errors);
            println!("  Database: {}", db_path.display());
            println!("  Size: {} bytes", size_bytes);
        }
    }

    Ok(())
}

//! CardLedger CLI - cards and transfers in your terminal

use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod commands;
mod output;

use commands::{card, init, logs, status, transfer};

/// CardLedger - cards and transfers in your terminal
#[derive(Parser)]
#[command(name = "cards", version, about, long_about = None)]
struct Cli {
    /// Owner the command acts for
    #[arg(long, global = true, env = "CARDLEDGER_OWNER")]
    owner: Option<Uuid>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Show diagnostic output on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create settings.json with a secret key and a fresh salt
    Init {
        /// Secret key (prompted if omitted)
        #[arg(long)]
        secret: Option<String>,
        /// Overwrite an existing crypto section
        #[arg(long, short)]
        force: bool,
    },

    /// Manage cards
    Card {
        #[command(subcommand)]
        command: card::CardCommands,
    },

    /// Move funds between cards and inspect transfers
    Transfer {
        #[command(subcommand)]
        command: transfer::TransferCommands,
    },

    /// Show a summary of the owner's cards and transfers
    Status,

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    /// Name recorded in the event log
    fn name(&self) -> &'static str {
        match self {
            Commands::Init { .. } => "init",
            Commands::Card { command } => command.name(),
            Commands::Transfer { command } => command.name(),
            Commands::Status => "status",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "cardledger_core=debug,cards=debug"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json = cli.json;
    let command_name = cli.command.name();
    let logger = match cli.command {
        // Log maintenance commands are not recorded in the log they manage
        Commands::Logs { .. } => None,
        _ => commands::get_logger(),
    };

    let start = Instant::now();
    let result = run(cli);
    let duration_ms = start.elapsed().as_millis() as i64;

    match result {
        Ok(()) => {
            commands::log_command(&logger, command_name, duration_ms);
            ExitCode::SUCCESS
        }
        Err(e) => {
            commands::log_failure(&logger, command_name, &e, duration_ms);
            if json {
                output::json_failure(&e);
            } else {
                output::error(&format!("{:#}", e));
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Init { secret, force } => init::run(secret, force, json),
        Commands::Card { command } => card::run(command, cli.owner, json),
        Commands::Transfer { command } => transfer::run(command, cli.owner, json),
        Commands::Status => status::run(cli.owner, json),
        Commands::Logs { command } => logs::run(command, json),
    }
}

//! # AutoCount Bridge CLI
//!
//! Command-line surface over the sync engine.
//!
//! ## Usage
//! ```bash
//! # What would a pull change?
//! autocount-bridge preview items
//!
//! # Pull suppliers, push local purchase order edits
//! autocount-bridge execute suppliers
//! autocount-bridge push purchase-orders
//!
//! # Replay a failed log entry, or every failed entry
//! autocount-bridge retry 3f0c9a6e-...
//! autocount-bridge retry-failed --limit 20
//!
//! # FIFO valuation
//! autocount-bridge valuate ITM-0001 --source ledger
//! autocount-bridge --json valuation-report
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` filter), so
//! `--json` output on stdout stays machine-readable.

mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use autocount_core::{EntityKind, SyncStatus};
use autocount_db::{Database, DbConfig};
use autocount_sync::{
    AutoCountClient, BridgeConfig, EngineSettings, ErpClient, OnHandSource, SyncEngine,
    ValuationService,
};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::output::Printer;

// =============================================================================
// Arguments
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "autocount-bridge", version, about = "Reconcile the local store with AutoCount")]
struct Cli {
    /// Config file (default: platform config dir, bridge.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify ERP records against the local store without writing
    Preview {
        #[arg(value_parser = parse_entity)]
        entity: EntityKind,
    },

    /// Pull ERP records into the local store
    Execute {
        #[arg(value_parser = parse_entity)]
        entity: EntityKind,
    },

    /// Push local records to the ERP
    Push {
        #[arg(value_parser = parse_entity)]
        entity: EntityKind,

        /// Only show what would be pushed
        #[arg(long)]
        preview: bool,
    },

    /// Push one local record by id
    PushRecord {
        #[arg(value_parser = parse_entity)]
        entity: EntityKind,
        id: String,
    },

    /// Replay one failed sync log entry (log id or reference id)
    Retry { reference: String },

    /// Replay failed, partial and abandoned entries, oldest first
    RetryFailed {
        /// Entries to replay (default: sync.retry_batch_limit)
        #[arg(long)]
        limit: Option<u32>,
    },

    /// FIFO valuation for one item (id or item code)
    Valuate {
        item: String,

        #[arg(long, default_value = "cached", value_parser = parse_source)]
        source: OnHandSource,
    },

    /// FIFO valuation for every item with stock
    ValuationReport {
        #[arg(long, default_value = "cached", value_parser = parse_source)]
        source: OnHandSource,
    },

    /// Show recent sync log entries
    Log {
        #[arg(long, value_parser = parse_status)]
        status: Option<SyncStatus>,

        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Compare an item's cached on-hand with the ledger
    ReconcileStock {
        item: String,

        /// Reset the cached value to the ledger value
        #[arg(long)]
        repair: bool,
    },

    /// Write the current configuration to the config file
    InitConfig,
}

impl Command {
    fn needs_erp(&self) -> bool {
        matches!(
            self,
            Command::Preview { .. }
                | Command::Execute { .. }
                | Command::Push { .. }
                | Command::PushRecord { .. }
                | Command::Retry { .. }
                | Command::RetryFailed { .. }
        )
    }
}

fn parse_entity(s: &str) -> Result<EntityKind, String> {
    s.replace('-', "_").parse().map_err(|e| format!("{e}"))
}

fn parse_source(s: &str) -> Result<OnHandSource, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_status(s: &str) -> Result<SyncStatus, String> {
    s.parse().map_err(|e| format!("{e}"))
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Runs one command. `Ok(false)` means the command ran but reported
/// failures.
async fn run(cli: Cli) -> Result<bool> {
    let config = BridgeConfig::load(cli.config.clone()).context("loading configuration")?;
    let printer = Printer::new(cli.json);

    if let Command::InitConfig = cli.command {
        config.save(cli.config).context("writing configuration")?;
        printer.line("Configuration written");
        return Ok(true);
    }

    let db = open_database(&config).await?;

    if !cli.command.needs_erp() {
        return run_local(cli.command, &db, &printer).await;
    }

    config.require_erp().context("ERP connection is not configured")?;
    let client: Arc<dyn ErpClient> = Arc::new(AutoCountClient::new(&config.erp)?);
    let engine = SyncEngine::new(db, client, EngineSettings::from_config(&config));

    match cli.command {
        Command::Preview { entity } => {
            let report = engine.preview(entity).await?;
            printer.preview(&report)?;
            Ok(report.errors.is_empty())
        }
        Command::Execute { entity } => {
            let report = engine.execute(entity).await?;
            printer.execute(entity, &report)?;
            Ok(!report.has_failures())
        }
        Command::Push { entity, preview: true } => {
            let report = engine.preview_push(entity).await?;
            printer.preview(&report)?;
            Ok(report.errors.is_empty())
        }
        Command::Push { entity, preview: false } => {
            let report = engine.execute_push(entity).await?;
            printer.execute(entity, &report)?;
            Ok(!report.has_failures())
        }
        Command::PushRecord { entity, id } => {
            let report = engine.push_record(entity, &id).await?;
            printer.push_record(&report)?;
            Ok(report.success)
        }
        Command::Retry { reference } => {
            let outcome = engine.retry(&reference).await?;
            printer.retry(std::slice::from_ref(&outcome))?;
            Ok(outcome.success)
        }
        Command::RetryFailed { limit } => {
            let limit = limit.unwrap_or(config.sync.retry_batch_limit);
            let outcomes = engine.retry_failed(limit).await?;
            printer.retry(&outcomes)?;
            Ok(outcomes.iter().all(|o| o.success))
        }
        other => {
            debug!(?other, "Command does not use the ERP");
            run_local(other, engine.database(), &printer).await
        }
    }
}

/// Commands that only read or repair the local store.
async fn run_local(command: Command, db: &Database, printer: &Printer) -> Result<bool> {
    match command {
        Command::Valuate { item, source } => {
            let valuation = ValuationService::new(db).valuate(&item, source).await?;
            printer.valuation(&item, &valuation)?;
            Ok(true)
        }
        Command::ValuationReport { source } => {
            let report = ValuationService::new(db).report(source).await?;
            printer.valuation_report(&report)?;
            Ok(true)
        }
        Command::Log { status, limit } => {
            let log = db.sync_log();
            let entries = match status {
                Some(status) => log.list_by_status(status, limit).await?,
                None => log.list_recent(limit).await?,
            };
            let counts = log.count_by_status().await?;
            printer.log(&entries, &counts)?;
            Ok(true)
        }
        Command::ReconcileStock { item, repair } => {
            let result = db.ledger().reconcile(&item, repair).await?;
            printer.reconciliation(&item, &result, repair)?;
            Ok(result.is_consistent() || repair)
        }
        other => anyhow::bail!("{other:?} needs an ERP connection"),
    }
}

async fn open_database(config: &BridgeConfig) -> Result<Database> {
    let path = config.database_path();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    info!(path = %path.display(), "Opening local store");
    Database::new(DbConfig::new(&path))
        .await
        .with_context(|| format!("opening {}", path.display()))
}

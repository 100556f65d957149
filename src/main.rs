//! Query front end over a ledger snapshot.
//!
//! ## Usage
//!
//! ```bash
//! rustyledger --snapshot ~/ledger.json balance DXXX... DYYY...
//! rustyledger --snapshot ~/ledger.json transactions DXXX... --page 2 --direction received
//! rustyledger --snapshot ~/ledger.json unspent DXXX... --ascending
//! rustyledger --snapshot ~/ledger.json select DXXX... 12.5 --instant
//! rustyledger --snapshot ~/ledger.json mempool DXXX...
//! rustyledger --snapshot ~/ledger.json deposits DXXX... --from 1650000000 --ascending
//! ```
//!
//! Results are printed to stdout as JSON. Failures print an error body with
//! the error code and exit non-zero.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use rustyledger::amount::parse_amount;
use rustyledger::balance::compute_balances;
use rustyledger::clock::SystemClock;
use rustyledger::config::{init_global_config, settings, EngineSettings};
use rustyledger::constants::DEFAULT_DEPOSIT_TIMESTAMP_TO;
use rustyledger::deposits::{list_deposits, DepositQuery};
use rustyledger::error::ErrorBody;
use rustyledger::history::{list_mempool, list_transactions, TransactionQuery, TxDirection};
use rustyledger::memory::{MemoryLedger, SnapshotError};
use rustyledger::metrics::{gather_metrics, init_metrics};
use rustyledger::selection::{select_utxos, SelectionReport, SelectionRequest};
use rustyledger::telemetry::{init_tracing, TelemetryConfig};
use rustyledger::unspent::{list_unspent, UnspentQuery};
use rustyledger::{Collaborators, SapiError};

#[derive(Parser, Debug)]
#[clap(name = "rustyledger")]
#[clap(about = "Address balances, history and coin selection over a ledger snapshot", long_about = None)]
struct Args {
    /// Ledger snapshot (JSON)
    #[clap(long)]
    snapshot: String,

    /// Settings file (defaults to ./config.toml when present)
    #[clap(long)]
    config: Option<String>,

    /// Dump Prometheus metrics to stderr after the query
    #[clap(long, default_value_t = false)]
    metrics: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Balance, received and pending amounts for a batch of addresses
    Balance {
        #[clap(required = true)]
        addresses: Vec<String>,
    },
    /// Paged transaction history of one address
    Transactions {
        address: String,
        #[clap(long, default_value_t = 1)]
        page: u64,
        #[clap(long, default_value_t = 10)]
        page_size: u64,
        #[clap(long, default_value_t = false)]
        ascending: bool,
        /// any, received or sent
        #[clap(long, default_value = "any", value_parser = parse_direction)]
        direction: TxDirection,
    },
    /// Paged unspent outputs of one address
    Unspent {
        address: String,
        #[clap(long, default_value_t = 1)]
        page: u64,
        #[clap(long, default_value_t = 100)]
        page_size: u64,
        #[clap(long, default_value_t = false)]
        ascending: bool,
    },
    /// Pick outputs covering an amount plus fee
    Select {
        address: String,
        /// Amount in coins, e.g. 12.5
        #[clap(value_parser = parse_amount)]
        amount: i64,
        /// Fewest inputs instead of a random cover
        #[clap(long, default_value_t = false)]
        deterministic: bool,
        /// Only outputs deep enough for instant-send
        #[clap(long, default_value_t = false)]
        instant: bool,
    },
    /// Pending mempool deltas of one address
    Mempool { address: String },
    /// Paged deposits of one address within a time range
    Deposits {
        address: String,
        #[clap(long, default_value_t = 1)]
        page: u64,
        #[clap(long, default_value_t = 100)]
        page_size: u64,
        #[clap(long, default_value_t = false)]
        ascending: bool,
        /// UNIX time, inclusive
        #[clap(long, default_value_t = 0)]
        from: i64,
        /// UNIX time, exclusive
        #[clap(long, default_value_t = DEFAULT_DEPOSIT_TIMESTAMP_TO)]
        to: i64,
    },
}

fn parse_direction(text: &str) -> Result<TxDirection, SapiError> {
    text.parse()
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Query(#[from] SapiError),

    #[error("failed to encode result: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_tracing(TelemetryConfig::default())?;
    init_metrics()?;

    let config_path = args.config.as_deref().map(|p| PathBuf::from(shellexpand::tilde(p).to_string()));
    init_global_config(config_path.as_deref())?;
    let engine = settings()?;

    let snapshot_path = PathBuf::from(shellexpand::tilde(&args.snapshot).to_string());
    if !snapshot_path.exists() {
        eprintln!("❌ Snapshot does not exist: {}", snapshot_path.display());
        std::process::exit(1);
    }

    let command = args.command.clone();
    let result = tokio::task::spawn_blocking(move || run_query(&snapshot_path, &engine, command)).await?;

    if args.metrics {
        eprintln!("{}", gather_metrics()?);
    }

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(CliError::Query(err)) => {
            error!(code = err.code(), error = %err, "Query failed");
            println!("{}", serde_json::to_string_pretty(&ErrorBody::from(&err))?);
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("❌ {}", err);
            std::process::exit(1);
        }
    }
}

fn run_query(snapshot: &Path, engine: &EngineSettings, command: Command) -> Result<Value, CliError> {
    let ledger = MemoryLedger::load(snapshot, &engine.network)?;
    let clock = SystemClock::new();
    let ctx = Collaborators::from_ledger(&ledger, &clock, &engine.network);

    info!(command = ?command, "Running query");

    let value = match command {
        Command::Balance { addresses } => {
            serde_json::to_value(compute_balances(&ctx, engine.block_cache_size, &addresses)?)?
        }
        Command::Transactions { address, page, page_size, ascending, direction } => {
            let query = TransactionQuery { page_number: page, page_size, ascending, direction };
            serde_json::to_value(list_transactions(&ctx, &address, &query)?)?
        }
        Command::Unspent { address, page, page_size, ascending } => {
            let query = UnspentQuery { page_number: page, page_size, ascending };
            serde_json::to_value(list_unspent(&ctx, &address, &query)?)?
        }
        Command::Select { address, amount, deterministic, instant } => {
            let request = SelectionRequest { amount, random: !deterministic, instant_pay_only: instant };
            let solution = select_utxos(&ctx, engine, &address, &request)?;
            serde_json::to_value(SelectionReport::new(&ctx, &address, amount, &solution)?)?
        }
        Command::Mempool { address } => serde_json::to_value(list_mempool(&ctx, &address)?)?,
        Command::Deposits { address, page, page_size, ascending, from, to } => {
            let query = DepositQuery {
                page_number: page,
                page_size,
                ascending,
                timestamp_from: from,
                timestamp_to: to,
            };
            serde_json::to_value(list_deposits(&ctx, &address, &query)?)?
        }
    };

    Ok(value)
}

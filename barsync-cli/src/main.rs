//! barsync CLI — reconcile, merge, diff and inspect bar stores.
//!
//! Commands:
//! - `reconcile` — merge an incoming CSV into a store (append, rewrite or quarantine)
//! - `merge` — merge two CSV files without touching either
//! - `diff` — list shared dates whose bars differ
//! - `status` — row count, date range and fingerprint of a store
//!
//! Exit codes: 0 on success, 1 on error, 2 when a reconciliation was
//! quarantined.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use barsync_core::config::StoreConfig;
use barsync_core::data::{load_series, write_table, BarSchema, BarTable, CsvStore};
use barsync_core::reconcile::{diff_detailed, merge_csv, Reconciliation, StoreWriter};

#[derive(Parser)]
#[command(
    name = "barsync",
    about = "barsync CLI — daily bar reconciliation and incremental persistence"
)]
struct Cli {
    /// Store configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log merge internals (debug level) unless RUST_LOG says otherwise.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile an incoming CSV into a store.
    Reconcile {
        /// Store CSV file. Created if it does not exist.
        #[arg(long)]
        store: PathBuf,

        /// Incoming CSV file.
        #[arg(long)]
        incoming: PathBuf,

        /// Print the outcome as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Merge two CSV files and report the result.
    Merge {
        /// Base CSV file.
        base: PathBuf,

        /// Incoming CSV file.
        incoming: PathBuf,

        /// Write the merged series here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compare two CSV files over their shared dates.
    Diff {
        left: PathBuf,
        right: PathBuf,
    },
    /// Report row count, date range and fingerprint of a store.
    Status {
        store: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::default(),
    };

    match cli.command {
        Commands::Reconcile {
            store,
            incoming,
            json,
        } => run_reconcile(&store, &incoming, config, json),
        Commands::Merge {
            base,
            incoming,
            output,
        } => run_merge(&base, &incoming, output.as_deref(), &config),
        Commands::Diff { left, right } => run_diff(&left, &right, &config),
        Commands::Status { store } => run_status(&store, config),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run_reconcile(store: &Path, incoming: &Path, config: StoreConfig, json: bool) -> Result<()> {
    let writer = StoreWriter::new(CsvStore::with_config(store, config)?);
    let outcome = writer.reconcile_file(incoming).with_context(|| {
        format!(
            "reconciling {} into {}",
            incoming.display(),
            store.display()
        )
    })?;
    let summary = outcome.summary(store);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        match &outcome {
            Reconciliation::Committed {
                commit, series, ..
            } => {
                println!("Store:        {}", store.display());
                println!("Result:       {}", summary.status);
                println!("Rows written: {}", commit.rows_written());
                println!("Total rows:   {}", series.len());
                if let (Some(first), Some(last)) = (series.first_date(), series.last_date()) {
                    println!("Date range:   {first} to {last}");
                }
            }
            Reconciliation::Quarantined { path, error } => {
                eprintln!("Reconciliation rejected: {error}");
                eprintln!("Incoming data written to {}", path.display());
            }
        }
    }

    if !outcome.is_committed() {
        std::process::exit(2);
    }
    Ok(())
}

fn run_merge(
    base: &Path,
    incoming: &Path,
    output: Option<&Path>,
    config: &StoreConfig,
) -> Result<()> {
    let result = merge_csv(base, incoming, config)?;

    println!("Merged rows: {}", result.series.len());
    println!("New rows:    {}", result.new_rows());
    for interval in &result.intervals {
        let bars = &result.series.bars()[interval.range()];
        if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
            println!(
                "  [{}..={}] {} to {} ({} rows)",
                interval.start,
                interval.end,
                first.date,
                last.date,
                interval.row_count()
            );
        }
    }

    if let Some(path) = output {
        let table = BarTable::from_series(&result.series, config);
        write_table(path, &table, config.atomic_rewrite)?;
        println!("Written to {}", path.display());
    }
    Ok(())
}

fn run_diff(left: &Path, right: &Path, config: &StoreConfig) -> Result<()> {
    let schema = BarSchema::new(config);
    let a = load_series(left, &schema)?;
    let b = load_series(right, &schema)?;
    let diffs = diff_detailed(&a, &b);

    if diffs.is_empty() {
        println!("No differences on shared dates.");
        return Ok(());
    }

    println!("{} differing date(s):", diffs.len());
    for d in &diffs {
        println!("  {}  fields: {}", d.date, d.fields.join(", "));
        for (field, (l, r)) in barsync_core::domain::BAR_FIELDS
            .iter()
            .zip(d.left.values().into_iter().zip(d.right.values()))
        {
            if d.fields.contains(field) {
                println!("    {field:<7} {l} -> {r}");
            }
        }
    }
    Ok(())
}

fn run_status(store: &Path, config: StoreConfig) -> Result<()> {
    let store = CsvStore::with_config(store, config)?;
    let series = store.load()?;
    let fingerprint = store.fingerprint()?;

    println!("Store:       {}", store.path().display());
    println!("Rows:        {}", series.len());
    match (series.first_date(), series.last_date()) {
        (Some(first), Some(last)) => println!("Date range:  {first} to {last}"),
        _ => println!("Date range:  (empty)"),
    }
    println!("Fingerprint: {fingerprint}");

    let quarantine = store.quarantine_path();
    if quarantine.exists() {
        println!("Quarantine:  {} (pending)", quarantine.display());
    }
    Ok(())
}

//! BarVault CLI — bar import, series inspection, and cache maintenance.
//!
//! Commands:
//! - `import` — append bars from a CSV file to a series
//! - `read` — print a bar range as JSON
//! - `audit` — print the integrity report for a series
//! - `status` — list stored series with their metadata
//! - `sweep` — remove expired cache entries

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use barvault_artifacts::{Vault, VaultConfig};
use barvault_core::{Bar, Resolution};

#[derive(Parser)]
#[command(
    name = "barvault",
    about = "BarVault CLI — deterministic bar store and artifact cache"
)]
struct Cli {
    /// Path to a TOML config file. Flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory for bar series. Defaults to ./data.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Root directory for cached artifacts. Defaults to ./artifacts.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append bars from a CSV file (timestamp_ms,open,high,low,close,volume).
    Import {
        /// Instrument identifier (e.g. BTC-USD).
        instrument: String,

        /// Bar resolution: 1m, 5m, 15m, 30m, 1h, 4h, 1d.
        resolution: Resolution,

        /// CSV file to import.
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print bars for a series as JSON, ascending by timestamp.
    Read {
        instrument: String,
        resolution: Resolution,

        /// Inclusive range start, epoch milliseconds.
        #[arg(long)]
        from: Option<i64>,

        /// Inclusive range end, epoch milliseconds.
        #[arg(long)]
        to: Option<i64>,
    },
    /// Print the integrity report for a series.
    Audit {
        instrument: String,
        resolution: Resolution,
    },
    /// List stored series with bar counts, ranges, and content hashes.
    Status,
    /// Remove expired cache entries.
    Sweep,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let vault = open_vault(&cli)?;

    match cli.command {
        Commands::Import {
            instrument,
            resolution,
            csv,
        } => run_import(&vault, &instrument, resolution, &csv),
        Commands::Read {
            instrument,
            resolution,
            from,
            to,
        } => run_read(&vault, &instrument, resolution, from, to),
        Commands::Audit {
            instrument,
            resolution,
        } => run_audit(&vault, &instrument, resolution),
        Commands::Status => run_status(&vault),
        Commands::Sweep => run_sweep(&vault),
    }
}

fn open_vault(cli: &Cli) -> Result<Vault> {
    let mut config = match &cli.config {
        Some(path) => VaultConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => VaultConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(cache_dir) = &cli.cache_dir {
        config.cache_dir = cache_dir.clone();
    }
    Vault::open(&config).context("opening vault")
}

/// One CSV row of the import format.
#[derive(Debug, Deserialize)]
struct CsvBar {
    timestamp_ms: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn run_import(
    vault: &Vault,
    instrument: &str,
    resolution: Resolution,
    csv_path: &Path,
) -> Result<()> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("opening {}", csv_path.display()))?;

    let mut bars = Vec::new();
    for record in reader.deserialize() {
        let row: CsvBar = record.context("parsing CSV row")?;
        bars.push(Bar {
            instrument: instrument.to_string(),
            resolution,
            timestamp_ms: row.timestamp_ms,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    let report = vault.append_bars(instrument, resolution, bars)?;
    println!(
        "Imported {}/{} bars into {instrument}/{resolution} ({} replaced)",
        report.written,
        report.written + report.rejected.len(),
        report.replaced,
    );
    for rejected in &report.rejected {
        println!(
            "  rejected bar at {}: {}",
            rejected.bar.timestamp_ms, rejected.reason
        );
    }
    println!("content hash: {}", report.content_hash);
    Ok(())
}

fn run_read(
    vault: &Vault,
    instrument: &str,
    resolution: Resolution,
    from: Option<i64>,
    to: Option<i64>,
) -> Result<()> {
    let bars = vault.read_bars(instrument, resolution, from, to)?;
    println!("{}", serde_json::to_string_pretty(&bars)?);
    Ok(())
}

fn run_audit(vault: &Vault, instrument: &str, resolution: Resolution) -> Result<()> {
    let report = vault.audit_series(instrument, resolution)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_status(vault: &Vault) -> Result<()> {
    let keys = vault.store().list_series()?;
    if keys.is_empty() {
        println!("No series stored.");
        return Ok(());
    }
    for (instrument, resolution) in keys {
        let meta = vault.store().metadata(&instrument, resolution)?;
        println!(
            "{instrument}/{resolution}: {} bars, {} .. {}, hash {}",
            meta.bar_count, meta.start_timestamp_ms, meta.end_timestamp_ms, meta.content_hash,
        );
    }
    Ok(())
}

fn run_sweep(vault: &Vault) -> Result<()> {
    let removed = vault.sweep_expired()?;
    println!("Removed {removed} expired cache entries");
    Ok(())
}

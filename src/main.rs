//! Forward Factor scanner CLI
//!
//! # Usage
//!
//! ```bash
//! # Scan every snapshot file in a directory
//! ff-scan scan --snapshots data/chains
//!
//! # Scan selected tickers with a custom config and threshold
//! ff-scan scan --snapshots data/chains --config config/scan.toml --tickers SPY,QQQ --threshold 15
//!
//! # One-off Forward Factor from two volatilities
//! ff-scan forward --front-dte 30 --front-iv 45 --back-dte 60 --back-iv 38
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};

use ff_scanner::analytics::{forward_volatility, SignalBias};
use ff_scanner::config::ScanConfig;
use ff_scanner::data::DirectorySnapshotProvider;
use ff_scanner::scan::{render_table, to_json, ScanOrchestrator};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "ff-scan")]
#[command(about = "Scan option chains for Forward Factor term-structure signals")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a ticker universe
    Scan {
        /// Directory of <TICKER>.json chain snapshots
        #[arg(short, long)]
        snapshots: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Comma-separated tickers (default: every snapshot in the directory)
        #[arg(short, long)]
        tickers: Option<String>,

        /// Signal threshold in percent, overrides the config file
        #[arg(long)]
        threshold: Option<f64>,

        /// Scan at most this many tickers, overrides the config file
        #[arg(long)]
        max_tickers: Option<usize>,

        /// Scan date (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<String>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Compute a single Forward Factor from two volatilities
    Forward {
        #[arg(long)]
        front_dte: i32,

        /// Front volatility in percent
        #[arg(long)]
        front_iv: f64,

        #[arg(long)]
        back_dte: i32,

        /// Back volatility in percent
        #[arg(long)]
        back_iv: f64,

        /// Signal threshold in percent
        #[arg(long, default_value = "20")]
        threshold: f64,
    },
}

fn parse_tickers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

async fn run_scan(
    snapshots: PathBuf,
    config: Option<PathBuf>,
    tickers: Option<String>,
    threshold: Option<f64>,
    max_tickers: Option<usize>,
    date: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut config = match &config {
        Some(path) => ScanConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ScanConfig::default(),
    };
    if let Some(t) = threshold {
        config = config.with_threshold(t);
    }
    if max_tickers.is_some() {
        config.universe.max_tickers = max_tickers;
    }
    config.validate().context("Invalid configuration")?;

    let scan_date = match date {
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .with_context(|| format!("Invalid scan date: {d}"))?,
        None => Local::now().date_naive(),
    };

    let provider = DirectorySnapshotProvider::new(&snapshots);
    let tickers = match tickers {
        Some(raw) => parse_tickers(&raw),
        None => provider
            .available_tickers()
            .with_context(|| format!("Failed to list snapshots in {}", snapshots.display()))?,
    };
    if tickers.is_empty() {
        bail!("No tickers to scan");
    }

    let threshold = config.signal_threshold;
    let scanner = ScanOrchestrator::new(config, Arc::new(provider));
    let result = scanner.scan(&tickers, scan_date).await;

    match format {
        OutputFormat::Table => print!("{}", render_table(&result, threshold)),
        OutputFormat::Json => println!("{}", to_json(&result).context("Failed to encode report")?),
    }

    Ok(())
}

fn run_forward(front_dte: i32, front_iv: f64, back_dte: i32, back_iv: f64, threshold: f64) -> Result<()> {
    let fwd = forward_volatility(front_iv / 100.0, front_dte, back_iv / 100.0, back_dte)
        .context("Forward volatility undefined for these inputs")?;

    let ff_pct = fwd.forward_factor_pct();
    let bias = match SignalBias::from_forward_factor(fwd.forward_factor) {
        SignalBias::Bearish => "bearish (front elevated)",
        SignalBias::Bullish => "bullish (front depressed)",
        SignalBias::Neutral => "neutral",
    };

    println!("{}", SEPARATOR);
    println!("Forward Factor");
    println!("{}", SEPARATOR);
    println!("  Front:           {:>5} DTE @ {:.2}%", front_dte, front_iv);
    println!("  Back:            {:>5} DTE @ {:.2}%", back_dte, back_iv);
    println!("  Forward vol:     {:.2}%", fwd.forward_volatility * 100.0);
    println!("  Forward factor:  {:+.2}%", ff_pct);
    println!("  Bias:            {}", bias);
    println!(
        "  Signal:          {} (threshold {:.1}%)",
        if ff_pct.abs() > threshold { "YES" } else { "no" },
        threshold
    );
    println!("{}", SEPARATOR);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "ff_scanner=debug" } else { "ff_scanner=info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scan {
            snapshots,
            config,
            tickers,
            threshold,
            max_tickers,
            date,
            format,
        } => run_scan(snapshots, config, tickers, threshold, max_tickers, date, format).await,
        Commands::Forward {
            front_dte,
            front_iv,
            back_dte,
            back_iv,
            threshold,
        } => run_forward(front_dte, front_iv, back_dte, back_iv, threshold),
    }
}

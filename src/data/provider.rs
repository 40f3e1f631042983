//! Snapshot providers.
//!
//! The scanner never talks to the brokerage directly. It asks a
//! [`SnapshotProvider`] for one ticker's chain and treats that call as a
//! bounded, retryable I/O operation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use super::chain_json::{parse_chain, ChainParseError};
use super::types::OptionsSnapshot;
use crate::config::FetchConfig;

/// Snapshot retrieval errors.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("No chain available for {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid chain data: {0}")]
    InvalidChain(#[from] ChainParseError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_))
    }
}

/// Source of per-ticker chain snapshots.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch(&self, ticker: &str, scan_date: NaiveDate)
        -> Result<OptionsSnapshot, FetchError>;
}

/// Reads `<dir>/<TICKER>.json` files in the brokerage chain format.
/// File names match tickers case-insensitively.
pub struct DirectorySnapshotProvider {
    dir: PathBuf,
}

fn json_stem(path: &Path) -> Option<String> {
    let is_json = path
        .extension()
        .is_some_and(|x| x.eq_ignore_ascii_case("json"));
    if !is_json {
        return None;
    }
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
}

impl DirectorySnapshotProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Snapshot file whose stem equals `ticker` ignoring case.
    async fn locate(&self, ticker: &str) -> Result<Option<PathBuf>, FetchError> {
        let exact = self.dir.join(format!("{}.json", ticker.to_uppercase()));
        if tokio::fs::try_exists(&exact).await? {
            return Ok(Some(exact));
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if json_stem(&path).is_some_and(|stem| stem.eq_ignore_ascii_case(ticker)) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Tickers with a snapshot file in the directory, uppercased.
    pub fn available_tickers(&self) -> Result<Vec<String>, FetchError> {
        let mut tickers = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            if let Some(stem) = json_stem(&entry?.path()) {
                tickers.push(stem.to_uppercase());
            }
        }
        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }
}

#[async_trait]
impl SnapshotProvider for DirectorySnapshotProvider {
    async fn fetch(
        &self,
        ticker: &str,
        scan_date: NaiveDate,
    ) -> Result<OptionsSnapshot, FetchError> {
        let Some(path) = self.locate(ticker).await? else {
            return Err(FetchError::NotFound(ticker.to_string()));
        };
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(ticker.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(parse_chain(&ticker.to_uppercase(), scan_date, &content)?)
    }
}

/// In-memory provider keyed by ticker. Snapshots are served as-is.
#[derive(Default)]
pub struct StaticSnapshotProvider {
    snapshots: HashMap<String, OptionsSnapshot>,
}

impl StaticSnapshotProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, snapshot: OptionsSnapshot) -> Self {
        self.insert(snapshot);
        self
    }

    pub fn insert(&mut self, snapshot: OptionsSnapshot) {
        self.snapshots.insert(snapshot.ticker.clone(), snapshot);
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshotProvider {
    async fn fetch(
        &self,
        ticker: &str,
        _scan_date: NaiveDate,
    ) -> Result<OptionsSnapshot, FetchError> {
        self.snapshots
            .get(ticker)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(ticker.to_string()))
    }
}

/// Fetch with a per-attempt timeout and exponential backoff between
/// retryable failures.
pub async fn fetch_with_retry(
    provider: &dyn SnapshotProvider,
    ticker: &str,
    scan_date: NaiveDate,
    config: &FetchConfig,
) -> Result<OptionsSnapshot, FetchError> {
    let timeout = config.timeout();
    let mut attempt: u32 = 0;

    loop {
        let result = match tokio::time::timeout(timeout, provider.fetch(ticker, scan_date)).await {
            Ok(r) => r,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };

        match result {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) if e.is_retryable() && attempt < config.retries => {
                debug!(ticker, attempt, error = %e, "retrying chain fetch");
                tokio::time::sleep(config.backoff(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

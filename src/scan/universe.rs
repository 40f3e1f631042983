//! Ticker universe selection.
//!
//! Narrows a requested ticker list before any chain is fetched. Each
//! dropped ticker keeps the reason it was dropped so reports can list it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{UniverseConfig, LARGE_CAPS};

/// Substrings marking index products and funds.
pub const FUND_PATTERNS: &[&str] = &["SPXW", "QQQ", "SPY", "IWM", "ETF", "FUND"];

const MAX_SYMBOL_LEN: usize = 5;

/// Why a requested ticker is not scanned.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    #[error("listed more than once")]
    Duplicate,

    #[error("malformed symbol")]
    InvalidSymbol,

    #[error("blacklisted")]
    Blacklisted,

    #[error("not in whitelist")]
    NotWhitelisted,

    #[error("large cap")]
    LargeCap,

    #[error("index or fund")]
    Fund,

    #[error("beyond max_tickers")]
    OverLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedTicker {
    pub ticker: String,
    pub reason: Exclusion,
}

/// Tickers to scan, in request order, plus everything left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Universe {
    pub tickers: Vec<String>,
    pub excluded: Vec<ExcludedTicker>,
}

/// 1 to 5 characters, letters and digits plus `.` and `-` class separators.
pub fn is_valid_symbol(ticker: &str) -> bool {
    if ticker.is_empty() || ticker.len() > MAX_SYMBOL_LEN {
        return false;
    }
    let mut core = ticker.chars().filter(|c| *c != '.' && *c != '-').peekable();
    core.peek().is_some() && core.all(|c| c.is_ascii_alphanumeric())
}

pub fn is_fund(ticker: &str) -> bool {
    FUND_PATTERNS.iter().any(|p| ticker.contains(p))
}

fn normalize(list: &[String]) -> HashSet<String> {
    list.iter().map(|t| t.trim().to_uppercase()).collect()
}

/// Apply `config` to `requested`. Tickers are trimmed and uppercased;
/// blank entries are dropped silently.
pub fn select(requested: &[String], config: &UniverseConfig) -> Universe {
    let blacklist = normalize(&config.blacklist);
    let whitelist = normalize(&config.whitelist);
    let limit = config.max_tickers.unwrap_or(usize::MAX);

    let mut seen = HashSet::new();
    let mut universe = Universe::default();

    for raw in requested {
        let ticker = raw.trim().to_uppercase();
        if ticker.is_empty() {
            continue;
        }

        let reason = if !seen.insert(ticker.clone()) {
            Some(Exclusion::Duplicate)
        } else if config.validate_symbols && !is_valid_symbol(&ticker) {
            Some(Exclusion::InvalidSymbol)
        } else if blacklist.contains(&ticker) {
            Some(Exclusion::Blacklisted)
        } else if !whitelist.is_empty() && !whitelist.contains(&ticker) {
            Some(Exclusion::NotWhitelisted)
        } else if config.exclude_large_caps && LARGE_CAPS.contains(&ticker.as_str()) {
            Some(Exclusion::LargeCap)
        } else if config.exclude_funds && is_fund(&ticker) {
            Some(Exclusion::Fund)
        } else if universe.tickers.len() >= limit {
            Some(Exclusion::OverLimit)
        } else {
            None
        };

        match reason {
            Some(reason) => universe.excluded.push(ExcludedTicker { ticker, reason }),
            None => universe.tickers.push(ticker),
        }
    }

    universe
}

//! Core data types for option chain snapshots.
//!
//! A snapshot is one underlying's full chain at one point in time,
//! grouped by expiration. Quotes are immutable once built.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

/// A single option quote at scan time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    /// Strike price
    pub strike: Decimal,

    /// Option type (call or put)
    pub option_type: OptionType,

    /// Option expiration date
    pub expiration: NaiveDate,

    /// Days to expiration, measured from the scan date
    pub dte: i32,

    /// Bid price
    pub bid: Decimal,

    /// Ask price
    pub ask: Decimal,

    /// Last traded price
    pub last: Decimal,

    /// Trading volume
    pub volume: i64,

    /// Open interest
    pub open_interest: i64,

    /// Underlying price shared by every quote in the snapshot
    pub underlying_price: Decimal,
}

impl OptionQuote {
    /// Bid/ask mid, or `None` when the market is degenerate.
    ///
    /// Both sides zero, a negative side, or a crossed market (bid > ask)
    /// have no usable mid.
    pub fn mid(&self) -> Option<Decimal> {
        if self.bid.is_sign_negative() || self.ask <= Decimal::ZERO || self.bid > self.ask {
            return None;
        }
        Some((self.bid + self.ask) / Decimal::from(2))
    }

    /// Absolute bid-ask spread.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Bid-ask spread as percentage of mid.
    pub fn spread_pct(&self) -> Option<f64> {
        let mid = self.mid()?;
        if mid.is_zero() {
            return None;
        }
        (self.spread() / mid * Decimal::from(100)).to_f64()
    }

    pub fn strike_f64(&self) -> f64 {
        self.strike.to_f64().unwrap_or(0.0)
    }

    pub fn underlying_f64(&self) -> f64 {
        self.underlying_price.to_f64().unwrap_or(0.0)
    }

    /// Time to expiration in years (ACT/365).
    pub fn years_to_expiry(&self) -> f64 {
        self.dte as f64 / 365.0
    }
}

/// All options for a single expiration date.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsChain {
    /// Expiration date for this chain
    pub expiration: NaiveDate,

    /// Days to expiration
    pub dte: i32,

    /// Calls in strike order
    pub calls: Vec<OptionQuote>,

    /// Puts in strike order
    pub puts: Vec<OptionQuote>,
}

impl OptionsChain {
    /// Create a new empty chain.
    pub fn new(expiration: NaiveDate, dte: i32) -> Self {
        Self {
            expiration,
            dte,
            calls: Vec::new(),
            puts: Vec::new(),
        }
    }

    /// Add a quote to the appropriate side.
    pub fn add_quote(&mut self, quote: OptionQuote) {
        match quote.option_type {
            OptionType::Call => self.calls.push(quote),
            OptionType::Put => self.puts.push(quote),
        }
    }

    /// Sort both sides by strike.
    pub fn sort_by_strike(&mut self) {
        self.calls.sort_by(|a, b| a.strike.cmp(&b.strike));
        self.puts.sort_by(|a, b| a.strike.cmp(&b.strike));
    }

    /// Calls followed by puts.
    pub fn quotes(&self) -> impl Iterator<Item = &OptionQuote> {
        self.calls.iter().chain(self.puts.iter())
    }

    pub fn len(&self) -> usize {
        self.calls.len() + self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.puts.is_empty()
    }
}

/// Complete options snapshot for one underlying at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsSnapshot {
    /// Scan date DTE is measured from
    pub date: NaiveDate,

    /// Underlying symbol
    pub ticker: String,

    /// Underlying price
    pub underlying_price: Decimal,

    /// Option chains sorted by expiration
    pub chains: Vec<OptionsChain>,
}

impl OptionsSnapshot {
    /// Create a new empty snapshot.
    pub fn new(date: NaiveDate, ticker: String, underlying_price: Decimal) -> Self {
        Self {
            date,
            ticker,
            underlying_price,
            chains: Vec::new(),
        }
    }

    /// Insert a chain, keeping expiration order. An existing chain for the
    /// same expiration is replaced.
    pub fn insert_chain(&mut self, chain: OptionsChain) {
        match self
            .chains
            .binary_search_by_key(&chain.expiration, |c| c.expiration)
        {
            Ok(idx) => self.chains[idx] = chain,
            Err(idx) => self.chains.insert(idx, chain),
        }
    }

    /// Get chain for a specific expiration.
    pub fn chain_at_expiration(&self, expiration: NaiveDate) -> Option<&OptionsChain> {
        self.chains.iter().find(|c| c.expiration == expiration)
    }
}

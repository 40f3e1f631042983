//! Synthetic chains priced off Black-Scholes, shared by unit tests.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use crate::data::{OptionQuote, OptionType, OptionsChain, OptionsSnapshot};
use crate::pricing::BlackScholes;

pub fn scan_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

fn dec(v: f64) -> Decimal {
    Decimal::try_from(v).unwrap().round_dp(4)
}

/// A quote whose mid is the model price at `vol`, with a 10 cent market.
pub fn priced_quote(spot: f64, strike: f64, dte: i32, vol: f64, option_type: OptionType) -> OptionQuote {
    let model = BlackScholes::default();
    let mid = model.price(spot, strike, dte as f64 / 365.0, vol, option_type);

    OptionQuote {
        strike: dec(strike),
        option_type,
        expiration: scan_date() + Duration::days(dte as i64),
        dte,
        bid: dec((mid - 0.05).max(0.0)),
        ask: dec(mid + 0.05),
        last: dec(mid),
        volume: 100,
        open_interest: 1000,
        underlying_price: dec(spot),
    }
}

/// Calls and puts from 70% to 130% of spot in 2.5% steps.
pub fn priced_chain(spot: f64, dte: i32, vol: f64) -> OptionsChain {
    let mut chain = OptionsChain::new(scan_date() + Duration::days(dte as i64), dte);
    for i in 0..=24 {
        let strike = spot * (0.70 + 0.025 * i as f64);
        chain.add_quote(priced_quote(spot, strike, dte, vol, OptionType::Call));
        chain.add_quote(priced_quote(spot, strike, dte, vol, OptionType::Put));
    }
    chain.sort_by_strike();
    chain
}

/// Snapshot with one flat-vol chain per `(dte, vol)` entry.
pub fn priced_snapshot(ticker: &str, spot: f64, expiries: &[(i32, f64)]) -> OptionsSnapshot {
    let mut snapshot = OptionsSnapshot::new(scan_date(), ticker.to_string(), dec(spot));
    for &(dte, vol) in expiries {
        snapshot.insert_chain(priced_chain(spot, dte, vol));
    }
    snapshot
}

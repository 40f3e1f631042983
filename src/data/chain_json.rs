//! Brokerage option-chain JSON parsing.
//!
//! The brokerage returns one document per underlying:
//!
//! ```json
//! {
//!   "symbol": "TEAM",
//!   "underlyingPrice": 182.4,
//!   "callExpDateMap": { "2024-02-16:30": { "180.0": [ { "bid": 8.1, ... } ] } },
//!   "putExpDateMap":  { "2024-02-16:30": { "180.0": [ { "bid": 6.2, ... } ] } }
//! }
//! ```
//!
//! Expiration keys carry a `:N` suffix with the brokerage's own DTE count,
//! which is ignored; DTE is recomputed against the scan date.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::types::{OptionQuote, OptionType, OptionsChain, OptionsSnapshot};

/// Errors turning a raw chain document into a snapshot.
#[derive(Error, Debug)]
pub enum ChainParseError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Underlying price missing or non-positive for {0}")]
    InvalidUnderlying(String),
}

/// Strike -> contracts listed at that strike.
pub type StrikeMap = BTreeMap<String, Vec<RawContract>>;

/// Raw chain document as returned by the brokerage. Fields the scanner
/// does not read (`symbol`, `status`, ...) are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChainResponse {
    #[serde(default)]
    pub underlying_price: Option<f64>,
    #[serde(default)]
    pub call_exp_date_map: BTreeMap<String, StrikeMap>,
    #[serde(default)]
    pub put_exp_date_map: BTreeMap<String, StrikeMap>,
}

/// Raw contract record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContract {
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
    #[serde(default)]
    pub last: Option<f64>,
    #[serde(default)]
    pub total_volume: Option<i64>,
    #[serde(default)]
    pub open_interest: Option<i64>,
}

/// Parse `YYYY-MM-DD` or `YYYY-MM-DD:N`.
pub fn parse_expiration_key(key: &str) -> Option<NaiveDate> {
    let date_part = key.split(':').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn to_decimal(value: Option<f64>) -> Decimal {
    value
        .filter(|v| v.is_finite())
        .and_then(|v| Decimal::try_from(v).ok())
        .unwrap_or(Decimal::ZERO)
}

impl RawContract {
    fn to_quote(
        &self,
        strike: Decimal,
        option_type: OptionType,
        expiration: NaiveDate,
        dte: i32,
        underlying_price: Decimal,
    ) -> OptionQuote {
        OptionQuote {
            strike,
            option_type,
            expiration,
            dte,
            bid: to_decimal(self.bid),
            ask: to_decimal(self.ask),
            last: to_decimal(self.last),
            volume: self.total_volume.unwrap_or(0),
            open_interest: self.open_interest.unwrap_or(0),
            underlying_price,
        }
    }
}

/// Parse a raw chain document from a JSON string.
pub fn parse_chain(
    ticker: &str,
    scan_date: NaiveDate,
    json: &str,
) -> Result<OptionsSnapshot, ChainParseError> {
    let raw: RawChainResponse = serde_json::from_str(json)?;
    raw_to_snapshot(ticker, scan_date, raw)
}

/// Convert a raw chain document to an OptionsSnapshot.
///
/// Expired expirations (negative DTE) and unparseable keys are dropped.
pub fn raw_to_snapshot(
    ticker: &str,
    scan_date: NaiveDate,
    raw: RawChainResponse,
) -> Result<OptionsSnapshot, ChainParseError> {
    let underlying_price = match raw.underlying_price {
        Some(p) if p.is_finite() && p > 0.0 => {
            Decimal::try_from(p).map_err(|_| ChainParseError::InvalidUnderlying(ticker.into()))?
        }
        _ => return Err(ChainParseError::InvalidUnderlying(ticker.to_string())),
    };

    let mut chains: BTreeMap<NaiveDate, OptionsChain> = BTreeMap::new();

    let sides = [
        (OptionType::Call, &raw.call_exp_date_map),
        (OptionType::Put, &raw.put_exp_date_map),
    ];

    for (option_type, exp_map) in sides {
        for (exp_key, strikes) in exp_map {
            let Some(expiration) = parse_expiration_key(exp_key) else {
                debug!(ticker, key = %exp_key, "skipping unparseable expiration key");
                continue;
            };

            let dte = (expiration - scan_date).num_days() as i32;
            if dte < 0 {
                continue;
            }

            let chain = chains
                .entry(expiration)
                .or_insert_with(|| OptionsChain::new(expiration, dte));

            for (strike_key, contracts) in strikes {
                let Ok(strike) = strike_key.parse::<Decimal>() else {
                    debug!(ticker, strike = %strike_key, "skipping unparseable strike");
                    continue;
                };

                for contract in contracts {
                    chain.add_quote(contract.to_quote(
                        strike,
                        option_type,
                        expiration,
                        dte,
                        underlying_price,
                    ));
                }
            }
        }
    }

    let mut snapshot = OptionsSnapshot::new(scan_date, ticker.to_string(), underlying_price);
    for (_, mut chain) in chains {
        if chain.is_empty() {
            continue;
        }
        chain.sort_by_strike();
        snapshot.insert_chain(chain);
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "symbol": "TEAM",
        "underlyingPrice": 100.0,
        "callExpDateMap": {
            "2024-02-16:32": {
                "105.0": [{"bid": 1.9, "ask": 2.1, "last": 2.0, "totalVolume": 40, "openInterest": 300}],
                "100.0": [{"bid": 4.0, "ask": 4.2, "last": 4.1, "totalVolume": 120, "openInterest": 900}]
            },
            "2024-01-05:-10": {
                "100.0": [{"bid": 0.1, "ask": 0.2}]
            }
        },
        "putExpDateMap": {
            "2024-02-16:32": {
                "95.0": [{"bid": 1.5, "ask": 1.7, "totalVolume": 12, "openInterest": 80}]
            },
            "2024-03-15:60": {
                "100.0": [{"bid": 5.0, "ask": 5.4}]
            }
        }
    }"#;

    fn scan_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_parse_expiration_key() {
        assert_eq!(
            parse_expiration_key("2024-02-16:32"),
            NaiveDate::from_ymd_opt(2024, 2, 16)
        );
        assert_eq!(
            parse_expiration_key("2024-02-16"),
            NaiveDate::from_ymd_opt(2024, 2, 16)
        );
        assert_eq!(parse_expiration_key("garbage"), None);
    }

    #[test]
    fn test_parse_chain_groups_by_expiration() {
        let snapshot = parse_chain("TEAM", scan_date(), SAMPLE).unwrap();

        // The January expiry is already past and gets dropped
        assert_eq!(snapshot.chains.len(), 2);
        assert_eq!(snapshot.underlying_price, Decimal::from(100));

        let feb = &snapshot.chains[0];
        assert_eq!(feb.dte, 32);
        assert_eq!(feb.calls.len(), 2);
        assert_eq!(feb.puts.len(), 1);
        // Sorted by strike
        assert_eq!(feb.calls[0].strike, Decimal::from(100));
        assert_eq!(feb.calls[0].volume, 120);
        assert_eq!(feb.calls[0].open_interest, 900);

        let mar = &snapshot.chains[1];
        assert_eq!(mar.dte, 60);
        assert_eq!(mar.puts[0].volume, 0);
    }

    #[test]
    fn test_missing_underlying_is_an_error() {
        let json = r#"{"callExpDateMap": {}}"#;
        let err = parse_chain("XYZ", scan_date(), json).unwrap_err();
        assert!(matches!(err, ChainParseError::InvalidUnderlying(_)));
    }
}

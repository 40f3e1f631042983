//! Per-expiration volatility aggregation.
//!
//! Collapses a liquidity-filtered set into one representative volatility:
//! the plain mean of the member implied volatilities. Members whose IV
//! cannot be recovered drop out of the mean instead of failing the leg.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::liquidity::FilteredSet;
use crate::data::OptionType;
use crate::pricing::BlackScholes;

/// Representative volatility for one expiration.
///
/// Only produced by [`aggregate`] from a set with at least one usable
/// member, so `volatility` is always positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpirationVolatility {
    pub expiration: NaiveDate,
    pub dte: i32,
    /// Mean implied volatility, decimal (0.45 = 45%).
    pub volatility: f64,
    /// Options that contributed to the mean.
    pub option_count: usize,
    pub underlying_price: f64,
    /// Mean call IV, if any call contributed.
    pub call_iv: Option<f64>,
    /// Mean put IV, if any put contributed.
    pub put_iv: Option<f64>,
    /// Summed volume of contributing options.
    pub total_volume: i64,
}

/// Result of aggregating one expiration.
#[derive(Debug, Clone, PartialEq)]
pub enum VolatilityOutcome {
    Available(ExpirationVolatility),
    /// Nothing survived filtering, or no member yielded an IV.
    NoVolatility {
        expiration: NaiveDate,
        dte: i32,
        attempted: usize,
    },
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Aggregate a filtered set into its representative volatility.
pub fn aggregate(filtered: &FilteredSet, model: &BlackScholes) -> VolatilityOutcome {
    let mut call_ivs = Vec::new();
    let mut put_ivs = Vec::new();
    let mut total_volume = 0i64;
    let mut underlying_price = 0.0;

    for quote in &filtered.quotes {
        let Some(mid) = quote.mid().and_then(|m| m.to_f64()) else {
            continue;
        };
        let Ok(solved) = model.implied_vol(
            quote.underlying_f64(),
            quote.strike_f64(),
            quote.years_to_expiry(),
            mid,
            quote.option_type,
        ) else {
            continue;
        };

        match quote.option_type {
            OptionType::Call => call_ivs.push(solved.iv),
            OptionType::Put => put_ivs.push(solved.iv),
        }
        total_volume += quote.volume;
        underlying_price = quote.underlying_f64();
    }

    let all: Vec<f64> = call_ivs.iter().chain(put_ivs.iter()).copied().collect();
    let Some(volatility) = mean(&all) else {
        return VolatilityOutcome::NoVolatility {
            expiration: filtered.expiration,
            dte: filtered.dte,
            attempted: filtered.len(),
        };
    };

    VolatilityOutcome::Available(ExpirationVolatility {
        expiration: filtered.expiration,
        dte: filtered.dte,
        volatility,
        option_count: all.len(),
        underlying_price,
        call_iv: mean(&call_ivs),
        put_iv: mean(&put_ivs),
        total_volume,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rust_decimal::Decimal;

    use super::*;
    use crate::analytics::liquidity::LiquidityFilter;
    use crate::config::ScanConfig;
    use crate::testutil::{priced_chain, priced_quote};

    #[test]
    fn test_flat_chain_recovers_its_volatility() {
        let config = ScanConfig::default();
        let chain = priced_chain(100.0, 30, 0.60);
        let filtered = LiquidityFilter::from_config(&config).filter_chain(&chain);

        let VolatilityOutcome::Available(vol) = aggregate(&filtered, &BlackScholes::default())
        else {
            panic!("volatility available");
        };

        assert_abs_diff_eq!(vol.volatility, 0.60, epsilon = 1e-3);
        assert_eq!(vol.option_count, filtered.len());
        assert_eq!(vol.dte, 30);
        assert!(vol.call_iv.is_some());
        assert!(vol.put_iv.is_some());
        assert_eq!(vol.total_volume, 100 * filtered.len() as i64);
    }

    #[test]
    fn test_mean_of_members() {
        let q1 = priced_quote(100.0, 100.0, 45, 0.40, OptionType::Call);
        let q2 = priced_quote(100.0, 100.0, 45, 0.50, OptionType::Put);
        let filtered = FilteredSet {
            expiration: q1.expiration,
            dte: 45,
            quotes: vec![q1, q2],
        };

        let VolatilityOutcome::Available(vol) = aggregate(&filtered, &BlackScholes::default())
        else {
            panic!("volatility available");
        };
        assert_abs_diff_eq!(vol.volatility, 0.45, epsilon = 1e-3);
        assert_abs_diff_eq!(vol.call_iv.unwrap(), 0.40, epsilon = 1e-3);
        assert_abs_diff_eq!(vol.put_iv.unwrap(), 0.50, epsilon = 1e-3);
        assert_eq!(vol.option_count, 2);
    }

    #[test]
    fn test_empty_set_has_no_volatility() {
        let filtered = FilteredSet {
            expiration: NaiveDate::from_ymd_opt(2024, 2, 14).unwrap(),
            dte: 30,
            quotes: Vec::new(),
        };

        let outcome = aggregate(&filtered, &BlackScholes::default());
        assert!(matches!(
            outcome,
            VolatilityOutcome::NoVolatility { attempted: 0, dte: 30, .. }
        ));
    }

    #[test]
    fn test_unsolvable_member_drops_out_of_mean() {
        let solvable = priced_quote(100.0, 100.0, 30, 0.40, OptionType::Call);
        // Mid 15 is below the 80 call's intrinsic value, so no IV exists
        let mut below_intrinsic = priced_quote(100.0, 80.0, 30, 0.40, OptionType::Call);
        below_intrinsic.bid = Decimal::new(1495, 2);
        below_intrinsic.ask = Decimal::new(1505, 2);

        let filtered = FilteredSet {
            expiration: solvable.expiration,
            dte: 30,
            quotes: vec![solvable, below_intrinsic],
        };

        let VolatilityOutcome::Available(vol) = aggregate(&filtered, &BlackScholes::default())
        else {
            panic!("one member is solvable");
        };
        assert_abs_diff_eq!(vol.volatility, 0.40, epsilon = 1e-3);
        assert_eq!(vol.option_count, 1);
        assert_eq!(vol.total_volume, 100);
        assert!(vol.put_iv.is_none());
    }

    #[test]
    fn test_all_unsolvable_members_have_no_volatility() {
        let mut q = priced_quote(100.0, 80.0, 30, 0.40, OptionType::Call);
        q.bid = Decimal::new(1495, 2);
        q.ask = Decimal::new(1505, 2);
        let filtered = FilteredSet {
            expiration: q.expiration,
            dte: 30,
            quotes: vec![q],
        };

        assert!(matches!(
            aggregate(&filtered, &BlackScholes::default()),
            VolatilityOutcome::NoVolatility { attempted: 1, .. }
        ));
    }
}

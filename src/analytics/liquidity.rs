//! Liquidity filtering for one expiration.
//!
//! Keeps the near-the-money, tradable subset of a chain:
//! - Usable market (bid/ask not both zero, not crossed)
//! - Mid price and bid-ask spread within limits
//! - Volume and open interest minima (0 disables)
//! - |delta| inside the configured band, calls and puts alike
//!
//! Delta comes from the quote's own implied volatility, so a quote whose
//! IV cannot be recovered is excluded rather than raising.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DeltaBand, ScanConfig};
use crate::data::{OptionQuote, OptionsChain};
use crate::pricing::{BlackScholes, ConvergenceError, IvResult};

/// Why a quote was left out of the filtered set.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("degenerate market (no bid/ask or crossed)")]
    DegenerateMarket,

    #[error("mid price {0:.4} below minimum")]
    LowMidPrice(f64),

    #[error("bid-ask spread {0:.1}% too wide")]
    WideSpread(f64),

    #[error("absolute spread {0:.2} too wide")]
    WideAbsoluteSpread(f64),

    #[error("volume {0} below minimum")]
    LowVolume(i64),

    #[error("open interest {0} below minimum")]
    LowOpenInterest(i64),

    #[error("implied volatility unavailable: {0}")]
    NoImpliedVol(ConvergenceError),

    #[error("delta {0:.3} outside band")]
    OutsideDeltaBand(f64),
}

/// Liquidity thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityCriteria {
    pub delta_band: DeltaBand,
    pub max_spread_pct: f64,
    pub max_spread_abs: Option<f64>,
    pub min_mid_price: f64,
    pub min_volume: i64,
    pub min_open_interest: i64,
}

impl From<&ScanConfig> for LiquidityCriteria {
    fn from(config: &ScanConfig) -> Self {
        Self {
            delta_band: config.delta_band,
            max_spread_pct: config.max_spread_pct,
            max_spread_abs: config.max_spread_abs,
            min_mid_price: config.min_mid_price,
            min_volume: config.min_volume,
            min_open_interest: config.min_open_interest,
        }
    }
}

/// Quotes from one expiration that passed every criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredSet {
    pub expiration: NaiveDate,
    pub dte: i32,
    pub quotes: Vec<OptionQuote>,
}

impl FilteredSet {
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }
}

/// Liquidity and delta filter.
#[derive(Debug, Clone)]
pub struct LiquidityFilter {
    criteria: LiquidityCriteria,
    model: BlackScholes,
}

impl LiquidityFilter {
    pub fn new(criteria: LiquidityCriteria, model: BlackScholes) -> Self {
        Self { criteria, model }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            LiquidityCriteria::from(config),
            BlackScholes::new(config.risk_free_rate, config.dividend_yield),
        )
    }

    /// Check one quote. On success returns the IV solve used for delta.
    pub fn evaluate(&self, quote: &OptionQuote) -> Result<IvResult, Rejection> {
        let c = &self.criteria;

        let mid = quote
            .mid()
            .and_then(|m| m.to_f64())
            .filter(|m| *m > 0.0)
            .ok_or(Rejection::DegenerateMarket)?;

        if mid < c.min_mid_price {
            return Err(Rejection::LowMidPrice(mid));
        }

        let spread_pct = quote.spread_pct().ok_or(Rejection::DegenerateMarket)?;
        if spread_pct > c.max_spread_pct {
            return Err(Rejection::WideSpread(spread_pct));
        }

        if let Some(max_abs) = c.max_spread_abs {
            let spread = quote.spread().to_f64().unwrap_or(f64::INFINITY);
            if spread > max_abs {
                return Err(Rejection::WideAbsoluteSpread(spread));
            }
        }

        if quote.volume < c.min_volume {
            return Err(Rejection::LowVolume(quote.volume));
        }
        if quote.open_interest < c.min_open_interest {
            return Err(Rejection::LowOpenInterest(quote.open_interest));
        }

        let solved = self
            .model
            .implied_vol(
                quote.underlying_f64(),
                quote.strike_f64(),
                quote.years_to_expiry(),
                mid,
                quote.option_type,
            )
            .map_err(Rejection::NoImpliedVol)?;

        if !c.delta_band.contains(solved.delta) {
            return Err(Rejection::OutsideDeltaBand(solved.delta));
        }

        Ok(solved)
    }

    /// Filter arbitrary quotes belonging to one expiration.
    ///
    /// Order is preserved. Never fails; no survivors means an empty set.
    pub fn filter<'a>(
        &self,
        expiration: NaiveDate,
        dte: i32,
        quotes: impl IntoIterator<Item = &'a OptionQuote>,
    ) -> FilteredSet {
        let quotes = quotes
            .into_iter()
            .filter(|q| self.evaluate(q).is_ok())
            .cloned()
            .collect();

        FilteredSet {
            expiration,
            dte,
            quotes,
        }
    }

    /// Filter a whole expiration chain, calls then puts.
    pub fn filter_chain(&self, chain: &OptionsChain) -> FilteredSet {
        self.filter(chain.expiration, chain.dte, chain.quotes())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::data::OptionType;
    use crate::testutil::{priced_chain, priced_quote};

    fn filter() -> LiquidityFilter {
        LiquidityFilter::from_config(&ScanConfig::default())
    }

    #[test]
    fn test_near_the_money_calls_and_puts_pass() {
        let f = filter();
        // S=100, 30 DTE, 60% vol: 105 call ~0.43 delta, 100 put ~-0.46 delta
        let call = priced_quote(100.0, 105.0, 30, 0.60, OptionType::Call);
        let put = priced_quote(100.0, 100.0, 30, 0.60, OptionType::Put);

        let call_iv = f.evaluate(&call).unwrap();
        let put_iv = f.evaluate(&put).unwrap();
        assert!((call_iv.iv - 0.60).abs() < 1e-3);
        assert!(put_iv.delta < 0.0);
    }

    #[test]
    fn test_far_from_money_rejected_by_delta() {
        let f = filter();
        let deep_itm = priced_quote(100.0, 80.0, 30, 0.60, OptionType::Call);
        let far_otm = priced_quote(100.0, 130.0, 30, 0.60, OptionType::Call);

        assert!(matches!(
            f.evaluate(&deep_itm),
            Err(Rejection::OutsideDeltaBand(_))
        ));
        assert!(matches!(
            f.evaluate(&far_otm),
            Err(Rejection::OutsideDeltaBand(_))
        ));
    }

    #[test]
    fn test_degenerate_markets_excluded_not_raised() {
        let f = filter();
        let mut zero = priced_quote(100.0, 105.0, 30, 0.60, OptionType::Call);
        zero.bid = Decimal::ZERO;
        zero.ask = Decimal::ZERO;

        let mut crossed = priced_quote(100.0, 105.0, 30, 0.60, OptionType::Call);
        std::mem::swap(&mut crossed.bid, &mut crossed.ask);
        crossed.bid += Decimal::ONE;

        assert_eq!(f.evaluate(&zero), Err(Rejection::DegenerateMarket));
        assert_eq!(f.evaluate(&crossed), Err(Rejection::DegenerateMarket));

        let exp = zero.expiration;
        assert!(f.filter(exp, 30, [&zero, &crossed]).is_empty());
    }

    #[test]
    fn test_volume_and_open_interest_minima() {
        let config = ScanConfig {
            min_volume: 50,
            min_open_interest: 500,
            ..ScanConfig::default()
        };
        let f = LiquidityFilter::from_config(&config);

        let mut q = priced_quote(100.0, 105.0, 30, 0.60, OptionType::Call);
        q.volume = 10;
        assert_eq!(f.evaluate(&q), Err(Rejection::LowVolume(10)));

        q.volume = 60;
        q.open_interest = 100;
        assert_eq!(f.evaluate(&q), Err(Rejection::LowOpenInterest(100)));

        q.open_interest = 600;
        assert!(f.evaluate(&q).is_ok());
    }

    #[test]
    fn test_zero_minima_disable_volume_checks() {
        let f = filter();
        let mut q = priced_quote(100.0, 105.0, 30, 0.60, OptionType::Call);
        q.volume = 0;
        q.open_interest = 0;
        assert!(f.evaluate(&q).is_ok());
    }

    #[test]
    fn test_wide_spread_rejected() {
        let f = filter();
        let mut q = priced_quote(100.0, 105.0, 30, 0.60, OptionType::Call);
        q.bid = Decimal::new(100, 2);
        q.ask = Decimal::new(900, 2);
        assert!(matches!(f.evaluate(&q), Err(Rejection::WideSpread(_))));
    }

    #[test]
    fn test_wide_absolute_spread_rejected() {
        let config = ScanConfig {
            max_spread_abs: Some(0.05),
            ..ScanConfig::default()
        };
        let f = LiquidityFilter::from_config(&config);

        // priced quotes carry a 0.10 spread, well under 50% of mid
        let q = priced_quote(100.0, 105.0, 30, 0.60, OptionType::Call);
        assert!(filter().evaluate(&q).is_ok());
        match f.evaluate(&q) {
            Err(Rejection::WideAbsoluteSpread(spread)) => assert!((spread - 0.10).abs() < 1e-3),
            other => panic!("expected absolute spread rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_low_mid_price_rejected() {
        let config = ScanConfig {
            min_mid_price: 10.0,
            ..ScanConfig::default()
        };
        let f = LiquidityFilter::from_config(&config);

        let mut q = priced_quote(100.0, 105.0, 30, 0.60, OptionType::Call);
        q.bid = Decimal::new(495, 2);
        q.ask = Decimal::new(505, 2);
        assert_eq!(f.evaluate(&q), Err(Rejection::LowMidPrice(5.0)));
    }

    #[test]
    fn test_filter_is_subset_and_idempotent() {
        let f = filter();
        let chain = priced_chain(100.0, 30, 0.60);
        let filtered = f.filter_chain(&chain);

        assert!(!filtered.is_empty());
        assert!(filtered.len() < chain.len());
        for q in &filtered.quotes {
            assert!(chain.quotes().any(|orig| orig == q));
        }

        let again = f.filter(filtered.expiration, filtered.dte, filtered.quotes.iter());
        assert_eq!(again, filtered);
    }
}

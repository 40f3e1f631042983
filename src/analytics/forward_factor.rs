//! Forward Factor analysis.
//!
//! With front leg (σ1, T1) and back leg (σ2, T2), T in years:
//!
//! ```text
//! Vf = (σ2²·T2 − σ1²·T1) / (T2 − T1)
//! σf = √Vf
//! FF = (σ1 − σf) / σf
//! ```
//!
//! FF > 0 means the front month is rich against the forward curve
//! (bearish skew), FF < 0 means it is cheap (bullish skew). A pair with
//! T2 <= T1 or Vf <= 0 has no forward volatility and is reported invalid.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::liquidity::LiquidityFilter;
use super::timeframe::ResolvedPair;
use super::volatility::{aggregate, ExpirationVolatility, VolatilityOutcome};
use crate::config::ScanConfig;
use crate::data::OptionsSnapshot;
use crate::pricing::BlackScholes;

const DAYS_PER_YEAR: f64 = 365.0;

/// Forward volatility between two expirations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardVolatility {
    pub forward_variance: f64,
    pub forward_volatility: f64,
    /// Forward Factor as a ratio (0.25 = 25%).
    pub forward_factor: f64,
}

impl ForwardVolatility {
    pub fn forward_factor_pct(&self) -> f64 {
        self.forward_factor * 100.0
    }
}

/// Why a forward volatility could not be computed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForwardError {
    #[error("back expiry ({back_dte} DTE) is not after front expiry ({front_dte} DTE)")]
    NonIncreasingExpiry { front_dte: i32, back_dte: i32 },

    #[error("forward variance {variance:.6} is not positive")]
    DegenerateForwardVariance { variance: f64 },

    #[error("leg volatility must be positive and finite")]
    InvalidVolatility,
}

/// Variance-weighted forward volatility and Forward Factor.
pub fn forward_volatility(
    front_iv: f64,
    front_dte: i32,
    back_iv: f64,
    back_dte: i32,
) -> Result<ForwardVolatility, ForwardError> {
    if back_dte <= front_dte {
        return Err(ForwardError::NonIncreasingExpiry { front_dte, back_dte });
    }
    if !(front_iv.is_finite() && front_iv > 0.0 && back_iv.is_finite() && back_iv > 0.0) {
        return Err(ForwardError::InvalidVolatility);
    }

    let t1 = front_dte as f64 / DAYS_PER_YEAR;
    let t2 = back_dte as f64 / DAYS_PER_YEAR;
    let v1 = front_iv * front_iv;
    let v2 = back_iv * back_iv;

    let variance = (v2 * t2 - v1 * t1) / (t2 - t1);
    if !(variance.is_finite() && variance > 0.0) {
        return Err(ForwardError::DegenerateForwardVariance { variance });
    }

    let sigma_f = variance.sqrt();
    Ok(ForwardVolatility {
        forward_variance: variance,
        forward_volatility: sigma_f,
        forward_factor: (front_iv - sigma_f) / sigma_f,
    })
}

/// Which side of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    Front,
    Back,
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Front => write!(f, "front"),
            Self::Back => write!(f, "back"),
        }
    }
}

/// Why an opportunity is invalid.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum InvalidReason {
    #[error("insufficient liquidity on {leg} leg ({options} usable options)")]
    InsufficientLiquidity { leg: Leg, options: usize },

    #[error("{0}")]
    Forward(ForwardError),
}

/// Direction suggested by the sign of the Forward Factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalBias {
    /// Front month elevated against the forward curve.
    Bearish,
    /// Front month depressed against the forward curve.
    Bullish,
    Neutral,
}

impl SignalBias {
    pub fn from_forward_factor(ff: f64) -> Self {
        if ff > 0.0 {
            Self::Bearish
        } else if ff < 0.0 {
            Self::Bullish
        } else {
            Self::Neutral
        }
    }
}

/// Analysis of one ticker over one expiration pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub ticker: String,
    pub pair: ResolvedPair,
    pub front: Option<ExpirationVolatility>,
    pub back: Option<ExpirationVolatility>,
    pub forward: Option<ForwardVolatility>,
    /// Threshold the signal flag was judged against, percent.
    pub threshold_pct: f64,
    pub is_valid: bool,
    pub is_signal: bool,
    pub invalid_reason: Option<InvalidReason>,
}

impl Opportunity {
    /// Forward Factor in percent, present only for valid opportunities.
    pub fn forward_factor_pct(&self) -> Option<f64> {
        self.forward.map(|f| f.forward_factor_pct())
    }

    pub fn forward_volatility(&self) -> Option<f64> {
        self.forward.map(|f| f.forward_volatility)
    }

    pub fn bias(&self) -> Option<SignalBias> {
        self.forward
            .map(|f| SignalBias::from_forward_factor(f.forward_factor))
    }

    /// Summed volume of the options behind both legs.
    pub fn option_volume(&self) -> i64 {
        self.front.as_ref().map_or(0, |v| v.total_volume)
            + self.back.as_ref().map_or(0, |v| v.total_volume)
    }
}

/// Runs filtering and aggregation on both legs of a pair and scores it.
#[derive(Debug, Clone)]
pub struct ForwardFactorAnalyzer {
    filter: LiquidityFilter,
    model: BlackScholes,
    threshold_pct: f64,
    min_options_per_leg: usize,
}

impl ForwardFactorAnalyzer {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            filter: LiquidityFilter::from_config(config),
            model: BlackScholes::new(config.risk_free_rate, config.dividend_yield),
            threshold_pct: config.signal_threshold,
            min_options_per_leg: config.min_options_per_leg,
        }
    }

    /// Representative volatility for one leg of `snapshot`.
    pub fn leg_volatility(
        &self,
        snapshot: &OptionsSnapshot,
        leg: Leg,
        pair: &ResolvedPair,
    ) -> Result<ExpirationVolatility, InvalidReason> {
        let expiry = match leg {
            Leg::Front => pair.front,
            Leg::Back => pair.back,
        };
        let insufficient = |options| InvalidReason::InsufficientLiquidity { leg, options };

        let chain = snapshot
            .chain_at_expiration(expiry.expiration)
            .ok_or_else(|| insufficient(0))?;
        let filtered = self.filter.filter_chain(chain);

        match aggregate(&filtered, &self.model) {
            VolatilityOutcome::Available(vol) if vol.option_count >= self.min_options_per_leg => {
                Ok(vol)
            }
            VolatilityOutcome::Available(vol) => Err(insufficient(vol.option_count)),
            VolatilityOutcome::NoVolatility { .. } => Err(insufficient(0)),
        }
    }

    /// Score `pair` for `snapshot`. Never fails: problems come back as an
    /// invalid opportunity carrying the reason.
    pub fn analyze(&self, snapshot: &OptionsSnapshot, pair: &ResolvedPair) -> Opportunity {
        let mut opp = Opportunity {
            ticker: snapshot.ticker.clone(),
            pair: *pair,
            front: None,
            back: None,
            forward: None,
            threshold_pct: self.threshold_pct,
            is_valid: false,
            is_signal: false,
            invalid_reason: None,
        };

        let front = self.leg_volatility(snapshot, Leg::Front, pair);
        let back = self.leg_volatility(snapshot, Leg::Back, pair);

        let (front, back) = match (front, back) {
            (Ok(f), Ok(b)) => (f, b),
            (f, b) => {
                opp.invalid_reason = f.as_ref().err().or(b.as_ref().err()).cloned();
                opp.front = f.ok();
                opp.back = b.ok();
                debug!(
                    ticker = %opp.ticker,
                    timeframe = %pair.label(),
                    reason = ?opp.invalid_reason,
                    "pair has insufficient liquidity"
                );
                return opp;
            }
        };

        let forward = forward_volatility(front.volatility, front.dte, back.volatility, back.dte);
        opp.front = Some(front);
        opp.back = Some(back);

        match forward {
            Ok(fwd) => {
                opp.is_valid = true;
                opp.is_signal = fwd.forward_factor_pct().abs() > self.threshold_pct;
                opp.forward = Some(fwd);
            }
            Err(e) => {
                debug!(ticker = %opp.ticker, timeframe = %pair.label(), error = %e, "no forward volatility");
                opp.invalid_reason = Some(InvalidReason::Forward(e));
            }
        }

        opp
    }
}

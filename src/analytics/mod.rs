//! Forward Factor analytics.
//!
//! Provides:
//! - Liquidity and delta filtering per expiration
//! - Per-expiration volatility aggregation
//! - Timeframe (expiration pair) selection with tier fallback
//! - Forward volatility and Forward Factor scoring

pub mod forward_factor;
pub mod liquidity;
pub mod timeframe;
pub mod volatility;

pub use forward_factor::{
    forward_volatility, ForwardError, ForwardFactorAnalyzer, ForwardVolatility, InvalidReason, Leg,
    Opportunity, SignalBias,
};
pub use liquidity::{FilteredSet, LiquidityCriteria, LiquidityFilter, Rejection};
pub use timeframe::{
    ExpiryRef, ResolvedPair, SelectorState, Timeframe, TimeframeAttempt, TimeframeSelector,
};
pub use volatility::{aggregate, ExpirationVolatility, VolatilityOutcome};

//! Scanner configuration.
//!
//! One validated value carries every tunable the engine reads. Files are
//! TOML; unknown keys are rejected so a typo never silently falls back to
//! a default.
//!
//! ```toml
//! signal_threshold = 20.0
//! min_volume = 5
//! delta_band = { low = 35.0, high = 50.0 }
//!
//! [[tiers]]
//! front_dte = 30
//! back_dte = 60
//! front_buffer = 15
//! back_buffer = 20
//!
//! [fetch]
//! timeout_secs = 5.0
//!
//! [universe]
//! blacklist = ["GME"]
//! max_tickers = 50
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Absolute delta band, in whole-number delta x100 (35 = 0.35 delta).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeltaBand {
    pub low: f64,
    pub high: f64,
}

impl Default for DeltaBand {
    fn default() -> Self {
        Self {
            low: 35.0,
            high: 50.0,
        }
    }
}

impl DeltaBand {
    /// Inclusive on both ends. `delta` is a raw Black-Scholes delta.
    pub fn contains(&self, delta: f64) -> bool {
        let d = delta.abs() * 100.0;
        d >= self.low && d <= self.high
    }
}

/// One timeframe tier: target DTE per leg plus the +/- buffer around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    pub front_dte: i32,
    pub back_dte: i32,
    pub front_buffer: i32,
    pub back_buffer: i32,
}

impl TierConfig {
    pub const fn new(front_dte: i32, back_dte: i32, front_buffer: i32, back_buffer: i32) -> Self {
        Self {
            front_dte,
            back_dte,
            front_buffer,
            back_buffer,
        }
    }

    /// Display label, e.g. "30/60".
    pub fn label(&self) -> String {
        format!("{}/{}", self.front_dte, self.back_dte)
    }

    pub fn front_range(&self) -> (i32, i32) {
        (
            self.front_dte - self.front_buffer,
            self.front_dte + self.front_buffer,
        )
    }

    pub fn back_range(&self) -> (i32, i32) {
        (
            self.back_dte - self.back_buffer,
            self.back_dte + self.back_buffer,
        )
    }
}

/// Default tiers: 15-45 vs 40-80, 15-45 vs 65-115, 40-80 vs 65-115.
pub fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig::new(30, 60, 15, 20),
        TierConfig::new(30, 90, 15, 25),
        TierConfig::new(60, 90, 20, 25),
    ]
}

/// Longest accepted per-attempt fetch timeout.
pub const MAX_TIMEOUT_SECS: f64 = 300.0;

/// Longest accepted scan time budget.
pub const MAX_TIME_BUDGET_SECS: f64 = 86_400.0;

/// Most retries accepted per ticker.
pub const MAX_RETRIES: u32 = 10;

/// Ceiling on a single backoff sleep.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Chain retrieval limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Per-attempt timeout.
    pub timeout_secs: f64,
    /// Extra attempts after a retryable failure.
    pub retries: u32,
    /// Base backoff, doubled per attempt.
    pub backoff_ms: u64,
    /// Tickers fetched concurrently.
    pub concurrency: usize,
    /// No new fetches are issued once this much time has passed.
    pub time_budget_secs: Option<f64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5.0,
            retries: 2,
            backoff_ms: 250,
            concurrency: 8,
            time_budget_secs: None,
        }
    }
}

impl FetchConfig {
    /// Per-attempt timeout. Out-of-range values clamp to [`MAX_TIMEOUT_SECS`].
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs.min(MAX_TIMEOUT_SECS))
            .unwrap_or(Duration::from_secs_f64(MAX_TIMEOUT_SECS))
    }

    /// Scan time budget, if one is set and representable.
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Sleep before retry `attempt` (0-based): `backoff_ms * 2^attempt`,
    /// saturating at [`MAX_BACKOFF_MS`].
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ms = self
            .backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(MAX_BACKOFF_MS);
        Duration::from_millis(ms)
    }
}

/// Large caps skipped when `exclude_large_caps` is set: Dow 30, the
/// largest S&P 100 names, and a few foreign mega caps.
pub const LARGE_CAPS: &[&str] = &[
    "AAPL", "ABBV", "ABT", "ACN", "ADBE", "AMGN", "AMZN", "ASML", "AVGO", "AXP", "BA", "BAC",
    "BRK.B", "CAT", "CMCSA", "COP", "COST", "CRM", "CSCO", "CVX", "DHR", "DIS", "DOW", "GOOG",
    "GOOGL", "GS", "HD", "HON", "IBM", "INTC", "JNJ", "JPM", "KO", "LIN", "LLY", "MA", "MCD",
    "META", "MMM", "MRK", "MSFT", "NEE", "NFLX", "NKE", "NVDA", "NVO", "ORCL", "PEP", "PFE",
    "PG", "QCOM", "RTX", "SPGI", "TM", "TMO", "TRV", "TSLA", "TSM", "TXN", "UNH", "UPS", "V",
    "VZ", "WBA", "WFC", "WMT", "XOM",
];

/// Which tickers a scan may include.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UniverseConfig {
    /// Never scanned.
    pub blacklist: Vec<String>,
    /// When non-empty, only these are scanned.
    pub whitelist: Vec<String>,
    /// Skip [`LARGE_CAPS`].
    pub exclude_large_caps: bool,
    /// Skip index and fund symbols (SPY, QQQ, IWM, SPXW, *ETF*, *FUND*).
    pub exclude_funds: bool,
    /// Reject malformed symbols: 1-5 characters, alphanumeric plus `.` and `-`.
    pub validate_symbols: bool,
    /// Keep at most this many tickers, in input order.
    pub max_tickers: Option<usize>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            blacklist: Vec::new(),
            whitelist: Vec::new(),
            exclude_large_caps: false,
            exclude_funds: false,
            validate_symbols: true,
            max_tickers: None,
        }
    }
}

/// Full scanner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// |FF| above this percentage flags a signal.
    pub signal_threshold: f64,
    /// Minimum volume per option (0 disables).
    pub min_volume: i64,
    /// Minimum open interest per option (0 disables).
    pub min_open_interest: i64,
    /// Absolute delta band, x100.
    pub delta_band: DeltaBand,
    /// Maximum bid-ask spread as percentage of mid.
    pub max_spread_pct: f64,
    /// Optional cap on the absolute bid-ask spread, in dollars.
    pub max_spread_abs: Option<f64>,
    /// Minimum mid price.
    pub min_mid_price: f64,
    /// Fewer aggregated options than this on either leg is insufficient liquidity.
    pub min_options_per_leg: usize,
    /// Risk-free rate used for IV and delta.
    pub risk_free_rate: f64,
    /// Continuous dividend yield.
    pub dividend_yield: f64,
    /// Expirations closer than this are never selected.
    pub min_dte: i32,
    /// Minimum DTE gap for the fallback pair.
    pub fallback_min_separation: i32,
    /// Timeframe tiers, in priority order.
    pub tiers: Vec<TierConfig>,
    /// Chain retrieval limits.
    pub fetch: FetchConfig,
    /// Ticker universe selection.
    pub universe: UniverseConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            signal_threshold: 20.0,
            min_volume: 0,
            min_open_interest: 0,
            delta_band: DeltaBand::default(),
            max_spread_pct: 50.0,
            max_spread_abs: None,
            min_mid_price: 0.01,
            min_options_per_leg: 1,
            risk_free_rate: 0.05,
            dividend_yield: 0.0,
            min_dte: 7,
            fallback_min_separation: 10,
            tiers: default_tiers(),
            fetch: FetchConfig::default(),
            universe: UniverseConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.signal_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(self.signal_threshold.is_finite() && self.signal_threshold >= 0.0) {
            return invalid(format!("signal_threshold must be >= 0, got {}", self.signal_threshold));
        }
        if self.min_volume < 0 || self.min_open_interest < 0 {
            return invalid("min_volume and min_open_interest must be >= 0".into());
        }

        let band = self.delta_band;
        if !(0.0..=100.0).contains(&band.low) || !(0.0..=100.0).contains(&band.high) || band.low > band.high {
            return invalid(format!(
                "delta_band must satisfy 0 <= low <= high <= 100, got {}..{}",
                band.low, band.high
            ));
        }

        if !(self.max_spread_pct > 0.0) {
            return invalid("max_spread_pct must be positive".into());
        }
        if matches!(self.max_spread_abs, Some(v) if !(v > 0.0)) {
            return invalid("max_spread_abs must be positive when set".into());
        }
        if self.min_mid_price < 0.0 {
            return invalid("min_mid_price must be >= 0".into());
        }
        if self.min_options_per_leg == 0 {
            return invalid("min_options_per_leg must be at least 1".into());
        }
        if !self.risk_free_rate.is_finite() || !self.dividend_yield.is_finite() {
            return invalid("risk_free_rate and dividend_yield must be finite".into());
        }
        if self.min_dte < 1 {
            return invalid("min_dte must be at least 1".into());
        }
        if self.fallback_min_separation < 1 {
            return invalid("fallback_min_separation must be at least 1".into());
        }

        if self.tiers.is_empty() {
            return invalid("at least one tier is required".into());
        }
        for tier in &self.tiers {
            if tier.front_dte <= 0 || tier.front_dte >= tier.back_dte {
                return invalid(format!(
                    "tier {}: front target must be positive and below back target",
                    tier.label()
                ));
            }
            if tier.front_buffer < 0
                || tier.back_buffer < 0
                || tier.front_buffer >= tier.front_dte
                || tier.back_buffer >= tier.back_dte
            {
                return invalid(format!(
                    "tier {}: buffers must be >= 0 and smaller than their target",
                    tier.label()
                ));
            }
        }

        let fetch = &self.fetch;
        if !(fetch.timeout_secs > 0.0 && fetch.timeout_secs <= MAX_TIMEOUT_SECS) {
            return invalid(format!(
                "fetch.timeout_secs must be in (0, {MAX_TIMEOUT_SECS}], got {}",
                fetch.timeout_secs
            ));
        }
        if fetch.retries > MAX_RETRIES {
            return invalid(format!("fetch.retries must be at most {MAX_RETRIES}"));
        }
        if fetch.backoff_ms > MAX_BACKOFF_MS {
            return invalid(format!("fetch.backoff_ms must be at most {MAX_BACKOFF_MS}"));
        }
        if fetch.concurrency == 0 {
            return invalid("fetch.concurrency must be at least 1".into());
        }
        if matches!(fetch.time_budget_secs, Some(v) if !(v > 0.0 && v <= MAX_TIME_BUDGET_SECS)) {
            return invalid(format!(
                "fetch.time_budget_secs must be in (0, {MAX_TIME_BUDGET_SECS}] when set"
            ));
        }

        if self.universe.max_tickers == Some(0) {
            return invalid("universe.max_tickers must be at least 1 when set".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.signal_threshold, 20.0);
        assert_eq!(config.tiers.len(), 3);
        assert_eq!(config.tiers[0].label(), "30/60");
        assert_eq!(config.tiers[1].back_range(), (65, 115));
    }

    #[test]
    fn test_delta_band_inclusive() {
        let band = DeltaBand::default();
        assert!(band.contains(0.35));
        assert!(band.contains(-0.50));
        assert!(band.contains(-0.42));
        assert!(!band.contains(0.3499));
        assert!(!band.contains(-0.51));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = ScanConfig::from_toml_str(
            r#"
            signal_threshold = 15.0
            min_volume = 10
            delta_band = { low = 30.0, high = 55.0 }

            [[tiers]]
            front_dte = 45
            back_dte = 90
            front_buffer = 10
            back_buffer = 20

            [fetch]
            timeout_secs = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(config.signal_threshold, 15.0);
        assert_eq!(config.min_volume, 10);
        assert_eq!(config.min_open_interest, 0);
        assert_eq!(config.delta_band.high, 55.0);
        assert_eq!(config.tiers, vec![TierConfig::new(45, 90, 10, 20)]);
        assert_eq!(config.fetch.timeout_secs, 2.5);
        assert_eq!(config.fetch.retries, 2);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = ScanConfig::from_toml_str(include_str!("../config/scan.toml")).unwrap();
        assert_eq!(config, ScanConfig::default());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = ScanConfig::from_toml_str("signal_treshold = 10.0").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_malformed_tier_rejected() {
        let err = ScanConfig::from_toml_str(
            r#"
            [[tiers]]
            front_dte = 90
            back_dte = 60
            front_buffer = 10
            back_buffer = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut config = ScanConfig::default();
        config.tiers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_durations_rejected() {
        let mut config = ScanConfig::default();
        config.fetch.time_budget_secs = Some(1e20);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ScanConfig::default();
        config.fetch.timeout_secs = 1e20;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ScanConfig::default();
        config.fetch.timeout_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_accessors_never_panic() {
        let fetch = FetchConfig {
            timeout_secs: 1e20,
            time_budget_secs: Some(1e20),
            ..FetchConfig::default()
        };
        assert_eq!(fetch.timeout(), Duration::from_secs(300));
        assert_eq!(fetch.time_budget(), None);
    }

    #[test]
    fn test_backoff_doubles_then_saturates() {
        let fetch = FetchConfig {
            backoff_ms: 250,
            ..FetchConfig::default()
        };
        assert_eq!(fetch.backoff(0), Duration::from_millis(250));
        assert_eq!(fetch.backoff(2), Duration::from_millis(1000));
        assert_eq!(fetch.backoff(70), Duration::from_millis(MAX_BACKOFF_MS));

        let mut config = ScanConfig::default();
        config.fetch.retries = 70;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_universe_section() {
        let config = ScanConfig::from_toml_str(
            r#"
            [universe]
            blacklist = ["GME"]
            exclude_large_caps = true
            max_tickers = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.universe.blacklist, vec!["GME".to_string()]);
        assert!(config.universe.exclude_large_caps);
        assert!(config.universe.validate_symbols);
        assert_eq!(config.universe.max_tickers, Some(25));

        let err = ScanConfig::from_toml_str("[universe]\nmax_tickers = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_inverted_delta_band_rejected() {
        let mut config = ScanConfig::default();
        config.delta_band = DeltaBand {
            low: 60.0,
            high: 40.0,
        };
        assert!(config.validate().is_err());
    }
}

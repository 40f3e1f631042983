pub mod analytics;
pub mod config;
pub mod data;
pub mod pricing;
pub mod scan;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use analytics::{
    forward_volatility, ForwardFactorAnalyzer, LiquidityFilter, Opportunity, TimeframeSelector,
};
pub use config::{ConfigError, ScanConfig, TierConfig, UniverseConfig};
pub use data::{DirectorySnapshotProvider, OptionQuote, OptionType, OptionsChain, OptionsSnapshot, SnapshotProvider};
pub use pricing::{BlackScholes, ConvergenceError};
pub use scan::{ScanOrchestrator, ScanResult, SkipReason};

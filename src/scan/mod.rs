//! Ticker-universe scanning and reporting.

pub mod orchestrator;
pub mod report;
pub mod universe;

pub use orchestrator::{
    rank_signals, ScanOrchestrator, ScanResult, SkipReason, SkippedTicker, TickerEvaluation,
    TickerEvaluator, TickerTimeframes, TimeframeResult,
};
pub use report::{render_table, to_json, OpportunitySummary, ScanReport, TableReport};
pub use universe::{ExcludedTicker, Exclusion, Universe};

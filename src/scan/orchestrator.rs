//! Batch scan across a ticker universe.
//!
//! Three stages:
//! 1. Universe: the requested tickers are narrowed by the configured
//!    blacklist, whitelist, symbol checks and ticker cap.
//! 2. Fetch: one tokio task per ticker, bounded by a semaphore, each
//!    fetch under a per-attempt timeout with retries. Once the optional
//!    time budget is spent no further fetches start.
//! 3. Compute: fetched snapshots are scored on the rayon pool from a
//!    blocking task, so the async runtime keeps serving while it runs.
//!    Every configured tier is scored independently for each ticker.
//!
//! Results come back in input ticker order.

use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::universe::{self, ExcludedTicker};
use crate::analytics::{ForwardFactorAnalyzer, Opportunity, Timeframe, TimeframeSelector};
use crate::config::ScanConfig;
use crate::data::{fetch_with_retry, FetchError, OptionsSnapshot, SnapshotProvider};

/// Why a ticker produced no opportunity.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("fetch timed out")]
    Timeout,

    #[error("no timeframe resolved (usable DTEs: {available_dtes:?})")]
    TimeframeUnresolved { available_dtes: Vec<i32> },

    #[error("scan time budget exceeded before fetch")]
    BudgetExceeded,

    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),
}

impl From<FetchError> for SkipReason {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Timeout(_) => Self::Timeout,
            other => Self::FetchFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: SkipReason,
}

/// One timeframe scored for one ticker. `opportunity` is `None` when no
/// expirations matched the timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeResult {
    pub timeframe: Timeframe,
    pub opportunity: Option<Opportunity>,
}

/// Every timeframe tried for one ticker, in priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerTimeframes {
    pub ticker: String,
    pub timeframes: Vec<TimeframeResult>,
}

/// Scoring of one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerEvaluation {
    /// Chosen opportunity: the first valid timeframe in priority order,
    /// else the first one that resolved.
    pub outcome: Result<Opportunity, SkipReason>,
    pub timeframes: Vec<TimeframeResult>,
}

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_date: NaiveDate,
    /// One per analyzed ticker, valid or not, in ticker order.
    pub opportunities: Vec<Opportunity>,
    /// Signal opportunities ranked by |FF| descending.
    pub signals: Vec<Opportunity>,
    /// Per-timeframe view of every analyzed ticker.
    pub by_timeframe: Vec<TickerTimeframes>,
    pub skipped: Vec<SkippedTicker>,
    /// Requested tickers left out before fetching.
    pub excluded: Vec<ExcludedTicker>,
}

impl ScanResult {
    pub fn valid(&self) -> impl Iterator<Item = &Opportunity> {
        self.opportunities.iter().filter(|o| o.is_valid)
    }

    pub fn invalid(&self) -> impl Iterator<Item = &Opportunity> {
        self.opportunities.iter().filter(|o| !o.is_valid)
    }
}

/// Signals ranked by |FF| descending. The sort is stable, so equal
/// magnitudes keep their input order.
pub fn rank_signals(opportunities: &[Opportunity]) -> Vec<Opportunity> {
    let mut signals: Vec<Opportunity> = opportunities
        .iter()
        .filter(|o| o.is_signal)
        .cloned()
        .collect();

    let magnitude = |o: &Opportunity| o.forward_factor_pct().map_or(0.0, f64::abs);
    signals.sort_by(|a, b| magnitude(b).total_cmp(&magnitude(a)));
    signals
}

/// Pure per-snapshot scoring, shared with the compute pool.
#[derive(Debug, Clone)]
pub struct TickerEvaluator {
    selector: TimeframeSelector,
    analyzer: ForwardFactorAnalyzer,
}

impl TickerEvaluator {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            selector: TimeframeSelector::from_config(config),
            analyzer: ForwardFactorAnalyzer::new(config),
        }
    }

    /// Score every timeframe of one snapshot and pick the reported one.
    ///
    /// If no timeframe resolves the ticker is skipped with the usable DTEs
    /// it did have.
    pub fn evaluate(&self, snapshot: &OptionsSnapshot) -> TickerEvaluation {
        let timeframes: Vec<TimeframeResult> = self
            .selector
            .attempts(snapshot)
            .into_iter()
            .map(|attempt| TimeframeResult {
                timeframe: attempt.timeframe,
                opportunity: attempt.pair.map(|pair| self.analyzer.analyze(snapshot, &pair)),
            })
            .collect();

        let mut analyzed = timeframes.iter().filter_map(|t| t.opportunity.as_ref());
        let first = analyzed.next();
        let chosen = match first {
            Some(opp) if !opp.is_valid => analyzed.find(|o| o.is_valid).or(first),
            other => other,
        };

        let outcome = match chosen {
            Some(opp) => {
                if let Some(first) = first.filter(|f| f.pair != opp.pair) {
                    debug!(
                        ticker = %snapshot.ticker,
                        from = %first.pair.label(),
                        to = %opp.pair.label(),
                        "fell back to later timeframe"
                    );
                }
                Ok(opp.clone())
            }
            None => {
                let available_dtes = self
                    .selector
                    .usable_expiries(snapshot)
                    .iter()
                    .map(|e| e.dte)
                    .collect();
                Err(SkipReason::TimeframeUnresolved { available_dtes })
            }
        };

        TickerEvaluation { outcome, timeframes }
    }

    /// Score many snapshots in parallel, preserving order.
    pub fn evaluate_all(&self, snapshots: &[OptionsSnapshot]) -> Vec<TickerEvaluation> {
        snapshots.par_iter().map(|s| self.evaluate(s)).collect()
    }
}

/// Scans a ticker universe against one configuration.
pub struct ScanOrchestrator {
    config: ScanConfig,
    provider: Arc<dyn SnapshotProvider>,
    evaluator: Arc<TickerEvaluator>,
}

impl ScanOrchestrator {
    pub fn new(config: ScanConfig, provider: Arc<dyn SnapshotProvider>) -> Self {
        let evaluator = Arc::new(TickerEvaluator::new(&config));
        Self {
            config,
            provider,
            evaluator,
        }
    }

    /// Fetch every ticker, keeping input order.
    async fn fetch_all(
        &self,
        tickers: &[String],
        scan_date: NaiveDate,
    ) -> Vec<Result<OptionsSnapshot, SkipReason>> {
        let fetch = self.config.fetch.clone();
        let semaphore = Arc::new(Semaphore::new(fetch.concurrency.max(1)));
        let deadline = fetch
            .time_budget()
            .and_then(|budget| Instant::now().checked_add(budget));

        let mut tasks = JoinSet::new();
        for (idx, ticker) in tickers.iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let fetch = fetch.clone();
            let ticker = ticker.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, Err(SkipReason::FetchFailed("fetch pool closed".into())));
                };
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return (idx, Err(SkipReason::BudgetExceeded));
                }

                let result = fetch_with_retry(provider.as_ref(), &ticker, scan_date, &fetch)
                    .await
                    .map_err(SkipReason::from);
                (idx, result)
            });
        }

        let mut results: Vec<Option<Result<OptionsSnapshot, SkipReason>>> =
            (0..tickers.len()).map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => warn!(error = %e, "fetch task failed"),
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(SkipReason::FetchFailed("fetch task aborted".into()))))
            .collect()
    }

    /// Score fetched snapshots on the rayon pool without blocking the
    /// runtime. A failed compute task skips every snapshot it held.
    async fn compute(&self, snapshots: Vec<OptionsSnapshot>) -> Vec<TickerEvaluation> {
        let count = snapshots.len();
        let evaluator = Arc::clone(&self.evaluator);

        match tokio::task::spawn_blocking(move || evaluator.evaluate_all(&snapshots)).await {
            Ok(evaluations) => evaluations,
            Err(e) => {
                warn!(error = %e, snapshots = count, "compute stage failed");
                (0..count)
                    .map(|_| TickerEvaluation {
                        outcome: Err(SkipReason::EvaluationFailed(e.to_string())),
                        timeframes: Vec::new(),
                    })
                    .collect()
            }
        }
    }

    /// Scan `tickers` as of `scan_date`.
    pub async fn scan(&self, tickers: &[String], scan_date: NaiveDate) -> ScanResult {
        let started = std::time::Instant::now();

        let universe = universe::select(tickers, &self.config.universe);
        for e in &universe.excluded {
            debug!(ticker = %e.ticker, reason = %e.reason, "ticker excluded");
        }
        info!(
            requested = tickers.len(),
            tickers = universe.tickers.len(),
            excluded = universe.excluded.len(),
            %scan_date,
            "starting scan"
        );
        let tickers = universe.tickers;

        let fetched = self.fetch_all(&tickers, scan_date).await;

        let mut snapshots = Vec::new();
        let mut outcomes: Vec<Option<TickerEvaluation>> = Vec::with_capacity(tickers.len());
        let mut slots = Vec::new();
        for (idx, result) in fetched.into_iter().enumerate() {
            match result {
                Ok(snapshot) => {
                    slots.push(idx);
                    snapshots.push(snapshot);
                    outcomes.push(None);
                }
                Err(reason) => outcomes.push(Some(TickerEvaluation {
                    outcome: Err(reason),
                    timeframes: Vec::new(),
                })),
            }
        }

        for (idx, evaluation) in slots.into_iter().zip(self.compute(snapshots).await) {
            outcomes[idx] = Some(evaluation);
        }

        let mut opportunities = Vec::new();
        let mut by_timeframe = Vec::new();
        let mut skipped = Vec::new();
        for (ticker, evaluation) in tickers.iter().zip(outcomes) {
            let Some(evaluation) = evaluation else {
                continue;
            };
            if !evaluation.timeframes.is_empty() {
                by_timeframe.push(TickerTimeframes {
                    ticker: ticker.clone(),
                    timeframes: evaluation.timeframes,
                });
            }
            match evaluation.outcome {
                Ok(opp) => opportunities.push(opp),
                Err(reason) => {
                    warn!(%ticker, %reason, "ticker skipped");
                    skipped.push(SkippedTicker {
                        ticker: ticker.clone(),
                        reason,
                    });
                }
            }
        }

        let signals = rank_signals(&opportunities);
        for s in &signals {
            info!(
                ticker = %s.ticker,
                timeframe = %s.pair.label(),
                ff_pct = s.forward_factor_pct().unwrap_or_default(),
                "forward factor signal"
            );
        }

        let result = ScanResult {
            scan_date,
            opportunities,
            signals,
            by_timeframe,
            skipped,
            excluded: universe.excluded,
        };

        info!(
            valid = result.valid().count(),
            invalid = result.invalid().count(),
            signals = result.signals.len(),
            skipped = result.skipped.len(),
            excluded = result.excluded.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan complete"
        );

        result
    }
}

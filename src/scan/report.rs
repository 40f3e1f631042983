//! Human-readable scan output.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use super::orchestrator::{ScanResult, SkippedTicker};
use super::universe::ExcludedTicker;
use crate::analytics::{Opportunity, SignalBias, Timeframe};

const SEPARATOR: &str = "============================================================";

/// Flat per-ticker view of an opportunity. Volatilities are in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunitySummary {
    pub ticker: String,
    pub timeframe: String,
    pub underlying_price: Option<f64>,
    pub front_dte: i32,
    pub back_dte: i32,
    pub front_iv_pct: Option<f64>,
    pub back_iv_pct: Option<f64>,
    pub forward_vol_pct: Option<f64>,
    pub forward_factor_pct: Option<f64>,
    pub threshold_pct: f64,
    pub passes: bool,
    pub is_valid: bool,
    pub bias: Option<SignalBias>,
    pub option_volume: i64,
    /// Invalid reason, when there is one.
    pub note: Option<String>,
}

impl From<&Opportunity> for OpportunitySummary {
    fn from(opp: &Opportunity) -> Self {
        let pct = |v: f64| v * 100.0;
        Self {
            ticker: opp.ticker.clone(),
            timeframe: opp.pair.label(),
            underlying_price: opp
                .front
                .as_ref()
                .or(opp.back.as_ref())
                .map(|v| v.underlying_price),
            front_dte: opp.pair.front.dte,
            back_dte: opp.pair.back.dte,
            front_iv_pct: opp.front.as_ref().map(|v| pct(v.volatility)),
            back_iv_pct: opp.back.as_ref().map(|v| pct(v.volatility)),
            forward_vol_pct: opp.forward_volatility().map(pct),
            forward_factor_pct: opp.forward_factor_pct(),
            threshold_pct: opp.threshold_pct,
            passes: opp.is_signal,
            is_valid: opp.is_valid,
            bias: opp.bias(),
            option_volume: opp.option_volume(),
            note: opp.invalid_reason.as_ref().map(|r| r.to_string()),
        }
    }
}

/// One ticker under one timeframe. `summary` is `None` when no
/// expirations matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeframeRow {
    pub ticker: String,
    pub timeframe: String,
    pub summary: Option<OpportunitySummary>,
}

/// JSON document for a whole scan.
#[derive(Debug, Serialize)]
pub struct ScanReport<'a> {
    pub scan_date: NaiveDate,
    pub signals: Vec<OpportunitySummary>,
    pub opportunities: Vec<OpportunitySummary>,
    pub timeframes: Vec<TimeframeRow>,
    pub skipped: &'a [SkippedTicker],
    pub excluded: &'a [ExcludedTicker],
}

impl<'a> From<&'a ScanResult> for ScanReport<'a> {
    fn from(result: &'a ScanResult) -> Self {
        let timeframes = result
            .by_timeframe
            .iter()
            .flat_map(|t| {
                t.timeframes.iter().map(|r| TimeframeRow {
                    ticker: t.ticker.clone(),
                    timeframe: r.timeframe.label(),
                    summary: r.opportunity.as_ref().map(OpportunitySummary::from),
                })
            })
            .collect();

        Self {
            scan_date: result.scan_date,
            signals: result.signals.iter().map(OpportunitySummary::from).collect(),
            opportunities: result.opportunities.iter().map(OpportunitySummary::from).collect(),
            timeframes,
            skipped: &result.skipped,
            excluded: &result.excluded,
        }
    }
}

pub fn to_json(result: &ScanResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&ScanReport::from(result))
}

fn opt(v: Option<f64>, precision: usize) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{:.*}", precision, x))
}

fn header(f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
        f,
        "{:<8} {:<9} {:>9} {:>5} {:>5} {:>7} {:>7} {:>7} {:>8} {:>8} {:>8}",
        "TICKER", "TF", "PRICE", "FDTE", "BDTE", "F_IV%", "B_IV%", "FWD%", "FF%", "BIAS", "VOLUME"
    )
}

fn row(f: &mut fmt::Formatter<'_>, s: &OpportunitySummary) -> fmt::Result {
    let bias = match s.bias {
        Some(SignalBias::Bearish) => "bearish",
        Some(SignalBias::Bullish) => "bullish",
        Some(SignalBias::Neutral) => "neutral",
        None => "-",
    };
    write!(
        f,
        "{:<8} {:<9} {:>9} {:>5} {:>5} {:>7} {:>7} {:>7} {:>8} {:>8} {:>8}",
        s.ticker,
        s.timeframe,
        opt(s.underlying_price, 2),
        s.front_dte,
        s.back_dte,
        opt(s.front_iv_pct, 1),
        opt(s.back_iv_pct, 1),
        opt(s.forward_vol_pct, 1),
        opt(s.forward_factor_pct, 1),
        bias,
        s.option_volume,
    )?;
    if let Some(note) = &s.note {
        write!(f, "  ({note})")?;
    }
    writeln!(f)
}

/// Fixed-width text report: ranked signals, one table per timeframe
/// listing every analyzed ticker, then skipped and excluded tickers.
pub struct TableReport<'a> {
    pub result: &'a ScanResult,
    pub threshold_pct: f64,
}

impl TableReport<'_> {
    fn timeframe_table(&self, f: &mut fmt::Formatter<'_>, timeframe: &Timeframe) -> fmt::Result {
        let label = timeframe.label();
        let mut analyzed: Vec<&Opportunity> = Vec::new();
        let mut unmatched: Vec<&str> = Vec::new();

        for ticker in &self.result.by_timeframe {
            let Some(entry) = ticker.timeframes.iter().find(|t| &t.timeframe == timeframe) else {
                continue;
            };
            match &entry.opportunity {
                Some(opp) => analyzed.push(opp),
                None => unmatched.push(&ticker.ticker),
            }
        }

        let magnitude = |o: &Opportunity| o.forward_factor_pct().map_or(-1.0, f64::abs);
        analyzed.sort_by(|a, b| magnitude(b).total_cmp(&magnitude(a)));

        writeln!(f, "\nTimeframe {label}")?;
        header(f)?;
        for opp in analyzed {
            row(f, &OpportunitySummary::from(opp))?;
        }
        for ticker in unmatched {
            writeln!(f, "{:<8} {:<9} no matching chains", ticker, label)?;
        }
        Ok(())
    }
}

impl fmt::Display for TableReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.result;

        writeln!(f, "{SEPARATOR}")?;
        writeln!(
            f,
            "Forward Factor scan {}  (threshold {:.1}%)",
            result.scan_date, self.threshold_pct
        )?;
        writeln!(
            f,
            "Analyzed {}: {} valid, {} invalid",
            result.opportunities.len(),
            result.valid().count(),
            result.invalid().count()
        )?;
        writeln!(f, "{SEPARATOR}")?;

        writeln!(f, "\nSignals ({})", result.signals.len())?;
        if result.signals.is_empty() {
            writeln!(f, "  none above threshold")?;
        } else {
            header(f)?;
            for opp in &result.signals {
                row(f, &OpportunitySummary::from(opp))?;
            }
        }

        let mut timeframes: Vec<Timeframe> = Vec::new();
        for t in result.by_timeframe.iter().flat_map(|t| &t.timeframes) {
            if !timeframes.contains(&t.timeframe) {
                timeframes.push(t.timeframe);
            }
        }
        timeframes.sort_by_key(Timeframe::priority);
        for timeframe in &timeframes {
            self.timeframe_table(f, timeframe)?;
        }

        if !result.skipped.is_empty() {
            writeln!(f, "\nSkipped ({})", result.skipped.len())?;
            for s in &result.skipped {
                writeln!(f, "  {:<8} {}", s.ticker, s.reason)?;
            }
        }

        if !result.excluded.is_empty() {
            writeln!(f, "\nExcluded ({})", result.excluded.len())?;
            for e in &result.excluded {
                writeln!(f, "  {:<8} {}", e.ticker, e.reason)?;
            }
        }

        writeln!(f, "\n{SEPARATOR}")
    }
}

pub fn render_table(result: &ScanResult, threshold_pct: f64) -> String {
    TableReport {
        result,
        threshold_pct,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::scan::orchestrator::{rank_signals, SkipReason, TickerEvaluator, TickerTimeframes};
    use crate::scan::universe::Exclusion;
    use crate::testutil::{priced_snapshot, scan_date};

    fn sample_result() -> ScanResult {
        let evaluator = TickerEvaluator::new(&ScanConfig::default());

        let mut opportunities = Vec::new();
        let mut by_timeframe = Vec::new();
        for snapshot in [
            priced_snapshot("AAA", 100.0, &[(30, 0.60), (90, 0.50)]),
            priced_snapshot("BBB", 100.0, &[(30, 0.40), (60, 0.40)]),
        ] {
            let evaluation = evaluator.evaluate(&snapshot);
            opportunities.push(evaluation.outcome.unwrap());
            by_timeframe.push(TickerTimeframes {
                ticker: snapshot.ticker.clone(),
                timeframes: evaluation.timeframes,
            });
        }

        ScanResult {
            scan_date: scan_date(),
            signals: rank_signals(&opportunities),
            opportunities,
            by_timeframe,
            skipped: vec![SkippedTicker {
                ticker: "ZZZ".into(),
                reason: SkipReason::Timeout,
            }],
            excluded: vec![ExcludedTicker {
                ticker: "GME".into(),
                reason: Exclusion::Blacklisted,
            }],
        }
    }

    #[test]
    fn test_summary_fields() {
        let result = sample_result();
        let s = OpportunitySummary::from(&result.opportunities[0]);

        assert_eq!(s.ticker, "AAA");
        assert_eq!(s.timeframe, "30/90");
        assert_eq!((s.front_dte, s.back_dte), (30, 90));
        assert!((s.front_iv_pct.unwrap() - 60.0).abs() < 0.1);
        assert!(s.passes);
        assert_eq!(s.threshold_pct, 20.0);
        assert_eq!(s.bias, Some(SignalBias::Bearish));
        assert!(s.option_volume > 0);
        assert!(s.note.is_none());
    }

    #[test]
    fn test_table_lists_every_ticker_per_timeframe() {
        let text = render_table(&sample_result(), 20.0);

        assert!(text.contains("Signals (1)"));
        assert!(text.contains("Analyzed 2: 2 valid, 0 invalid"));

        let tf_60 = text.find("Timeframe 30/60").unwrap();
        let tf_90 = text.find("Timeframe 30/90").unwrap();
        let tf_6090 = text.find("Timeframe 60/90").unwrap();
        assert!(tf_60 < tf_90 && tf_90 < tf_6090);

        // AAA has no 60 DTE leg, BBB no 90 DTE leg
        let section_60 = &text[tf_60..tf_90];
        assert!(section_60.contains("AAA      30/60     no matching chains"));
        assert!(section_60.contains("BBB      30/60"));
        let section_90 = &text[tf_90..tf_6090];
        assert!(section_90.contains("BBB      30/90     no matching chains"));
        assert_eq!(text[tf_6090..].matches("no matching chains").count(), 2);

        assert!(text.contains("ZZZ"));
        assert!(text.contains("fetch timed out"));
        assert!(text.contains("Excluded (1)"));
        assert!(text.contains("GME      blacklisted"));
    }

    #[test]
    fn test_json_report() {
        let json = to_json(&sample_result()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["signals"].as_array().unwrap().len(), 1);
        assert_eq!(value["signals"][0]["ticker"], "AAA");
        assert_eq!(value["opportunities"].as_array().unwrap().len(), 2);
        assert_eq!(value["skipped"][0]["reason"]["kind"], "timeout");
        assert_eq!(value["excluded"][0]["reason"], "blacklisted");

        let rows = value["timeframes"].as_array().unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0]["ticker"], "AAA");
        assert_eq!(rows[0]["timeframe"], "30/60");
        assert!(rows[0]["summary"].is_null());
        assert_eq!(rows[1]["summary"]["timeframe"], "30/90");
    }
}

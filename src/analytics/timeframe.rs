//! Expiration pair selection.
//!
//! Tiers are tried in priority order. Each leg picks the expiration
//! closest to its tier target inside the buffer range, ties going to the
//! earlier date. When every tier fails the selector falls back to the
//! shortest and longest usable expirations, provided they are far enough
//! apart.
//!
//! ```text
//! TryTier(0) -> Resolved | TryTier(1) -> ... -> Fallback -> Resolved | Unresolved
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{ScanConfig, TierConfig};
use crate::data::OptionsSnapshot;

/// One usable expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpiryRef {
    pub dte: i32,
    pub expiration: NaiveDate,
}

/// Where a resolved pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timeframe {
    Tier { index: usize, tier: TierConfig },
    Fallback,
}

impl Timeframe {
    pub fn label(&self) -> String {
        match self {
            Self::Tier { tier, .. } => tier.label(),
            Self::Fallback => "fallback".to_string(),
        }
    }

    /// Sort key for reports: tiers in priority order, fallback last.
    pub fn priority(&self) -> usize {
        match self {
            Self::Tier { index, .. } => *index,
            Self::Fallback => usize::MAX,
        }
    }
}

/// A front/back expiration pair ready for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPair {
    pub timeframe: Timeframe,
    pub front: ExpiryRef,
    pub back: ExpiryRef,
}

impl ResolvedPair {
    pub fn label(&self) -> String {
        self.timeframe.label()
    }
}

/// One timeframe tried for a ticker. `pair` is `None` when no
/// expirations matched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeAttempt {
    pub timeframe: Timeframe,
    pub pair: Option<ResolvedPair>,
}

/// Selector states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorState {
    TryTier(usize),
    Fallback,
    Resolved(ResolvedPair),
    Unresolved,
}

impl SelectorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved(_) | Self::Unresolved)
    }
}

/// Timeframe selector over an ordered tier list.
#[derive(Debug, Clone)]
pub struct TimeframeSelector {
    tiers: Vec<TierConfig>,
    min_dte: i32,
    min_separation: i32,
}

impl TimeframeSelector {
    pub fn new(tiers: Vec<TierConfig>, min_dte: i32, min_separation: i32) -> Self {
        Self {
            tiers,
            min_dte,
            min_separation,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.tiers.clone(),
            config.min_dte,
            config.fallback_min_separation,
        )
    }

    /// Non-empty expirations at or beyond the minimum DTE, ascending.
    pub fn usable_expiries(&self, snapshot: &OptionsSnapshot) -> Vec<ExpiryRef> {
        let mut expiries: Vec<ExpiryRef> = snapshot
            .chains
            .iter()
            .filter(|c| c.dte >= self.min_dte && !c.is_empty())
            .map(|c| ExpiryRef {
                dte: c.dte,
                expiration: c.expiration,
            })
            .collect();
        expiries.sort();
        expiries
    }

    /// Advance one state. Terminal states map to themselves.
    pub fn step(&self, state: SelectorState, expiries: &[ExpiryRef]) -> SelectorState {
        match state {
            SelectorState::TryTier(i) if i >= self.tiers.len() => SelectorState::Fallback,
            SelectorState::TryTier(i) => match self.resolve_tier(i, expiries) {
                Some(pair) => SelectorState::Resolved(pair),
                None => SelectorState::TryTier(i + 1),
            },
            SelectorState::Fallback => match self.fallback_pair(expiries) {
                Some(pair) => SelectorState::Resolved(pair),
                None => SelectorState::Unresolved,
            },
            terminal => terminal,
        }
    }

    /// Run the state machine to completion.
    pub fn resolve(&self, snapshot: &OptionsSnapshot) -> Option<ResolvedPair> {
        let expiries = self.usable_expiries(snapshot);
        let mut state = SelectorState::TryTier(0);
        while !state.is_terminal() {
            state = self.step(state, &expiries);
        }
        match state {
            SelectorState::Resolved(pair) => Some(pair),
            _ => None,
        }
    }

    /// Every tier resolved on its own, in priority order. When no tier
    /// resolves a fallback attempt is appended. The first resolved pair
    /// equals [`resolve`].
    ///
    /// [`resolve`]: Self::resolve
    pub fn attempts(&self, snapshot: &OptionsSnapshot) -> Vec<TimeframeAttempt> {
        let expiries = self.usable_expiries(snapshot);
        let mut attempts: Vec<TimeframeAttempt> = self
            .tiers
            .iter()
            .enumerate()
            .map(|(index, &tier)| TimeframeAttempt {
                timeframe: Timeframe::Tier { index, tier },
                pair: self.resolve_tier(index, &expiries),
            })
            .collect();

        if attempts.iter().all(|a| a.pair.is_none()) {
            attempts.push(TimeframeAttempt {
                timeframe: Timeframe::Fallback,
                pair: self.fallback_pair(&expiries),
            });
        }
        attempts
    }

    fn resolve_tier(&self, index: usize, expiries: &[ExpiryRef]) -> Option<ResolvedPair> {
        let tier = *self.tiers.get(index)?;

        let front = closest(expiries, tier.front_range(), tier.front_dte, i32::MIN)?;
        let back = closest(expiries, tier.back_range(), tier.back_dte, front.dte)?;

        Some(ResolvedPair {
            timeframe: Timeframe::Tier { index, tier },
            front,
            back,
        })
    }

    fn fallback_pair(&self, expiries: &[ExpiryRef]) -> Option<ResolvedPair> {
        let front = *expiries.first()?;
        let back = *expiries.last()?;

        if back.dte - front.dte < self.min_separation {
            return None;
        }

        Some(ResolvedPair {
            timeframe: Timeframe::Fallback,
            front,
            back,
        })
    }
}

/// Expiration in `[lo, hi]` and strictly beyond `after` closest to `target`.
/// Ties go to the earlier expiration.
fn closest(expiries: &[ExpiryRef], (lo, hi): (i32, i32), target: i32, after: i32) -> Option<ExpiryRef> {
    expiries
        .iter()
        .filter(|e| e.dte >= lo && e.dte <= hi && e.dte > after)
        .min_by_key(|e| ((e.dte - target).abs(), e.expiration))
        .copied()
}

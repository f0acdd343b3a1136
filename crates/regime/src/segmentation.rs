use core_types::{Kline, Regime};
use std::collections::BTreeMap;

/// Per-bar regime labels for a history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegimeSegmentation {
    /// One entry per input bar; `None` while the classifier is warming up.
    pub labels: Vec<Option<Regime>>,
    /// Number of labeled bars per regime.
    pub frequencies: BTreeMap<Regime, usize>,
}

/// A maximal run of consecutive bars sharing one regime. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeRun {
    pub regime: Regime,
    pub start: usize,
    pub end: usize,
}

impl RegimeRun {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl RegimeSegmentation {
    pub fn labeled_bars(&self) -> usize {
        self.frequencies.values().sum()
    }

    pub fn count(&self, regime: Regime) -> usize {
        self.frequencies.get(&regime).copied().unwrap_or(0)
    }

    /// Share of the labeled bars in `regime`, in `[0, 1]`.
    pub fn share(&self, regime: Regime) -> f64 {
        match self.labeled_bars() {
            0 => 0.0,
            total => self.count(regime) as f64 / total as f64,
        }
    }

    /// The most frequent regime. Ties go to the higher-priority regime.
    pub fn dominant(&self) -> Option<Regime> {
        Regime::PRIORITY
            .iter()
            .copied()
            .filter(|r| self.count(*r) > 0)
            .fold(None, |best: Option<Regime>, r| match best {
                Some(b) if self.count(b) >= self.count(r) => Some(b),
                _ => Some(r),
            })
    }

    pub fn runs(&self) -> Vec<RegimeRun> {
        let mut runs: Vec<RegimeRun> = Vec::new();
        for (i, label) in self.labels.iter().enumerate() {
            let Some(regime) = *label else { continue };
            match runs.last_mut() {
                Some(run) if run.regime == regime && run.end == i => run.end = i + 1,
                _ => runs.push(RegimeRun { regime, start: i, end: i + 1 }),
            }
        }
        runs
    }

    /// The bars labeled `regime`, in their original order.
    pub fn bars_for(&self, regime: Regime, klines: &[Kline]) -> Vec<Kline> {
        self.runs()
            .into_iter()
            .filter(|run| run.regime == regime)
            .flat_map(|run| klines.get(run.start..run.end).unwrap_or(&[]).iter().cloned())
            .collect()
    }
}

use crate::blend::ParameterChange;
use analytics::PerformanceReport;
use configuration::ParameterSet;
use core_types::{Regime, StrategyId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A candidate that passed the filters, with its score and full report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTrial {
    pub parameters: ParameterSet,
    pub score: Decimal,
    pub report: PerformanceReport,
}

/// The search over one regime's bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeOptimum {
    pub regime: Regime,
    pub bars: usize,
    pub share: f64,
    pub trials_run: usize,
    /// Trials that failed to build or replay.
    pub trials_failed: usize,
    /// Trials discarded by the hard filters.
    pub trials_filtered: usize,
    /// `None` when no trial passed the filters.
    pub best: Option<ScoredTrial>,
}

/// The result of one optimization job. Written to disk as JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub strategy: StrategyId,
    pub symbol: String,
    pub interval: String,
    pub bars: usize,
    pub labeled_bars: usize,
    pub regime_distribution: BTreeMap<Regime, f64>,
    /// Regimes below `min_regime_bars` are listed here and not searched.
    pub skipped_regimes: Vec<Regime>,
    pub regimes: Vec<RegimeOptimum>,
    pub recommended: ParameterSet,
    pub rationale: String,
    pub changes: Vec<ParameterChange>,
}

impl OptimizationOutcome {
    pub fn best_for(&self, regime: Regime) -> Option<&ScoredTrial> {
        self.regimes
            .iter()
            .find(|r| r.regime == regime)
            .and_then(|r| r.best.as_ref())
    }

    /// The best parameters of every regime that has them, ready for regime adaptation.
    pub fn regime_parameters(&self) -> BTreeMap<Regime, ParameterSet> {
        self.regimes
            .iter()
            .filter_map(|r| r.best.as_ref().map(|best| (r.regime, best.parameters.clone())))
            .collect()
    }

    pub fn trials_run(&self) -> usize {
        self.regimes.iter().map(|r| r.trials_run).sum()
    }
}

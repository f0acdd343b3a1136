//! # Perpetua Adaptive Optimizer
//!
//! Searches strategy and risk parameters separately for each market regime and
//! blends the winners into one recommendation.
//!
//! ## Architectural Principles
//!
//! - **Regime First:** history is segmented by the classifier and every regime is
//!   searched on its own bars only.
//! - **Bounded:** `max_iterations` caps the trials across all regimes. Oversized
//!   grids are subsampled deterministically, never run in full.
//! - **Late Binding:** candidates are applied to a clone of the base `Config`
//!   through `Config::with_overrides`; nothing global is mutated.
//!
//! ## Public API
//!
//! - `AdaptiveOptimizer`: runs a job described by an `OptimizerConfig`.
//! - `OptimizationOutcome`: the serializable result with per-regime optima, the
//!   blended recommendation, its rationale and the parameter diff.

pub mod blend;
pub mod error;
pub mod generator;
pub mod outcome;
pub mod scoring;

pub use blend::ParameterChange;
pub use error::OptimizerError;
pub use generator::ParameterGrid;
pub use outcome::{OptimizationOutcome, RegimeOptimum, ScoredTrial};
pub use scoring::Scorer;

use backtester::Backtester;
use configuration::{Config, OptimizerConfig, ParameterSet};
use core_types::{Kline, Regime};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use regime::{MarketStateClassifier, RegimeSegmentation};
use std::collections::BTreeMap;

const RISK_PREFIX: &str = "risk.";
const BRACKET_PREFIX: &str = "bracket.";

enum TrialResult {
    Scored(ScoredTrial),
    Filtered,
    Failed,
}

pub struct AdaptiveOptimizer {
    job: OptimizerConfig,
    base_config: Config,
    scorer: Scorer,
    show_progress: bool,
}

impl AdaptiveOptimizer {
    pub fn new(job: OptimizerConfig, base_config: Config) -> Self {
        let scorer = Scorer::new(job.analysis.clone());
        Self { job, base_config, scorer, show_progress: false }
    }

    /// Draws a progress bar on stderr while trials run.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn run(&self, klines: &[Kline]) -> Result<OptimizationOutcome, OptimizerError> {
        // --- 1. Search space ---
        if self.job.max_iterations == 0 {
            return Err(OptimizerError::ParameterGeneration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        let grid = ParameterGrid::new(&self.job.parameter_space)?;
        if grid.is_empty() && self.job.seeds.is_empty() {
            return Err(OptimizerError::EmptySearchSpace);
        }

        // --- 2. Regime segmentation ---
        let classifier = MarketStateClassifier::new(self.base_config.classifier.clone());
        let segmentation = classifier.segment(klines);
        let distribution: BTreeMap<Regime, f64> = segmentation
            .frequencies
            .keys()
            .map(|regime| (*regime, segmentation.share(*regime)))
            .collect();

        let (mut eligible, mut skipped): (Vec<Regime>, Vec<Regime>) = segmentation
            .frequencies
            .keys()
            .copied()
            .partition(|regime| segmentation.count(*regime) >= self.job.min_regime_bars);
        if eligible.is_empty() {
            return Err(OptimizerError::NoEligibleRegime {
                min_regime_bars: self.job.min_regime_bars,
                labeled_bars: segmentation.labeled_bars(),
            });
        }
        for regime in &skipped {
            tracing::info!(
                regime = %regime,
                bars = segmentation.count(*regime),
                min_regime_bars = self.job.min_regime_bars,
                "Regime has too few bars; not optimizing it"
            );
        }

        // Every searched regime gets at least one trial, so a budget smaller than
        // the regime count drops the least frequent regimes.
        if eligible.len() > self.job.max_iterations {
            eligible.sort_by_key(|regime| std::cmp::Reverse(segmentation.count(*regime)));
            for regime in eligible.split_off(self.job.max_iterations) {
                tracing::warn!(regime = %regime, "Iteration budget too small; not optimizing this regime");
                skipped.push(regime);
            }
            eligible.sort();
            skipped.sort();
        }

        // --- 3. Candidates ---
        let budget = self.job.max_iterations / eligible.len();
        let candidates = generator::candidates(&grid, &self.job.seeds, budget);
        let total_trials = candidates.len() * eligible.len();
        tracing::info!(
            strategy = %self.job.strategy_id,
            symbol = %self.job.symbol,
            regimes = eligible.len(),
            candidates = candidates.len(),
            grid = grid.len(),
            threads = rayon::current_num_threads(),
            "Starting adaptive optimization"
        );

        let progress_bar = if self.show_progress {
            let bar = ProgressBar::new(total_trials as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                    .progress_chars("=>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        // --- 4. Per-regime search ---
        let regimes: Vec<RegimeOptimum> = eligible
            .iter()
            .map(|regime| self.search_regime(*regime, &segmentation, klines, &candidates, &progress_bar))
            .collect();
        progress_bar.finish_with_message("Optimization runs complete.");

        // --- 5. Blend ---
        let optima: Vec<(Regime, f64, &ParameterSet)> = regimes
            .iter()
            .filter_map(|r| r.best.as_ref().map(|best| (r.regime, r.share, &best.parameters)))
            .collect();
        let optimized: Vec<Regime> = optima.iter().map(|(regime, _, _)| *regime).collect();
        let recommended = blend::blend(&optima);

        let base_parameters = self.current_parameters(&recommended)?;
        let changes = blend::diff(&base_parameters, &recommended);
        let rationale = blend::rationale(&distribution, &optimized);
        tracing::info!(changes = changes.len(), %rationale, "Adaptive optimization complete");

        Ok(OptimizationOutcome {
            strategy: self.job.strategy_id,
            symbol: self.job.symbol.clone(),
            interval: self.job.interval.clone(),
            bars: klines.len(),
            labeled_bars: segmentation.labeled_bars(),
            regime_distribution: distribution,
            skipped_regimes: skipped,
            regimes,
            recommended,
            rationale,
            changes,
        })
    }

    fn search_regime(
        &self,
        regime: Regime,
        segmentation: &RegimeSegmentation,
        klines: &[Kline],
        candidates: &[ParameterSet],
        progress_bar: &ProgressBar,
    ) -> RegimeOptimum {
        let bars = segmentation.bars_for(regime, klines);

        let results: Vec<TrialResult> = candidates
            .par_iter()
            .map(|parameters| {
                let result = self.run_trial(regime, parameters, &bars);
                progress_bar.inc(1);
                result
            })
            .collect();

        let mut optimum = RegimeOptimum {
            regime,
            bars: bars.len(),
            share: segmentation.share(regime),
            trials_run: results.len(),
            trials_failed: 0,
            trials_filtered: 0,
            best: None,
        };
        // Ties keep the earlier candidate, so seeds win over equal grid points.
        for result in results {
            match result {
                TrialResult::Failed => optimum.trials_failed += 1,
                TrialResult::Filtered => optimum.trials_filtered += 1,
                TrialResult::Scored(trial) => {
                    if optimum.best.as_ref().is_none_or(|best| trial.score > best.score) {
                        optimum.best = Some(trial);
                    }
                }
            }
        }

        match &optimum.best {
            Some(best) => tracing::info!(
                regime = %regime,
                score = %best.score.round_dp(4),
                trades = best.report.total_trades,
                "Regime optimum found"
            ),
            None => tracing::warn!(
                regime = %regime,
                trials = optimum.trials_run,
                failed = optimum.trials_failed,
                "No trial passed the filters for this regime"
            ),
        }
        optimum
    }

    fn run_trial(&self, regime: Regime, parameters: &ParameterSet, bars: &[Kline]) -> TrialResult {
        let outcome = self
            .base_config
            .with_overrides(self.job.strategy_id, parameters)
            .map_err(OptimizerError::from)
            .and_then(|config| {
                let backtester = Backtester::for_strategy(
                    &config,
                    self.job.symbol.clone(),
                    self.job.interval.clone(),
                    self.job.strategy_id,
                )?;
                Ok(backtester.run(bars)?)
            });

        match outcome {
            Ok(result) => match self.scorer.score(&result.report) {
                Some(score) => TrialResult::Scored(ScoredTrial {
                    parameters: parameters.clone(),
                    score,
                    report: result.report,
                }),
                None => TrialResult::Filtered,
            },
            Err(e) => {
                tracing::warn!(regime = %regime, ?parameters, error = %e, "Trial failed");
                TrialResult::Failed
            }
        }
    }

    /// The base configuration's value of every recommended parameter.
    fn current_parameters(&self, recommended: &ParameterSet) -> Result<ParameterSet, OptimizerError> {
        let own = self.base_config.strategy_parameters(self.job.strategy_id)?;
        let risk = serde_json::to_value(&self.base_config.risk_management)?;
        let bracket = serde_json::to_value(&self.base_config.strategies.bracket)?;

        Ok(recommended
            .keys()
            .filter_map(|name| {
                let current = if let Some(field) = name.strip_prefix(RISK_PREFIX) {
                    risk.get(field).cloned()
                } else if let Some(field) = name.strip_prefix(BRACKET_PREFIX) {
                    bracket.get(field).cloned()
                } else {
                    own.get(name).cloned()
                };
                current.map(|value| (name.clone(), value))
            })
            .collect())
    }
}

use core_types::StrategyId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One candidate parameter assignment, keyed by parameter name.
pub type ParameterSet = BTreeMap<String, serde_json::Value>;

/// Defines an optimization job. This is deserialized from the `optimizer.toml` file.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    pub strategy_id: StrategyId,
    pub symbol: String,
    pub interval: String,
    /// Ordered by name, which fixes the grid enumeration order.
    pub parameter_space: BTreeMap<String, ParameterRange>,
    /// Upper bound on the number of trials across all regimes.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Regimes with fewer bars than this are not optimized.
    #[serde(default = "default_min_regime_bars")]
    pub min_regime_bars: usize,
    /// Externally suggested candidates. They are tried first and never replace the grid.
    #[serde(default)]
    pub seeds: Vec<ParameterSet>,
    #[serde(default)] // Use default values if the [analysis] section is missing
    pub analysis: AnalysisConfig,
}

fn default_max_iterations() -> usize {
    100
}

fn default_min_regime_bars() -> usize {
    50
}

/// Configuration for the analysis and ranking of optimization results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Hard filters to discard unacceptable runs before scoring.
    pub filters: Filters,
    pub objective: Objective,
}

/// Hard filters to apply to the set of performance reports.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub min_total_trades: usize,
    pub max_drawdown_pct: Decimal,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            min_total_trades: 1,
            max_drawdown_pct: Decimal::from(50),
        }
    }
}

/// How a trial is scored. Higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Rank by a single report metric.
    Metric(ObjectiveMetric),
    /// Rank by a weighted combination of percentage metrics.
    Weighted(Weights),
}

impl Default for Objective {
    fn default() -> Self {
        Objective::Weighted(Weights::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ObjectiveMetric {
    TotalReturn,
    SharpeRatio,
    WinRate,
    ProfitFactor,
    CalmarRatio,
    Expectancy,
}

/// Weights for the scoring function. Drawdown is subtracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub weight_return: Decimal,
    pub weight_win_rate: Decimal,
    pub weight_max_drawdown: Decimal,
    pub weight_sharpe: Decimal,
    pub weight_profit_factor: Decimal,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            weight_return: dec!(0.4),
            weight_win_rate: dec!(0.3),
            weight_max_drawdown: dec!(0.3),
            weight_sharpe: Decimal::ZERO,
            weight_profit_factor: Decimal::ZERO,
        }
    }
}

/// Represents a range of values for a single parameter to be tested.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParameterRange {
    DiscreteInt(Vec<i64>),
    DiscreteDecimal(Vec<Decimal>),
    LinearInt { start: i64, end: i64, step: i64 },
    LinearDecimal { start: Decimal, end: Decimal, step: Decimal },
}

use analytics::PerformanceReport;
use configuration::{AnalysisConfig, Objective, ObjectiveMetric, Weights};
use rust_decimal::Decimal;

/// Stand-in for a ratio with no denominator (no losing trade, no drawdown) on a
/// run that made money.
const RATIO_CAP: Decimal = Decimal::TEN;

/// Applies the job's hard filters and objective to backtest reports.
#[derive(Debug, Clone)]
pub struct Scorer {
    config: AnalysisConfig,
}

impl Scorer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// The report's score, or `None` when a hard filter discards it. Higher is better.
    pub fn score(&self, report: &PerformanceReport) -> Option<Decimal> {
        if !self.passes_filters(report) {
            return None;
        }
        Some(match &self.config.objective {
            Objective::Metric(metric) => metric_value(*metric, report),
            Objective::Weighted(weights) => weighted(weights, report),
        })
    }

    fn passes_filters(&self, report: &PerformanceReport) -> bool {
        let filters = &self.config.filters;
        let passes_trades = report.total_trades >= filters.min_total_trades;
        let passes_drawdown = report.max_drawdown_pct < filters.max_drawdown_pct;
        passes_trades && passes_drawdown
    }
}

/// `return + win_rate - drawdown + sharpe + profit_factor`, each weighted.
/// Percentages enter as percent.
fn weighted(w: &Weights, r: &PerformanceReport) -> Decimal {
    (w.weight_return * r.total_return_pct)
        + (w.weight_win_rate * r.win_rate_pct.unwrap_or_default())
        - (w.weight_max_drawdown * r.max_drawdown_pct)
        + (w.weight_sharpe * r.sharpe_ratio.unwrap_or_default())
        + (w.weight_profit_factor * profit_factor(r))
}

fn metric_value(metric: ObjectiveMetric, r: &PerformanceReport) -> Decimal {
    match metric {
        ObjectiveMetric::TotalReturn => r.total_return_pct,
        ObjectiveMetric::SharpeRatio => r.sharpe_ratio.unwrap_or_default(),
        ObjectiveMetric::WinRate => r.win_rate_pct.unwrap_or_default(),
        ObjectiveMetric::ProfitFactor => profit_factor(r),
        ObjectiveMetric::CalmarRatio => match r.calmar_ratio {
            Some(calmar) => calmar,
            None if r.total_net_profit > Decimal::ZERO => RATIO_CAP,
            None => Decimal::ZERO,
        },
        ObjectiveMetric::Expectancy => r.expectancy_r.unwrap_or_default(),
    }
}

fn profit_factor(r: &PerformanceReport) -> Decimal {
    match r.profit_factor {
        Some(pf) => pf.min(RATIO_CAP),
        None if r.gross_profit > Decimal::ZERO => RATIO_CAP,
        None => Decimal::ZERO,
    }
}

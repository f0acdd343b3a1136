use analytics::{PerformanceReport, Rating};
use core_types::{EquityPoint, Regime, StrategyId, Trade};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The read-only outcome of one historical replay.
///
/// `equity_curve` starts with the initial balance stamped at the first processed
/// bar. A run that processes no bars has that single point, stamped at the first
/// input bar or at the Unix epoch when there was none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub interval: String,
    pub strategy: StrategyId,
    pub initial_capital: Decimal,
    pub bars_processed: usize,
    pub bars_skipped: usize,
    /// Share of decision bars spent in each regime.
    pub regime_share: BTreeMap<Regime, f64>,
    /// Parameter switches made by regime adaptation; zero for a plain replay.
    #[serde(default)]
    pub strategy_switches: usize,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub report: PerformanceReport,
}

impl BacktestResult {
    pub fn rating(&self) -> Rating {
        Rating::from_report(&self.report)
    }

    pub fn final_equity(&self) -> Decimal {
        self.equity_curve.last().map_or(self.initial_capital, |p| p.equity)
    }

    /// Serializes the result for the reporting layer. Never fails.
    ///
    /// Non-finite floats are written as `null`. If serialization fails anyway the
    /// error is logged and an `{"error": ...}` object is returned in its place; the
    /// in-memory result is untouched either way.
    pub fn to_json(&self) -> String {
        let document = serde_json::to_value(self).and_then(|mut value| {
            if let Some(object) = value.as_object_mut() {
                object.insert("rating".to_string(), serde_json::to_value(self.rating())?);
            }
            serde_json::to_string_pretty(&value)
        });
        match document {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(symbol = %self.symbol, error = %e, "Failed to serialize backtest result");
                serde_json::json!({ "error": format!("serialization failed: {e}") }).to_string()
            }
        }
    }
}

//! # Perpetua Strategy Library
//!
//! This crate contains the entry and exit logic of the system. It defines the
//! universal `Strategy` contract and a closed registry of concrete implementations.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of exchanges,
//!   files or execution. It depends only on `core-types`, `indicators` and `configuration`.
//! - **Stateless Evaluation:** A strategy derives everything from the `MarketContext`
//!   it is handed. The same context always yields the same signal, which is what makes
//!   a backtest reproducible.
//! - **Fail-Soft:** Indicator failures and malformed windows are caught by the provided
//!   `generate_signal` / `should_exit` methods, logged, and turned into "no action".
//!   They never reach the engine as errors.
//! - **Extensibility:** Adding a new strategy involves creating a new module, implementing
//!   the `Strategy` trait, and adding it to the `StrategyId` enum and `factory`.
//!
//! ## Public API
//!
//! - `Strategy`: The core trait all strategies implement.
//! - `StrategyId`: A simple enum to identify which strategy to create.
//! - `create_strategy` / `create_strategy_by_name`: The factory functions.
//! - The concrete strategy structs themselves (e.g., `MACrossover`).

pub mod breakout;
mod common;
pub mod error;
pub mod factory;
pub mod grid;
pub mod ma_crossover;
pub mod momentum;
pub mod prob_reversion;
pub mod super_trend;

#[cfg(test)]
pub(crate) mod test_support;

pub use breakout::Breakout;
pub use error::StrategyError;
pub use factory::{create_strategy, create_strategy_by_name};
pub use grid::Grid;
pub use ma_crossover::MACrossover;
pub use momentum::Momentum;
pub use prob_reversion::ProbReversion;
pub use super_trend::SuperTrend;

// Re-export StrategyId from core_types
pub use core_types::StrategyId;
pub use indicators::IndicatorSet;

use core_types::{Kline, MarketContext, Position, StrategySignal};

/// The contract every trading strategy satisfies.
///
/// Implementors provide the three fallible building blocks; the engine only ever
/// calls the provided `generate_signal` and `should_exit`, which never fail.
///
/// The `Send + Sync` bounds are required to allow strategies to be used across
/// multiple threads in the parallel optimizer.
pub trait Strategy: Send + Sync {
    fn id(&self) -> StrategyId;

    /// Bars required before the strategy can produce a reading.
    fn warmup_bars(&self) -> usize;

    /// Computes every series the strategy reads. Short windows yield `NaN`
    /// warm-up values rather than an error.
    fn calculate_indicators(&self, klines: &[Kline]) -> Result<IndicatorSet, StrategyError>;

    /// Entry logic over precomputed indicators.
    ///
    /// * `Ok(Some(signal))` - the strategy's entry conditions hold on the last bar.
    /// * `Ok(None)` - no action.
    fn evaluate(
        &self,
        context: &MarketContext<'_>,
        indicators: &IndicatorSet,
    ) -> Result<Option<StrategySignal>, StrategyError>;

    /// Exit logic for an open position over precomputed indicators.
    fn evaluate_exit(
        &self,
        context: &MarketContext<'_>,
        position: &Position,
        indicators: &IndicatorSet,
    ) -> Result<bool, StrategyError>;

    /// Returns an entry signal for the last bar of `context`, or `None`.
    ///
    /// Errors and signals with an inconsistent bracket are logged and
    /// downgraded to `None`.
    fn generate_signal(&self, context: &MarketContext<'_>) -> Option<StrategySignal> {
        let outcome = self
            .calculate_indicators(context.klines)
            .and_then(|indicators| self.evaluate(context, &indicators));

        match outcome {
            Ok(Some(signal)) if signal.is_flat() => None,
            Ok(Some(signal)) => match signal.validate() {
                Ok(()) => {
                    tracing::debug!(strategy = %self.id(), symbol = context.symbol, ?signal.direction, entry = %signal.entry_price, "Signal generated");
                    Some(signal)
                }
                Err(e) => {
                    tracing::warn!(strategy = %self.id(), symbol = context.symbol, error = %e, "Discarding signal with an invalid bracket");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(strategy = %self.id(), symbol = context.symbol, error = %e, "Strategy evaluation failed; treating the cycle as flat");
                None
            }
        }
    }

    /// Whether the strategy wants `position` closed on the last bar of `context`.
    /// Errors are logged and read as "hold".
    fn should_exit(&self, context: &MarketContext<'_>, position: &Position) -> bool {
        let outcome = self
            .calculate_indicators(context.klines)
            .and_then(|indicators| self.evaluate_exit(context, position, &indicators));

        outcome.unwrap_or_else(|e| {
            tracing::warn!(strategy = %self.id(), symbol = context.symbol, error = %e, "Exit evaluation failed; holding the position");
            false
        })
    }
}

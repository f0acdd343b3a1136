//! # Perpetua Backtester
//!
//! Replays historical klines through the `ExecutionEngine` and scores the run.
//!
//! ## Architectural Principles
//!
//! - **Same Engine as Live:** the replay feeds bars to the exact engine the live loop
//!   drives, one decision cycle per bar, with no suspension points.
//! - **Ends Flat:** any position still open after the last bar is force-closed at
//!   that bar's close so the ledger is complete.
//!
//! ## Public API
//!
//! - `Backtester`: one replay of one strategy over one symbol, optionally switching
//!   to per-regime parameters as the market changes.
//! - `BacktestResult`: trades, equity curve, performance report; `to_json` never fails.
//! - `KlineCache`: the file-backed historical kline cache.

pub mod data_cache;
pub mod error;
pub mod result;

pub use data_cache::{KlineCache, read_klines, write_klines};
pub use error::BacktestError;
pub use result::BacktestResult;

use analytics::AnalyticsEngine;
use configuration::{Config, ParameterSet};
use chrono::DateTime;
use core_types::{EquityPoint, Kline, Regime, StrategyId};
use engine::{CycleInputs, ExecutionEngine, RegimeAdaptation};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use strategies::Strategy;

/// The main backtesting engine.
pub struct Backtester {
    // --- Context ---
    symbol: String,
    interval: String,
    strategy_id: StrategyId,
    initial_capital: rust_decimal::Decimal,
    periods_per_year: u32,
    show_progress: bool,
    // --- Components ---
    engine: ExecutionEngine,
    analytics_engine: AnalyticsEngine,
}

impl Backtester {
    pub fn new(
        config: &Config,
        symbol: impl Into<String>,
        interval: impl Into<String>,
        strategy: Box<dyn Strategy>,
    ) -> Result<Self, BacktestError> {
        let symbol = symbol.into();
        let strategy_id = strategy.id();
        let engine = ExecutionEngine::new(config, symbol.clone(), strategy)?;
        Ok(Self {
            symbol,
            interval: interval.into(),
            strategy_id,
            initial_capital: config.simulation.initial_capital,
            periods_per_year: config.simulation.periods_per_year,
            show_progress: false,
            engine,
            analytics_engine: AnalyticsEngine::new(),
        })
    }

    /// Builds the strategy from the registry with the parameters in `config`.
    pub fn for_strategy(
        config: &Config,
        symbol: impl Into<String>,
        interval: impl Into<String>,
        strategy_id: StrategyId,
    ) -> Result<Self, BacktestError> {
        let strategy = strategies::create_strategy(strategy_id, config)?;
        Self::new(config, symbol, interval, strategy)
    }

    /// Replays `strategy_id` with its base parameters from `config`, switching to the
    /// set in `parameters` for a regime once that regime is confirmed.
    pub fn adaptive(
        config: &Config,
        symbol: impl Into<String>,
        interval: impl Into<String>,
        strategy_id: StrategyId,
        parameters: &BTreeMap<Regime, ParameterSet>,
    ) -> Result<Self, BacktestError> {
        let adaptation = RegimeAdaptation::from_parameters(config, strategy_id, parameters)?;
        Ok(Self::for_strategy(config, symbol, interval, strategy_id)?.with_adaptation(adaptation))
    }

    pub fn with_adaptation(mut self, adaptation: RegimeAdaptation) -> Self {
        self.engine = self.engine.with_adaptation(adaptation);
        self
    }

    /// Draws a progress bar on stderr while replaying.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Replays `klines` in order and returns the scored result.
    ///
    /// Malformed or out-of-order bars are skipped by the engine and counted.
    /// Fails only on an engine invariant violation or an analytics error.
    pub fn run(mut self, klines: &[Kline]) -> Result<BacktestResult, BacktestError> {
        let progress_bar = if self.show_progress {
            let bar = ProgressBar::new(klines.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                    .progress_chars("=>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let inputs = CycleInputs::default();
        let mut last_processed: Option<&Kline> = None;
        let mut bars_skipped = 0usize;
        let mut regime_counts: BTreeMap<Regime, usize> = BTreeMap::new();
        let mut strategy_switches = 0usize;

        for kline in klines {
            let active = self.engine.active_regime();
            match self.engine.on_kline(kline.clone(), &inputs)? {
                Some(outcome) => {
                    if self.engine.active_regime() != active {
                        strategy_switches += 1;
                    }
                    last_processed = Some(kline);
                    if let Some(state) = outcome.market_state {
                        *regime_counts.entry(state.regime).or_default() += 1;
                    }
                }
                None => bars_skipped += 1,
            }
            progress_bar.inc(1);
        }

        if let Some(last) = last_processed {
            if let Some(trade) = self.engine.force_close(last.close, last.timestamp)? {
                tracing::info!(
                    symbol = %self.symbol,
                    exit = %trade.exit_price,
                    realized_pnl = %trade.realized_pnl,
                    "Closed the open position at the end of the data"
                );
            }
        }
        progress_bar.finish_with_message("Simulation complete. Analyzing results...");

        let (trades, mut equity_curve) = self.engine.into_results();
        if equity_curve.is_empty() {
            // No bar was processed: the curve is the initial balance alone.
            equity_curve.push(EquityPoint {
                timestamp: klines.first().map_or(DateTime::UNIX_EPOCH, |k| k.timestamp),
                equity: self.initial_capital,
            });
        }
        let report = self.analytics_engine.calculate(
            &trades,
            &equity_curve,
            self.initial_capital,
            self.periods_per_year,
        )?;

        let decisions: usize = regime_counts.values().sum();
        let regime_share = regime_counts
            .into_iter()
            .map(|(regime, count)| (regime, count as f64 / decisions as f64))
            .collect();

        tracing::info!(
            symbol = %self.symbol,
            strategy = %self.strategy_id,
            bars = klines.len(),
            skipped = bars_skipped,
            trades = trades.len(),
            strategy_switches,
            total_return_pct = %report.total_return_pct.round_dp(2),
            "Backtest complete"
        );

        Ok(BacktestResult {
            symbol: self.symbol,
            interval: self.interval,
            strategy: self.strategy_id,
            initial_capital: self.initial_capital,
            bars_processed: klines.len() - bars_skipped,
            bars_skipped,
            regime_share,
            strategy_switches,
            trades,
            equity_curve,
            report,
        })
    }
}

use crate::Strategy;
use crate::breakout::Breakout;
use crate::error::StrategyError;
use crate::grid::Grid;
use crate::ma_crossover::MACrossover;
use crate::momentum::Momentum;
use crate::prob_reversion::ProbReversion;
use crate::super_trend::SuperTrend;
use configuration::Config;
use core_types::StrategyId;

/// Creates a new strategy instance based on the provided ID and configuration.
///
/// Every strategy also receives the shared signal-bracket parameters.
pub fn create_strategy(id: StrategyId, config: &Config) -> Result<Box<dyn Strategy>, StrategyError> {
    let strategies = &config.strategies;
    let bracket = strategies.bracket.clone();
    // The compiler will error if a new StrategyId is added but not handled here.
    let strategy: Box<dyn Strategy> = match id {
        StrategyId::MaCrossover => Box::new(MACrossover::new(strategies.ma_crossover.clone(), bracket)?),
        StrategyId::SuperTrend => Box::new(SuperTrend::new(strategies.super_trend.clone(), bracket)?),
        StrategyId::ProbReversion => {
            Box::new(ProbReversion::new(strategies.prob_reversion.clone(), bracket)?)
        }
        StrategyId::Momentum => Box::new(Momentum::new(strategies.momentum.clone(), bracket)?),
        StrategyId::Breakout => Box::new(Breakout::new(strategies.breakout.clone(), bracket)?),
        StrategyId::Grid => Box::new(Grid::new(strategies.grid.clone(), bracket)?),
    };
    tracing::debug!(strategy = %id, "Strategy created");
    Ok(strategy)
}

/// Looks a strategy up by its registry name (e.g. `"super_trend"`).
pub fn create_strategy_by_name(name: &str, config: &Config) -> Result<Box<dyn Strategy>, StrategyError> {
    let id = name
        .parse::<StrategyId>()
        .map_err(|_| StrategyError::StrategyNotFound(name.to_string()))?;
    create_strategy(id, config)
}

use crate::Strategy;
use crate::common::{BRACKET_ATR, CLOSE, bars_held, base_indicators, to_price, validate_bracket};
use crate::error::StrategyError;
use configuration::{BracketParams, GridParams};
use core_types::{
    Direction, Kline, MarketContext, Position, PositionSide, Regime, StrategyId, StrategySignal,
};
use indicators::{IndicatorSet, Ohlcv};

const GRID_UPPER: &str = "grid_upper";
const GRID_LOWER: &str = "grid_lower";

/// Take-profit distance used past the outermost level.
const EDGE_TARGET_PCT: f64 = 0.02;

/// Price levels spaced evenly around the midpoint of a buffered range.
#[derive(Debug, Clone, PartialEq)]
struct GridLevels {
    upper: f64,
    lower: f64,
    /// Ascending, all within `[lower, upper]`.
    levels: Vec<f64>,
}

impl GridLevels {
    fn build(upper: f64, lower: f64, spacing: f64, grid_count: usize) -> Option<Self> {
        if !(spacing.is_finite() && spacing > 0.0) {
            return None;
        }
        let mid = (upper + lower) / 2.0;
        let half = (grid_count / 2) as i64;
        let levels: Vec<f64> = (-half..=half)
            .map(|k| mid + k as f64 * spacing)
            .filter(|level| (lower..=upper).contains(level))
            .collect();
        (levels.len() >= 2).then_some(Self { upper, lower, levels })
    }
}

/// Buys a close that drops through a grid level and sells one that rises through
/// it. Each trade targets the neighbouring level and stops at the one beyond.
pub struct Grid {
    params: GridParams,
    bracket: BracketParams,
}

impl Grid {
    pub fn new(params: GridParams, bracket: BracketParams) -> Result<Self, StrategyError> {
        if params.range_period < 2 {
            return Err(StrategyError::InvalidParameters(format!(
                "Grid range must span at least two bars, got {}",
                params.range_period
            )));
        }
        if params.grid_count < 2 {
            return Err(StrategyError::InvalidParameters(format!(
                "A grid needs at least two levels, got {}",
                params.grid_count
            )));
        }
        if !(params.spacing_atr_multiple > 0.0 && params.range_buffer_pct >= 0.0) {
            return Err(StrategyError::InvalidParameters(format!(
                "Grid spacing must be positive and the buffer non-negative (spacing {}, buffer {})",
                params.spacing_atr_multiple, params.range_buffer_pct
            )));
        }
        if params.max_hold_bars == 0 {
            return Err(StrategyError::InvalidParameters(
                "max_hold_bars cannot be zero".to_string(),
            ));
        }
        validate_bracket(&bracket)?;
        Ok(Self { params, bracket })
    }

    /// Buffered high/low of the `range_period` bars before the last one.
    fn range(&self, series: &Ohlcv) -> Option<(f64, f64)> {
        let end = series.len().checked_sub(1)?;
        let start = end.checked_sub(self.params.range_period)?;
        let high = series.high[start..end].iter().copied().fold(f64::MIN, f64::max);
        let low = series.low[start..end].iter().copied().fold(f64::MAX, f64::min);
        let buffer = self.params.range_buffer_pct;
        (low > 0.0).then_some((high * (1.0 + buffer), low * (1.0 - buffer)))
    }
}

impl Strategy for Grid {
    fn id(&self) -> StrategyId {
        StrategyId::Grid
    }

    fn warmup_bars(&self) -> usize {
        (self.params.range_period + 1).max(self.bracket.atr_period + 1)
    }

    fn calculate_indicators(&self, klines: &[Kline]) -> Result<IndicatorSet, StrategyError> {
        let series = Ohlcv::from_klines(klines)?;
        let mut set = base_indicators(&series, &self.bracket)?;
        if let Some((upper, lower)) = self.range(&series) {
            set.insert(GRID_UPPER, vec![upper; series.len()]);
            set.insert(GRID_LOWER, vec![lower; series.len()]);
        }
        Ok(set)
    }

    fn evaluate(
        &self,
        context: &MarketContext<'_>,
        indicators: &IndicatorSet,
    ) -> Result<Option<StrategySignal>, StrategyError> {
        if self.params.skip_trending && context.market_state.regime == Regime::Trending {
            return Ok(None);
        }
        let Some(kline) = context.last_kline() else {
            return Ok(None);
        };
        let (Some(close), Some(previous), Some(upper), Some(lower), Some(atr)) = (
            indicators.last(CLOSE),
            indicators.nth_back(CLOSE, 1),
            indicators.last(GRID_UPPER),
            indicators.last(GRID_LOWER),
            indicators.last(BRACKET_ATR),
        ) else {
            return Ok(None);
        };
        // A close outside the range means the grid no longer describes the market.
        if close <= lower || close >= upper {
            return Ok(None);
        }
        let spacing = atr * self.params.spacing_atr_multiple;
        let Some(grid) = GridLevels::build(upper, lower, spacing, self.params.grid_count) else {
            return Ok(None);
        };
        let levels = &grid.levels;

        let (direction, level, stop, target) = if close < previous {
            // Lowest level the close fell through.
            let Some(i) = levels.iter().position(|&l| previous > l && l >= close) else {
                return Ok(None);
            };
            let stop = if i > 0 { levels[i - 1] } else { grid.lower };
            let target = levels.get(i + 1).copied().unwrap_or(close * (1.0 + EDGE_TARGET_PCT));
            (Direction::Long, levels[i], stop, target)
        } else if close > previous {
            // Highest level the close rose through.
            let Some(i) = levels.iter().rposition(|&l| previous < l && l <= close) else {
                return Ok(None);
            };
            let stop = levels.get(i + 1).copied().unwrap_or(grid.upper);
            let target = if i > 0 { levels[i - 1] } else { close * (1.0 - EDGE_TARGET_PCT) };
            (Direction::Short, levels[i], stop, target)
        } else {
            return Ok(None);
        };
        tracing::debug!(?direction, level, stop, target, "Grid level crossed");

        let entry = kline.close;
        let (stop, target) = (to_price(stop, "grid stop")?, to_price(target, "grid target")?);
        let signal = match direction {
            Direction::Short => StrategySignal::short(entry, stop, target),
            _ => StrategySignal::long(entry, stop, target),
        };
        signal.validate()?;
        Ok(Some(
            signal
                .with_metadata("strategy", self.id())
                .with_metadata("grid_level", format!("{level:.4}"))
                .with_metadata("grid_levels", grid.levels.len()),
        ))
    }

    fn evaluate_exit(
        &self,
        context: &MarketContext<'_>,
        position: &Position,
        indicators: &IndicatorSet,
    ) -> Result<bool, StrategyError> {
        if bars_held(context.klines, position) >= self.params.max_hold_bars {
            return Ok(true);
        }
        let (Some(close), Some(upper), Some(lower)) = (
            indicators.last(CLOSE),
            indicators.last(GRID_UPPER),
            indicators.last(GRID_LOWER),
        ) else {
            return Ok(false);
        };
        Ok(match position.side {
            PositionSide::Long => close < lower,
            PositionSide::Short => close > upper,
        })
    }
}

use crate::Strategy;
use crate::common::{BRACKET_ATR, atr_bracket, base_indicators, validate_bracket};
use crate::error::StrategyError;
use configuration::{BracketParams, SuperTrendParams};
use core_types::{Direction, Kline, MarketContext, Position, PositionSide, StrategyId, StrategySignal};
use indicators::{IndicatorSet, Ohlcv, atr};

const SUPERTREND: &str = "supertrend";
/// `1.0` while the trend is up, `-1.0` while it is down.
const TREND: &str = "trend_direction";

/// Represents the direction of the SuperTrend
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Trend {
    Up,
    Down,
}

impl Trend {
    fn as_f64(self) -> f64 {
        match self {
            Trend::Up => 1.0,
            Trend::Down => -1.0,
        }
    }

    fn from_f64(value: f64) -> Option<Self> {
        if value > 0.0 {
            Some(Trend::Up)
        } else if value < 0.0 {
            Some(Trend::Down)
        } else {
            None
        }
    }
}

/// The SuperTrend strategy: trades flips of the ATR-banded trend line.
pub struct SuperTrend {
    params: SuperTrendParams,
    bracket: BracketParams,
}

impl SuperTrend {
    /// Creates a new `SuperTrend` instance.
    pub fn new(params: SuperTrendParams, bracket: BracketParams) -> Result<Self, StrategyError> {
        if params.atr_period == 0 {
            return Err(StrategyError::InvalidParameters(
                "ATR period cannot be zero".to_string(),
            ));
        }
        if !(params.atr_multiplier > 0.0) {
            return Err(StrategyError::InvalidParameters(format!(
                "ATR multiplier must be positive, got {}",
                params.atr_multiplier
            )));
        }
        validate_bracket(&bracket)?;
        Ok(Self { params, bracket })
    }

    /// Walks the window computing the final bands and the trend line.
    fn supertrend(&self, series: &Ohlcv) -> Result<(Vec<f64>, Vec<f64>), StrategyError> {
        let n = series.len();
        let atr = atr(series, self.params.atr_period)?;
        let mut line = vec![f64::NAN; n];
        let mut direction = vec![f64::NAN; n];

        let mut final_upper = f64::NAN;
        let mut final_lower = f64::NAN;
        let mut trend: Option<Trend> = None;

        for i in 0..n {
            if !atr[i].is_finite() {
                continue;
            }
            let hl2 = (series.high[i] + series.low[i]) / 2.0;
            let close = series.close[i];
            let basic_upper = hl2 + self.params.atr_multiplier * atr[i];
            let basic_lower = hl2 - self.params.atr_multiplier * atr[i];

            // Bands only tighten while price respects them.
            let prev_close = if i > 0 { series.close[i - 1] } else { close };
            final_upper = if final_upper.is_nan() || basic_upper < final_upper || prev_close > final_upper {
                basic_upper
            } else {
                final_upper
            };
            final_lower = if final_lower.is_nan() || basic_lower > final_lower || prev_close < final_lower {
                basic_lower
            } else {
                final_lower
            };

            let current = match trend {
                None if close >= hl2 => Trend::Up,
                None => Trend::Down,
                Some(Trend::Up) if close < final_lower => Trend::Down,
                Some(Trend::Down) if close > final_upper => Trend::Up,
                Some(t) => t,
            };
            trend = Some(current);
            direction[i] = current.as_f64();
            line[i] = match current {
                Trend::Up => final_lower,
                Trend::Down => final_upper,
            };
        }
        Ok((line, direction))
    }
}

impl Strategy for SuperTrend {
    fn id(&self) -> StrategyId {
        StrategyId::SuperTrend
    }

    fn warmup_bars(&self) -> usize {
        (self.params.atr_period + 1).max(self.bracket.atr_period)
    }

    fn calculate_indicators(&self, klines: &[Kline]) -> Result<IndicatorSet, StrategyError> {
        let series = Ohlcv::from_klines(klines)?;
        let mut set = base_indicators(&series, &self.bracket)?;
        let (line, direction) = self.supertrend(&series)?;
        set.insert(SUPERTREND, line);
        set.insert(TREND, direction);
        Ok(set)
    }

    /// Signals only on the bar where the trend flips.
    fn evaluate(
        &self,
        context: &MarketContext<'_>,
        indicators: &IndicatorSet,
    ) -> Result<Option<StrategySignal>, StrategyError> {
        let Some(kline) = context.last_kline() else {
            return Ok(None);
        };
        let current = indicators.last(TREND).and_then(Trend::from_f64);
        let previous = indicators.nth_back(TREND, 1).and_then(Trend::from_f64);
        let (Some(current), Some(previous), Some(atr)) = (current, previous, indicators.last(BRACKET_ATR)) else {
            return Ok(None);
        };

        let direction = match (previous, current) {
            (Trend::Down, Trend::Up) => Direction::Long,
            (Trend::Up, Trend::Down) => Direction::Short,
            _ => return Ok(None),
        };
        tracing::debug!(?previous, ?current, "SuperTrend flip");

        let mut signal = atr_bracket(direction, kline.close, atr, &self.bracket)?
            .with_metadata("strategy", self.id());
        if let Some(line) = indicators.last(SUPERTREND) {
            signal = signal.with_metadata("supertrend", format!("{line:.4}"));
        }
        Ok(Some(signal))
    }

    fn evaluate_exit(
        &self,
        _context: &MarketContext<'_>,
        position: &Position,
        indicators: &IndicatorSet,
    ) -> Result<bool, StrategyError> {
        let Some(trend) = indicators.last(TREND).and_then(Trend::from_f64) else {
            return Ok(false);
        };
        Ok(matches!(
            (position.side, trend),
            (PositionSide::Long, Trend::Down) | (PositionSide::Short, Trend::Up)
        ))
    }
}

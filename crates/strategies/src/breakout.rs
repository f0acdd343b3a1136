use crate::Strategy;
use crate::common::{BRACKET_ATR, CLOSE, atr_bracket, bars_held, base_indicators, validate_bracket};
use crate::error::StrategyError;
use configuration::{BreakoutParams, BracketParams};
use core_types::{Direction, Kline, MarketContext, Position, StrategyId, StrategySignal};
use indicators::{IndicatorSet, Ohlcv, volume_ratio};

const VOLUME_RATIO: &str = "volume_ratio";
const RANGE_HIGH: &str = "range_high";
const RANGE_LOW: &str = "range_low";
const VOLUME_PERIOD: usize = 20;

/// The consolidation range that precedes the last bar.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    high: f64,
    low: f64,
}

impl Range {
    fn width_pct(&self) -> f64 {
        (self.high - self.low) / self.low
    }
}

/// Consolidation breakout with volume confirmation.
pub struct Breakout {
    params: BreakoutParams,
    bracket: BracketParams,
}

impl Breakout {
    pub fn new(params: BreakoutParams, bracket: BracketParams) -> Result<Self, StrategyError> {
        if params.consolidation_period < 2 {
            return Err(StrategyError::InvalidParameters(format!(
                "Consolidation period must span at least two bars, got {}",
                params.consolidation_period
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

    /// High/low of the `consolidation_period` bars before the last one.
    fn consolidation(&self, series: &Ohlcv) -> Option<Range> {
        let end = series.len().checked_sub(1)?;
        let start = end.checked_sub(self.params.consolidation_period)?;
        let high = series.high[start..end].iter().copied().fold(f64::MIN, f64::max);
        let low = series.low[start..end].iter().copied().fold(f64::MAX, f64::min);
        (low > 0.0).then_some(Range { high, low })
    }
}

impl Strategy for Breakout {
    fn id(&self) -> StrategyId {
        StrategyId::Breakout
    }

    fn warmup_bars(&self) -> usize {
        (self.params.consolidation_period + 1)
            .max(VOLUME_PERIOD)
            .max(self.bracket.atr_period)
    }

    fn calculate_indicators(&self, klines: &[Kline]) -> Result<IndicatorSet, StrategyError> {
        let series = Ohlcv::from_klines(klines)?;
        let mut set = base_indicators(&series, &self.bracket)?;
        set.insert(VOLUME_RATIO, volume_ratio(&series.volume, VOLUME_PERIOD)?);
        if let Some(range) = self.consolidation(&series) {
            // Constant columns so the range travels with the rest of the readings.
            set.insert(RANGE_HIGH, vec![range.high; series.len()]);
            set.insert(RANGE_LOW, vec![range.low; series.len()]);
        }
        Ok(set)
    }

    fn evaluate(
        &self,
        context: &MarketContext<'_>,
        indicators: &IndicatorSet,
    ) -> Result<Option<StrategySignal>, StrategyError> {
        let Some(kline) = context.last_kline() else {
            return Ok(None);
        };
        let (Some(close), Some(high), Some(low), Some(volume), Some(atr)) = (
            indicators.last(CLOSE),
            indicators.last(RANGE_HIGH),
            indicators.last(RANGE_LOW),
            indicators.last(VOLUME_RATIO),
            indicators.last(BRACKET_ATR),
        ) else {
            return Ok(None);
        };
        let range = Range { high, low };

        let p = &self.params;
        if range.width_pct() > p.max_range_pct || volume < p.volume_surge_multiplier {
            return Ok(None);
        }
        let direction = if close > range.high * (1.0 + p.min_breakout_pct) {
            Direction::Long
        } else if close < range.low * (1.0 - p.min_breakout_pct) {
            Direction::Short
        } else {
            return Ok(None);
        };
        tracing::debug!(?direction, range_high = high, range_low = low, volume, "Breakout confirmed");

        let signal = atr_bracket(direction, kline.close, atr, &self.bracket)?
            .with_metadata("strategy", self.id())
            .with_metadata("range_high", format!("{high:.4}"))
            .with_metadata("range_low", format!("{low:.4}"));
        Ok(Some(signal))
    }

    fn evaluate_exit(
        &self,
        context: &MarketContext<'_>,
        position: &Position,
        _indicators: &IndicatorSet,
    ) -> Result<bool, StrategyError> {
        Ok(bars_held(context.klines, position) >= self.params.max_hold_bars)
    }
}

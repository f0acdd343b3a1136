use crate::Strategy;
use crate::common::{BRACKET_ATR, CLOSE, atr_bracket, base_indicators, validate_bracket};
use crate::error::StrategyError;
use configuration::{BracketParams, MACrossoverParams};
use core_types::{Direction, Kline, MarketContext, Position, PositionSide, StrategyId, StrategySignal};
use indicators::{IndicatorSet, Ohlcv, sma};

const MA_FAST: &str = "ma_fast";
const MA_SLOW: &str = "ma_slow";
const TREND_FILTER: &str = "trend_filter";

/// The Triple Moving Average Crossover strategy.
///
/// Enters on a fast/slow crossover confirmed by the long trend filter and exits
/// when the fast average crosses back against the position.
pub struct MACrossover {
    params: MACrossoverParams,
    bracket: BracketParams,
}

impl MACrossover {
    /// Creates a new `MACrossover` instance with the given parameters.
    ///
    /// It performs validation to ensure the parameters are logical.
    pub fn new(params: MACrossoverParams, bracket: BracketParams) -> Result<Self, StrategyError> {
        if params.ma_fast_period == 0 || params.trend_filter_period == 0 {
            return Err(StrategyError::InvalidParameters(
                "Moving average periods cannot be zero".to_string(),
            ));
        }
        if params.ma_fast_period >= params.ma_slow_period {
            return Err(StrategyError::InvalidParameters(
                "Fast MA period must be less than Slow MA period".to_string(),
            ));
        }
        validate_bracket(&bracket)?;
        Ok(Self { params, bracket })
    }
}

impl Strategy for MACrossover {
    fn id(&self) -> StrategyId {
        StrategyId::MaCrossover
    }

    fn warmup_bars(&self) -> usize {
        // One extra bar so the previous averages exist for the crossover test.
        (self.params.ma_slow_period + 1)
            .max(self.params.trend_filter_period)
            .max(self.bracket.atr_period)
    }

    fn calculate_indicators(&self, klines: &[Kline]) -> Result<IndicatorSet, StrategyError> {
        let series = Ohlcv::from_klines(klines)?;
        let mut set = base_indicators(&series, &self.bracket)?;
        set.insert(MA_FAST, sma(&series.close, self.params.ma_fast_period)?);
        set.insert(MA_SLOW, sma(&series.close, self.params.ma_slow_period)?);
        set.insert(TREND_FILTER, sma(&series.close, self.params.trend_filter_period)?);
        Ok(set)
    }

    /// A buy signal is generated when the fast MA crosses above the slow MA,
    /// AND the closing price is above the long-term trend filter MA.
    ///
    /// A sell signal is generated when the fast MA crosses below the slow MA,
    /// AND the closing price is below the long-term trend filter MA.
    fn evaluate(
        &self,
        context: &MarketContext<'_>,
        indicators: &IndicatorSet,
    ) -> Result<Option<StrategySignal>, StrategyError> {
        let Some(kline) = context.last_kline() else {
            return Ok(None);
        };
        // The warm-up period is implicit: any missing reading means no signal.
        let (Some(fast), Some(slow), Some(prev_fast), Some(prev_slow), Some(trend), Some(close), Some(atr)) = (
            indicators.last(MA_FAST),
            indicators.last(MA_SLOW),
            indicators.nth_back(MA_FAST, 1),
            indicators.nth_back(MA_SLOW, 1),
            indicators.last(TREND_FILTER),
            indicators.last(CLOSE),
            indicators.last(BRACKET_ATR),
        ) else {
            return Ok(None);
        };

        // ---===[ Crossover and Filter Logic ]===---
        let is_bullish_cross = prev_fast <= prev_slow && fast > slow;
        let is_bearish_cross = prev_fast >= prev_slow && fast < slow;
        let is_uptrend = close > trend;
        let is_downtrend = close < trend;

        tracing::debug!(fast, slow, trend, is_bullish_cross, is_bearish_cross, "MACrossover checks");

        let direction = if is_bullish_cross && is_uptrend {
            Direction::Long
        } else if is_bearish_cross && is_downtrend {
            Direction::Short
        } else {
            return Ok(None);
        };

        let signal = atr_bracket(direction, kline.close, atr, &self.bracket)?
            .with_metadata("strategy", self.id())
            .with_metadata("ma_fast", format!("{fast:.4}"))
            .with_metadata("ma_slow", format!("{slow:.4}"));
        Ok(Some(signal))
    }

    fn evaluate_exit(
        &self,
        _context: &MarketContext<'_>,
        position: &Position,
        indicators: &IndicatorSet,
    ) -> Result<bool, StrategyError> {
        let (Some(fast), Some(slow)) = (indicators.last(MA_FAST), indicators.last(MA_SLOW)) else {
            return Ok(false);
        };
        Ok(match position.side {
            PositionSide::Long => fast < slow,
            PositionSide::Short => fast > slow,
        })
    }
}

use crate::Strategy;
use crate::common::{BRACKET_ATR, CLOSE, atr_bracket, base_indicators, validate_bracket};
use crate::error::StrategyError;
use configuration::{BracketParams, ProbReversionParams};
use core_types::{Direction, Kline, MarketContext, Position, PositionSide, StrategyId, StrategySignal};
use indicators::{IndicatorSet, Ohlcv, adx, bollinger, rsi};

const BB_UPPER: &str = "bb_upper";
const BB_MIDDLE: &str = "bb_middle";
const BB_LOWER: &str = "bb_lower";
const RSI: &str = "rsi";
const ADX: &str = "adx";

/// Bollinger/RSI mean reversion, active only while the ADX says the market is not trending.
///
/// Longs are taken on a close at or below the lower band with an oversold RSI and
/// shorts on the mirror image. The position is released once price is back at the
/// middle band.
pub struct ProbReversion {
    params: ProbReversionParams,
    bracket: BracketParams,
}

impl ProbReversion {
    pub fn new(params: ProbReversionParams, bracket: BracketParams) -> Result<Self, StrategyError> {
        if params.bb_period < 2 || params.rsi_period == 0 || params.adx_period == 0 {
            return Err(StrategyError::InvalidParameters(format!(
                "Invalid periods (bb {}, rsi {}, adx {})",
                params.bb_period, params.rsi_period, params.adx_period
            )));
        }
        if params.rsi_oversold >= params.rsi_overbought {
            return Err(StrategyError::InvalidParameters(
                "RSI oversold level must be below the overbought level".to_string(),
            ));
        }
        validate_bracket(&bracket)?;
        Ok(Self { params, bracket })
    }
}

impl Strategy for ProbReversion {
    fn id(&self) -> StrategyId {
        StrategyId::ProbReversion
    }

    fn warmup_bars(&self) -> usize {
        (2 * self.params.adx_period)
            .max(self.params.bb_period)
            .max(self.params.rsi_period + 1)
            .max(self.bracket.atr_period)
    }

    fn calculate_indicators(&self, klines: &[Kline]) -> Result<IndicatorSet, StrategyError> {
        let series = Ohlcv::from_klines(klines)?;
        let mut set = base_indicators(&series, &self.bracket)?;
        let bands = bollinger(&series.close, self.params.bb_period, self.params.bb_std_dev)?;
        set.insert(BB_UPPER, bands.upper);
        set.insert(BB_MIDDLE, bands.middle);
        set.insert(BB_LOWER, bands.lower);
        set.insert(RSI, rsi(&series.close, self.params.rsi_period)?);
        set.insert(ADX, adx(&series, self.params.adx_period)?.adx);
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
        let (Some(close), Some(upper), Some(middle), Some(lower), Some(rsi), Some(adx), Some(atr)) = (
            indicators.last(CLOSE),
            indicators.last(BB_UPPER),
            indicators.last(BB_MIDDLE),
            indicators.last(BB_LOWER),
            indicators.last(RSI),
            indicators.last(ADX),
            indicators.last(BRACKET_ATR),
        ) else {
            return Ok(None);
        };

        // Reversion is only traded in a range.
        if adx >= self.params.adx_threshold {
            return Ok(None);
        }

        let direction = if close <= lower && rsi < self.params.rsi_oversold {
            Direction::Long
        } else if close >= upper && rsi > self.params.rsi_overbought {
            Direction::Short
        } else {
            return Ok(None);
        };
        tracing::debug!(close, lower, upper, rsi, adx, "ProbReversion band breach");

        let signal = atr_bracket(direction, kline.close, atr, &self.bracket)?
            .with_metadata("strategy", self.id())
            .with_metadata("mean_target", format!("{middle:.4}"))
            .with_metadata("rsi", format!("{rsi:.2}"));
        Ok(Some(signal))
    }

    fn evaluate_exit(
        &self,
        _context: &MarketContext<'_>,
        position: &Position,
        indicators: &IndicatorSet,
    ) -> Result<bool, StrategyError> {
        let (Some(close), Some(middle)) = (indicators.last(CLOSE), indicators.last(BB_MIDDLE)) else {
            return Ok(false);
        };
        Ok(match position.side {
            PositionSide::Long => close >= middle,
            PositionSide::Short => close <= middle,
        })
    }
}

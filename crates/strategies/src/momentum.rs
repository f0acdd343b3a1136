use crate::Strategy;
use crate::common::{BRACKET_ATR, CLOSE, atr_bracket, bars_held, base_indicators, validate_bracket};
use crate::error::StrategyError;
use configuration::{BracketParams, MomentumParams};
use core_types::{Direction, Kline, MarketContext, Position, StrategyId, StrategySignal};
use indicators::{IndicatorSet, Ohlcv, adx, rsi, volume_ratio};

const RSI: &str = "rsi";
const ADX: &str = "adx";
const VOLUME_RATIO: &str = "volume_ratio";

const RSI_PERIOD: usize = 14;
const ADX_PERIOD: usize = 14;
const VOLUME_PERIOD: usize = 20;

/// Short-horizon momentum.
///
/// Requires a run of same-coloured candles, a volume surge, an RSI inside the
/// configured band (mirrored for shorts), a trending ADX and a minimum move over
/// the run. Positions are time-boxed to `max_hold_bars`.
pub struct Momentum {
    params: MomentumParams,
    bracket: BracketParams,
}

impl Momentum {
    pub fn new(params: MomentumParams, bracket: BracketParams) -> Result<Self, StrategyError> {
        if params.consecutive_candles == 0 || params.max_hold_bars == 0 {
            return Err(StrategyError::InvalidParameters(
                "Momentum needs at least one candle and one bar of holding time".to_string(),
            ));
        }
        if !(params.rsi_min < params.rsi_max) {
            return Err(StrategyError::InvalidParameters(format!(
                "RSI band is empty ({} to {})",
                params.rsi_min, params.rsi_max
            )));
        }
        validate_bracket(&bracket)?;
        Ok(Self { params, bracket })
    }

    /// Direction of the run formed by the last `consecutive_candles` bars, if any.
    fn candle_run(&self, klines: &[Kline]) -> Option<Direction> {
        let n = self.params.consecutive_candles;
        let run = klines.get(klines.len().checked_sub(n)?..)?;
        if run.iter().all(|k| k.close > k.open) {
            Some(Direction::Long)
        } else if run.iter().all(|k| k.close < k.open) {
            Some(Direction::Short)
        } else {
            None
        }
    }
}

impl Strategy for Momentum {
    fn id(&self) -> StrategyId {
        StrategyId::Momentum
    }

    fn warmup_bars(&self) -> usize {
        (2 * ADX_PERIOD)
            .max(VOLUME_PERIOD)
            .max(RSI_PERIOD + 1)
            .max(self.params.consecutive_candles + 1)
            .max(self.bracket.atr_period)
    }

    fn calculate_indicators(&self, klines: &[Kline]) -> Result<IndicatorSet, StrategyError> {
        let series = Ohlcv::from_klines(klines)?;
        let mut set = base_indicators(&series, &self.bracket)?;
        set.insert(RSI, rsi(&series.close, RSI_PERIOD)?);
        set.insert(ADX, adx(&series, ADX_PERIOD)?.adx);
        set.insert(VOLUME_RATIO, volume_ratio(&series.volume, VOLUME_PERIOD)?);
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
        let Some(direction) = self.candle_run(context.klines) else {
            return Ok(None);
        };
        let run = self.params.consecutive_candles;
        let (Some(close), Some(run_start), Some(rsi), Some(adx), Some(volume), Some(atr)) = (
            indicators.last(CLOSE),
            indicators.nth_back(CLOSE, run),
            indicators.last(RSI),
            indicators.last(ADX),
            indicators.last(VOLUME_RATIO),
            indicators.last(BRACKET_ATR),
        ) else {
            return Ok(None);
        };

        // ---===[ Confirmation Filters ]===---
        let strength = close / run_start - 1.0;
        let p = &self.params;
        let confirmed = match direction {
            Direction::Long => {
                (p.rsi_min..=p.rsi_max).contains(&rsi) && strength >= p.min_momentum
            }
            Direction::Short => {
                (100.0 - p.rsi_max..=100.0 - p.rsi_min).contains(&rsi) && strength <= -p.min_momentum
            }
            Direction::Flat => false,
        };
        let is_trending = adx >= p.adx_threshold;
        let has_volume = volume >= p.volume_surge_multiplier;

        tracing::debug!(?direction, rsi, adx, volume, strength, "Momentum checks");
        if !(confirmed && is_trending && has_volume) {
            return Ok(None);
        }

        let signal = atr_bracket(direction, kline.close, atr, &self.bracket)?
            .with_metadata("strategy", self.id())
            .with_metadata("momentum", format!("{strength:.5}"))
            .with_metadata("max_hold_bars", p.max_hold_bars);
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

//! Pieces shared by every strategy: the ATR bracket and holding-time counts.

use crate::error::StrategyError;
use configuration::BracketParams;
use core_types::{Direction, Kline, Position, StrategySignal};
use indicators::{IndicatorSet, Ohlcv, atr};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

pub(crate) const CLOSE: &str = "close";
pub(crate) const BRACKET_ATR: &str = "bracket_atr";

/// Price precision of derived stop and target levels.
const PRICE_DP: u32 = 8;

/// Starts an indicator set with the close column and the bracket ATR.
pub(crate) fn base_indicators(
    series: &Ohlcv,
    bracket: &BracketParams,
) -> Result<IndicatorSet, StrategyError> {
    let mut set = IndicatorSet::new();
    set.insert(CLOSE, series.close.clone());
    set.insert(BRACKET_ATR, atr(series, bracket.atr_period)?);
    Ok(set)
}

pub(crate) fn validate_bracket(bracket: &BracketParams) -> Result<(), StrategyError> {
    if bracket.atr_period == 0 {
        return Err(StrategyError::InvalidParameters(
            "Bracket ATR period cannot be zero".to_string(),
        ));
    }
    if !(bracket.stop_atr_multiple > 0.0 && bracket.take_profit_atr_multiple > 0.0) {
        return Err(StrategyError::InvalidParameters(format!(
            "Bracket ATR multiples must be positive (stop {}, take profit {})",
            bracket.stop_atr_multiple, bracket.take_profit_atr_multiple
        )));
    }
    Ok(())
}

pub(crate) fn to_price(value: f64, what: &str) -> Result<Decimal, StrategyError> {
    if !value.is_finite() {
        return Err(StrategyError::NonFinite(format!("{what} is {value}")));
    }
    Decimal::from_f64(value)
        .map(|d| d.round_dp(PRICE_DP))
        .ok_or_else(|| StrategyError::NonFinite(format!("{what} {value} is out of range")))
}

/// Builds a signal whose stop and target sit `atr` multiples away from `entry`.
pub(crate) fn atr_bracket(
    direction: Direction,
    entry: Decimal,
    atr: f64,
    bracket: &BracketParams,
) -> Result<StrategySignal, StrategyError> {
    let stop_distance = to_price(atr * bracket.stop_atr_multiple, "stop distance")?;
    let target_distance = to_price(atr * bracket.take_profit_atr_multiple, "target distance")?;
    let signal = match direction {
        Direction::Long => {
            StrategySignal::long(entry, entry - stop_distance, entry + target_distance)
        }
        Direction::Short => {
            StrategySignal::short(entry, entry + stop_distance, entry - target_distance)
        }
        Direction::Flat => StrategySignal::flat(),
    };
    signal.validate()?;
    Ok(signal)
}

/// Number of bars in the window that closed after `position` was opened.
pub(crate) fn bars_held(klines: &[Kline], position: &Position) -> usize {
    klines
        .iter()
        .rev()
        .take_while(|k| k.timestamp > position.open_timestamp)
        .count()
}

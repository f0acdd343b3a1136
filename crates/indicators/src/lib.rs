//! # Perpetua Indicator Library
//!
//! Pure functions from OHLCV series to indicator series: SMA, EMA, RSI, ATR, ADX,
//! MACD, Bollinger Bands and volume ratio.
//!
//! ## Architectural Principles
//!
//! - **No state:** every function takes a full window and returns a series of the
//!   same length. Calling twice with the same input yields the same output.
//! - **Warm-up is `NaN`:** positions before an indicator is defined hold `NaN`
//!   instead of failing, so short windows degrade to "no reading".
//! - **Errors are for bad input only:** zero periods and malformed bars.
//!
//! ## Public API
//!
//! - `Ohlcv`: the `f64` column view of a kline window.
//! - `IndicatorSet`: named series computed by a strategy.
//! - `sma`, `ema`, `rsi`, `atr`, `adx`, `macd`, `bollinger`, `volume_ratio`.

pub mod adx;
pub mod error;
pub mod functions;
pub mod series;

pub use adx::{AdxSeries, adx};
pub use error::IndicatorError;
pub use functions::{
    BollingerSeries, MacdSeries, atr, bollinger, ema, macd, rsi, sma, volume_ratio,
};
pub use series::{IndicatorSet, Ohlcv};

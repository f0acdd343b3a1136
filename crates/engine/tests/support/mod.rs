#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use configuration::Config;
use core_types::{Direction, Kline, MarketContext, Position, StrategyId, StrategySignal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, BTreeSet};
use strategies::{IndicatorSet, Strategy, StrategyError};

pub fn at(hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
}

pub fn bar(hour: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Kline {
    Kline { timestamp: at(hour), open, high, low, close, volume: dec!(100) }
}

/// A quiet bar around `close`.
pub fn calm(hour: i64, close: Decimal) -> Kline {
    bar(hour, close, close + dec!(0.2), close - dec!(0.2), close)
}

/// No warm-up, and a classifier that always reports the neutral state
/// (ranging, medium volatility, 1% ATR).
pub fn config() -> Config {
    let mut config = Config::default();
    config.simulation.warmup_bars = 0;
    config.classifier.min_bars = 10_000;
    config
}

/// Enters and exits on fixed bar timestamps. Entries bracket the close at -2%/+4%.
#[derive(Debug, Default, Clone)]
pub struct Scripted {
    entries: BTreeMap<DateTime<Utc>, Direction>,
    exits: BTreeSet<DateTime<Utc>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(mut self, hour: i64, direction: Direction) -> Self {
        self.entries.insert(at(hour), direction);
        self
    }

    pub fn exit(mut self, hour: i64) -> Self {
        self.exits.insert(at(hour));
        self
    }

    pub fn boxed(self) -> Box<dyn Strategy> {
        Box::new(self)
    }
}

impl Strategy for Scripted {
    fn id(&self) -> StrategyId {
        StrategyId::MaCrossover
    }

    fn warmup_bars(&self) -> usize {
        0
    }

    fn calculate_indicators(&self, _klines: &[Kline]) -> Result<IndicatorSet, StrategyError> {
        Ok(IndicatorSet::new())
    }

    fn evaluate(
        &self,
        context: &MarketContext<'_>,
        _indicators: &IndicatorSet,
    ) -> Result<Option<StrategySignal>, StrategyError> {
        let Some(last) = context.last_kline() else {
            return Ok(None);
        };
        let close = last.close;
        Ok(match self.entries.get(&last.timestamp) {
            Some(Direction::Long) => {
                Some(StrategySignal::long(close, close * dec!(0.98), close * dec!(1.04)))
            }
            Some(Direction::Short) => {
                Some(StrategySignal::short(close, close * dec!(1.02), close * dec!(0.96)))
            }
            _ => None,
        })
    }

    fn evaluate_exit(
        &self,
        context: &MarketContext<'_>,
        _position: &Position,
        _indicators: &IndicatorSet,
    ) -> Result<bool, StrategyError> {
        Ok(context.last_kline().is_some_and(|k| self.exits.contains(&k.timestamp)))
    }
}

use crate::error::IndicatorError;
use core_types::Kline;
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;
use ta::DataItem;

/// Column-oriented `f64` copy of a kline window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ohlcv {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl Ohlcv {
    /// Converts a kline window, rejecting bars whose prices do not bound each other.
    pub fn from_klines(klines: &[Kline]) -> Result<Self, IndicatorError> {
        let mut series = Self {
            open: Vec::with_capacity(klines.len()),
            high: Vec::with_capacity(klines.len()),
            low: Vec::with_capacity(klines.len()),
            close: Vec::with_capacity(klines.len()),
            volume: Vec::with_capacity(klines.len()),
        };
        for (index, kline) in klines.iter().enumerate() {
            let convert = |value: rust_decimal::Decimal, field: &str| {
                value.to_f64().ok_or_else(|| IndicatorError::MalformedBar {
                    index,
                    reason: format!("{field} {value} has no f64 representation"),
                })
            };
            series.open.push(convert(kline.open, "open")?);
            series.high.push(convert(kline.high, "high")?);
            series.low.push(convert(kline.low, "low")?);
            series.close.push(convert(kline.close, "close")?);
            series.volume.push(convert(kline.volume, "volume")?);
        }
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// The bars as `ta` data items. `ta` validates the OHLC ordering itself.
    pub(crate) fn data_items(&self) -> Result<Vec<DataItem>, IndicatorError> {
        (0..self.len())
            .map(|i| {
                DataItem::builder()
                    .open(self.open[i])
                    .high(self.high[i])
                    .low(self.low[i])
                    .close(self.close[i])
                    .volume(self.volume[i])
                    .build()
                    .map_err(|e| IndicatorError::MalformedBar { index: i, reason: format!("{e:?}") })
            })
            .collect()
    }
}

/// Named indicator series computed by a strategy for one window.
///
/// Every series has the window's length; warm-up positions hold `NaN`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    series: BTreeMap<&'static str, Vec<f64>>,
}

impl IndicatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &'static str, values: Vec<f64>) {
        self.series.insert(name, values);
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(Vec::as_slice)
    }

    /// The latest value of `name`, if it is past warm-up.
    pub fn last(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|s| s.last().copied()).filter(|v| v.is_finite())
    }

    /// The value `back` bars before the latest one, if it is past warm-up.
    pub fn nth_back(&self, name: &str, back: usize) -> Option<f64> {
        let series = self.get(name)?;
        let index = series.len().checked_sub(back + 1)?;
        series.get(index).copied().filter(|v| v.is_finite())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.series.keys().copied()
    }
}

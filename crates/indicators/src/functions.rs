use crate::error::IndicatorError;
use crate::series::Ohlcv;
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage as Ema,
    MovingAverageConvergenceDivergence as Macd, RelativeStrengthIndex as Rsi,
    SimpleMovingAverage as Sma,
};

/// Output of [`macd`]. Each series has the input's length.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Output of [`bollinger`]. Each series has the input's length.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

fn invalid(name: &str, e: impl std::fmt::Debug) -> IndicatorError {
    IndicatorError::InvalidParameters(format!("{name}: {e:?}"))
}

/// Replaces the first `warmup` values with `NaN`.
fn mask(mut values: Vec<f64>, warmup: usize) -> Vec<f64> {
    for v in values.iter_mut().take(warmup) {
        *v = f64::NAN;
    }
    values
}

pub fn sma(values: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    let mut indicator = Sma::new(period).map_err(|e| invalid("sma", e))?;
    let out = values.iter().map(|v| indicator.next(*v)).collect();
    Ok(mask(out, period - 1))
}

pub fn ema(values: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    let mut indicator = Ema::new(period).map_err(|e| invalid("ema", e))?;
    let out = values.iter().map(|v| indicator.next(*v)).collect();
    Ok(mask(out, period - 1))
}

/// RSI in `[0, 100]`. The first `period` values are warm-up.
pub fn rsi(values: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    let mut indicator = Rsi::new(period).map_err(|e| invalid("rsi", e))?;
    let out = values.iter().map(|v| indicator.next(*v)).collect();
    Ok(mask(out, period))
}

/// Average true range in price units.
pub fn atr(series: &Ohlcv, period: usize) -> Result<Vec<f64>, IndicatorError> {
    let mut indicator = AverageTrueRange::new(period).map_err(|e| invalid("atr", e))?;
    let items = series.data_items()?;
    let out = items.iter().map(|item| indicator.next(item)).collect();
    Ok(mask(out, period - 1))
}

pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<MacdSeries, IndicatorError> {
    if fast >= slow {
        return Err(IndicatorError::InvalidParameters(format!(
            "macd: fast period {fast} must be shorter than slow period {slow}"
        )));
    }
    let mut indicator = Macd::new(fast, slow, signal).map_err(|e| invalid("macd", e))?;
    let mut out = MacdSeries {
        macd: Vec::with_capacity(values.len()),
        signal: Vec::with_capacity(values.len()),
        histogram: Vec::with_capacity(values.len()),
    };
    for v in values {
        let o = indicator.next(*v);
        out.macd.push(o.macd);
        out.signal.push(o.signal);
        out.histogram.push(o.histogram);
    }
    let line_warmup = slow - 1;
    let signal_warmup = slow + signal - 2;
    Ok(MacdSeries {
        macd: mask(out.macd, line_warmup),
        signal: mask(out.signal, signal_warmup),
        histogram: mask(out.histogram, signal_warmup),
    })
}

pub fn bollinger(
    values: &[f64],
    period: usize,
    std_dev: f64,
) -> Result<BollingerSeries, IndicatorError> {
    let mut indicator = BollingerBands::new(period, std_dev).map_err(|e| invalid("bollinger", e))?;
    let mut out = BollingerSeries {
        upper: Vec::with_capacity(values.len()),
        middle: Vec::with_capacity(values.len()),
        lower: Vec::with_capacity(values.len()),
    };
    for v in values {
        let o = indicator.next(*v);
        out.upper.push(o.upper);
        out.middle.push(o.average);
        out.lower.push(o.lower);
    }
    let warmup = period - 1;
    Ok(BollingerSeries {
        upper: mask(out.upper, warmup),
        middle: mask(out.middle, warmup),
        lower: mask(out.lower, warmup),
    })
}

/// Each bar's volume divided by the trailing `period` volume average.
pub fn volume_ratio(volumes: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    let average = sma(volumes, period)?;
    Ok(volumes
        .iter()
        .zip(average)
        .map(|(v, avg)| if avg > 0.0 { v / avg } else { f64::NAN })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn sma_masks_warmup_and_averages() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_close(out[2], 2.0);
        assert_close(out[4], 4.0);
    }

    #[test]
    fn zero_period_is_an_error_not_a_panic() {
        assert!(matches!(sma(&[1.0], 0), Err(IndicatorError::InvalidParameters(_))));
        assert!(matches!(rsi(&[1.0], 0), Err(IndicatorError::InvalidParameters(_))));
    }

    #[test]
    fn short_input_is_all_warmup() {
        let out = ema(&[10.0, 11.0], 5).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rsi_of_a_rising_series_is_saturated() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&closes, 14).unwrap();
        assert!(out[13].is_nan());
        assert_close(out[39], 100.0);
    }

    #[test]
    fn atr_of_constant_ranges_is_the_range() {
        let n = 30;
        let series = Ohlcv {
            open: vec![100.0; n],
            high: vec![105.0; n],
            low: vec![95.0; n],
            close: vec![100.0; n],
            volume: vec![1.0; n],
        };
        let out = atr(&series, 14).unwrap();
        assert!(out[12].is_nan());
        assert_close(out[29], 10.0);
    }

    #[test]
    fn atr_reports_the_malformed_bar() {
        let series = Ohlcv {
            open: vec![100.0, 100.0],
            high: vec![105.0, 90.0],
            low: vec![95.0, 95.0],
            close: vec![100.0, 100.0],
            volume: vec![1.0, 1.0],
        };
        assert!(matches!(atr(&series, 1), Err(IndicatorError::MalformedBar { index: 1, .. })));
    }

    #[test]
    fn bollinger_collapses_on_flat_prices() {
        let out = bollinger(&[50.0; 25], 20, 2.0).unwrap();
        assert!(out.middle[18].is_nan());
        assert_close(out.middle[24], 50.0);
        assert_close(out.upper[24], 50.0);
        assert_close(out.lower[24], 50.0);
    }

    #[test]
    fn macd_rejects_inverted_periods_and_masks_signal() {
        assert!(macd(&[1.0; 10], 26, 12, 9).is_err());
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64) * 0.5).collect();
        let out = macd(&closes, 12, 26, 9).unwrap();
        assert!(out.macd[24].is_nan());
        assert!(out.macd[25].is_finite());
        assert!(out.signal[32].is_nan());
        assert!(out.histogram[59].is_finite());
        assert!(out.macd[59] > 0.0);
    }

    #[test]
    fn volume_ratio_compares_to_trailing_mean() {
        let mut volumes = vec![10.0; 20];
        volumes.push(30.0);
        let out = volume_ratio(&volumes, 20).unwrap();
        assert_close(out[19], 1.0);
        // Trailing mean over the last 20 bars includes the spike: (19*10+30)/20 = 11.
        assert_close(out[20], 30.0 / 11.0);
    }
}

//! Average Directional Index with Wilder smoothing.
//!
//! `ta` has no ADX, so it is computed here directly from the bar series.

use crate::error::IndicatorError;
use crate::series::Ohlcv;

/// ADX and the two directional indicators. Each series has the input's length.
#[derive(Debug, Clone, PartialEq)]
pub struct AdxSeries {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

/// The ADX is defined from bar `2 * period - 1` on; the DI lines from bar `period`.
pub fn adx(series: &Ohlcv, period: usize) -> Result<AdxSeries, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidParameters("adx: period must be positive".to_string()));
    }
    let n = series.len();
    let mut out = AdxSeries {
        adx: vec![f64::NAN; n],
        plus_di: vec![f64::NAN; n],
        minus_di: vec![f64::NAN; n],
    };
    if n <= period {
        return Ok(out);
    }

    let (high, low, close) = (&series.high, &series.low, &series.close);
    let p = period as f64;

    let mut tr_sum = 0.0;
    let mut plus_sum = 0.0;
    let mut minus_sum = 0.0;
    let mut dx_window = Vec::with_capacity(period);
    let mut adx_prev = f64::NAN;

    for i in 1..n {
        let true_range = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        let plus_dm = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        let minus_dm = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };

        if i <= period {
            // Seed the Wilder sums with plain sums over the first `period` moves.
            tr_sum += true_range;
            plus_sum += plus_dm;
            minus_sum += minus_dm;
            if i < period {
                continue;
            }
        } else {
            tr_sum = tr_sum - tr_sum / p + true_range;
            plus_sum = plus_sum - plus_sum / p + plus_dm;
            minus_sum = minus_sum - minus_sum / p + minus_dm;
        }

        let (plus_di, minus_di) = if tr_sum > 0.0 {
            (100.0 * plus_sum / tr_sum, 100.0 * minus_sum / tr_sum)
        } else {
            (0.0, 0.0)
        };
        out.plus_di[i] = plus_di;
        out.minus_di[i] = minus_di;

        let di_total = plus_di + minus_di;
        let dx = if di_total > 0.0 { 100.0 * (plus_di - minus_di).abs() / di_total } else { 0.0 };

        if adx_prev.is_nan() {
            dx_window.push(dx);
            if dx_window.len() == period {
                adx_prev = dx_window.iter().sum::<f64>() / p;
                out.adx[i] = adx_prev;
            }
        } else {
            adx_prev = (adx_prev * (p - 1.0) + dx) / p;
            out.adx[i] = adx_prev;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending(n: usize) -> Ohlcv {
        let close: Vec<f64> = (0..n).map(|i| 100.0 * 1.01f64.powi(i as i32)).collect();
        Ohlcv {
            open: close.iter().map(|c| c / 1.01).collect(),
            high: close.iter().map(|c| c * 1.005).collect(),
            low: close.iter().map(|c| c / 1.01 * 0.995).collect(),
            close,
            volume: vec![1.0; n],
        }
    }

    #[test]
    fn warmup_is_two_periods() {
        let out = adx(&trending(40), 14).unwrap();
        assert!(out.adx[26].is_nan());
        assert!(out.adx[27].is_finite());
        assert!(out.plus_di[13].is_nan());
        assert!(out.plus_di[14].is_finite());
    }

    #[test]
    fn one_way_trend_saturates() {
        let out = adx(&trending(60), 14).unwrap();
        let last = out.adx[59];
        assert!(last > 95.0, "adx {last}");
        assert!(out.plus_di[59] > out.minus_di[59]);
    }

    #[test]
    fn zigzag_has_no_direction() {
        let n = 60;
        let close: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let series = Ohlcv {
            open: close.clone(),
            high: close.iter().map(|c| c + 0.5).collect(),
            low: close.iter().map(|c| c - 0.5).collect(),
            close,
            volume: vec![1.0; n],
        };
        let out = adx(&series, 14).unwrap();
        assert!(out.adx[59] < 15.0, "adx {}", out.adx[59]);
    }

    #[test]
    fn too_short_is_all_nan() {
        let out = adx(&trending(10), 14).unwrap();
        assert!(out.adx.iter().all(|v| v.is_nan()));
    }
}

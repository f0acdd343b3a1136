use crate::segmentation::RegimeSegmentation;
use configuration::ClassifierParams;
use core_types::{Kline, MarketState, Regime, VolatilityLevel, VolumeProfile};
use indicators::{IndicatorError, Ohlcv, adx, atr, bollinger, sma, volume_ratio};
use std::collections::BTreeMap;

/// Share of the oscillation score carried by band re-entries; the rest is midline crossings.
const REVERSION_WEIGHT: f64 = 0.6;
/// Share of the trend score carried by the ADX; the rest is moving-average alignment.
const ADX_WEIGHT: f64 = 0.7;
/// Midline crossings per ten bars that count as full oscillation.
const CROSSES_PER_TEN_BARS: f64 = 1.0;

pub struct MarketStateClassifier {
    params: ClassifierParams,
}

impl MarketStateClassifier {
    pub fn new(params: ClassifierParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClassifierParams {
        &self.params
    }

    /// Classifies the trailing `window` bars of `klines`.
    ///
    /// Returns the neutral default state when fewer than `min_bars` bars are
    /// available or when the window cannot be read.
    pub fn classify(&self, klines: &[Kline]) -> MarketState {
        let start = klines.len().saturating_sub(self.params.window);
        let window = &klines[start..];
        if window.is_empty() || window.len() < self.params.min_bars {
            return MarketState::default();
        }
        match self.try_classify(window) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, bars = window.len(), "Market state classification failed; using the neutral state");
                MarketState::default()
            }
        }
    }

    /// Labels every bar of `klines` with the regime of the window ending on it.
    pub fn segment(&self, klines: &[Kline]) -> RegimeSegmentation {
        let mut labels = Vec::with_capacity(klines.len());
        let mut frequencies = BTreeMap::new();
        for end in 1..=klines.len() {
            if end < self.params.min_bars {
                labels.push(None);
                continue;
            }
            let regime = self.classify(&klines[..end]).regime;
            *frequencies.entry(regime).or_insert(0) += 1;
            labels.push(Some(regime));
        }
        tracing::debug!(bars = klines.len(), ?frequencies, "Regime segmentation complete");
        RegimeSegmentation { labels, frequencies }
    }

    fn try_classify(&self, klines: &[Kline]) -> Result<MarketState, IndicatorError> {
        let p = &self.params;
        let series = Ohlcv::from_klines(klines)?;
        let n = series.len();
        let Some(&close) = series.close.last() else {
            return Ok(MarketState::default());
        };

        // --- 1. Volatility ---
        let atr_now = atr(&series, p.atr_period)?[n - 1];
        let atr_pct = if atr_now.is_finite() && close > 0.0 { atr_now / close } else { MarketState::default().atr_pct };
        let volatility_level = if atr_pct < p.atr_pct_low {
            VolatilityLevel::Low
        } else if atr_pct > p.atr_pct_high {
            VolatilityLevel::High
        } else {
            VolatilityLevel::Medium
        };

        // --- 2. Oscillation ---
        let oscillation_strength = self.oscillation(&series)?;

        // --- 3. Trend ---
        let adx_now = adx(&series, p.adx_period)?.adx[n - 1];
        let adx_score = if adx_now.is_finite() { (adx_now / p.adx_normalizer).min(1.0) } else { 0.5 };
        let alignment = ma_alignment(
            &sma(&series.close, p.ma_fast)?,
            &sma(&series.close, p.ma_slow)?,
        );
        let trend_strength = (ADX_WEIGHT * adx_score + (1.0 - ADX_WEIGHT) * alignment).clamp(0.0, 1.0);

        // --- 4. Volume ---
        let volume_now = volume_ratio(&series.volume, p.volume_period)?[n - 1];
        let volume_profile = if !volume_now.is_finite() {
            VolumeProfile::Normal
        } else if volume_now < p.volume_low {
            VolumeProfile::Low
        } else if volume_now > p.volume_high {
            VolumeProfile::High
        } else {
            VolumeProfile::Normal
        };

        // --- 5. Regime, in priority order trending > volatile > ranging ---
        let regime = if trend_strength > p.trending_threshold {
            Regime::Trending
        } else if volatility_level == VolatilityLevel::High && trend_strength < p.weak_trend_threshold {
            Regime::Volatile
        } else {
            Regime::Ranging
        };

        Ok(MarketState {
            regime,
            volatility_level,
            atr_pct,
            oscillation_strength,
            trend_strength,
            volume_profile,
            adx: adx_now,
        })
    }

    /// Blends how often band breaches return inside the band with how often price
    /// crosses the band's midline.
    fn oscillation(&self, series: &Ohlcv) -> Result<f64, IndicatorError> {
        let p = &self.params;
        let bands = bollinger(&series.close, p.band_period, p.band_std_dev)?;
        let close = &series.close;
        let n = close.len();
        let inside = |i: usize| close[i] >= bands.lower[i] && close[i] <= bands.upper[i];

        let mut breaches = 0usize;
        let mut reverted = 0usize;
        for i in 0..n {
            if !bands.middle[i].is_finite() || inside(i) {
                continue;
            }
            // Breaches too close to the end of the window cannot be judged yet.
            if i + p.reentry_lookahead >= n {
                continue;
            }
            breaches += 1;
            if (i + 1..=i + p.reentry_lookahead).any(inside) {
                reverted += 1;
            }
        }
        let reversion_ratio = if breaches == 0 { 0.5 } else { reverted as f64 / breaches as f64 };

        let mut crosses = 0usize;
        for i in 1..n {
            let (a, b) = (bands.middle[i - 1], bands.middle[i]);
            if !(a.is_finite() && b.is_finite()) {
                continue;
            }
            let (before, after) = (close[i - 1] - a, close[i] - b);
            if before * after < 0.0 {
                crosses += 1;
            }
        }
        let expected = (n as f64 / 10.0 * CROSSES_PER_TEN_BARS).max(1.0);
        let cross_score = (crosses as f64 / expected).min(1.0);

        Ok((REVERSION_WEIGHT * reversion_ratio + (1.0 - REVERSION_WEIGHT) * cross_score).clamp(0.0, 1.0))
    }
}

/// `|above - below| / evaluable` over the bars where both averages exist.
fn ma_alignment(fast: &[f64], slow: &[f64]) -> f64 {
    let mut above = 0i64;
    let mut below = 0i64;
    for (f, s) in fast.iter().zip(slow) {
        if !(f.is_finite() && s.is_finite()) {
            continue;
        }
        if f > s {
            above += 1;
        } else if f < s {
            below += 1;
        }
    }
    let evaluable = above + below;
    if evaluable == 0 {
        return 0.0;
    }
    (above - below).abs() as f64 / evaluable as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    /// Bars opening at the previous close with a fixed wick on each side.
    fn bars(closes: &[f64], wick: f64) -> Vec<Kline> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut previous = closes[0];
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = previous;
                previous = close;
                let d = |v: f64| Decimal::from_f64(v).unwrap().round_dp(6);
                Kline {
                    timestamp: start + Duration::hours(i as i64),
                    open: d(open),
                    high: d(open.max(close) + wick),
                    low: d(open.min(close) - wick),
                    close: d(close),
                    volume: Decimal::from(100),
                }
            })
            .collect()
    }

    #[test]
    fn an_empty_window_is_neutral_even_without_a_bar_minimum() {
        let params = ClassifierParams { min_bars: 0, ..ClassifierParams::default() };
        let classifier = MarketStateClassifier::new(params);
        let neutral = MarketState::default();
        let state = classifier.classify(&[]);
        assert_eq!(state.regime, neutral.regime);
        assert_eq!(state.atr_pct, neutral.atr_pct);
        assert!(state.adx.is_nan());

        let zero_window = ClassifierParams { window: 0, min_bars: 0, ..ClassifierParams::default() };
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let state = MarketStateClassifier::new(zero_window).classify(&bars(&closes, 0.5));
        assert_eq!(state.regime, neutral.regime);
        assert_eq!(state.volatility_level, neutral.volatility_level);
    }

    fn trend(n: usize, from: f64) -> Vec<f64> {
        (1..=n).map(|i| from * 1.015f64.powi(i as i32)).collect()
    }

    fn cycle(n: usize, amplitude: f64) -> Vec<f64> {
        (0..n).map(|i| 1000.0 + amplitude * [0.0, 1.0, 0.0, -1.0][i % 4]).collect()
    }

    fn classifier() -> MarketStateClassifier {
        MarketStateClassifier::new(ClassifierParams::default())
    }

    #[test]
    fn short_history_is_neutral() {
        let state = classifier().classify(&bars(&trend(30, 100.0), 0.1));
        assert_eq!(state.regime, Regime::Ranging);
        assert!(state.adx.is_nan());
        assert_eq!(state.trend_strength, 0.5);
    }

    #[test]
    fn persistent_trend_is_trending_even_when_volatile() {
        let state = classifier().classify(&bars(&trend(120, 100.0), 1.0));
        assert_eq!(state.regime, Regime::Trending);
        assert!(state.trend_strength > 0.9, "trend {}", state.trend_strength);
        assert!(state.adx > 90.0);
    }

    #[test]
    fn quiet_cycle_is_ranging() {
        let state = classifier().classify(&bars(&cycle(120, 2.0), 0.5));
        assert_eq!(state.regime, Regime::Ranging);
        assert_eq!(state.volatility_level, VolatilityLevel::Low);
        assert!(state.trend_strength < 0.4, "trend {}", state.trend_strength);
        assert_eq!(state.volume_profile, VolumeProfile::Normal);
    }

    #[test]
    fn wide_directionless_swings_are_volatile() {
        let state = classifier().classify(&bars(&cycle(120, 40.0), 1.0));
        assert_eq!(state.volatility_level, VolatilityLevel::High);
        assert_eq!(state.regime, Regime::Volatile);
        assert!((0.0..=1.0).contains(&state.oscillation_strength));
    }

    #[test]
    fn alignment_counts_consistent_ordering() {
        let nan = f64::NAN;
        assert_eq!(ma_alignment(&[nan, 2.0, 3.0, 4.0], &[nan, 1.0, 1.0, 1.0]), 1.0);
        assert_eq!(ma_alignment(&[2.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(ma_alignment(&[nan], &[nan]), 0.0);
    }

    #[test]
    fn segmentation_follows_the_market() {
        let mut closes = cycle(100, 2.0);
        closes.extend(trend(100, 1000.0));
        let klines = bars(&closes, 0.5);
        let params = ClassifierParams::default();
        let segmentation = classifier().segment(&klines);

        assert_eq!(segmentation.labels.len(), klines.len());
        assert!(segmentation.labels[..params.min_bars - 1].iter().all(Option::is_none));
        assert_eq!(segmentation.labels[99], Some(Regime::Ranging));
        assert_eq!(segmentation.labels[199], Some(Regime::Trending));
        let labeled: usize = segmentation.frequencies.values().sum();
        assert_eq!(labeled, klines.len() - (params.min_bars - 1));
    }
}

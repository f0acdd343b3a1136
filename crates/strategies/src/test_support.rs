use chrono::{DateTime, Duration, TimeZone, Utc};
use core_types::{
    Kline, MarketContext, MarketState, Position, PositionSide, ProtectionState, Regime,
    VolatilityLevel,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Hourly bars opening at the previous close, half a point of wick on each side.
pub fn klines_from_closes(closes: &[f64]) -> Vec<Kline> {
    let volumes = vec![100.0; closes.len()];
    klines_with_volume(closes, &volumes)
}

pub fn klines_with_volume(closes: &[f64], volumes: &[f64]) -> Vec<Kline> {
    let mut previous = closes[0];
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| {
            let open = previous;
            previous = close;
            Kline {
                timestamp: start() + Duration::hours(i as i64),
                open: Decimal::from_f64(open).unwrap(),
                high: Decimal::from_f64(open.max(close) + 0.5).unwrap(),
                low: Decimal::from_f64(open.min(close) - 0.5).unwrap(),
                close: Decimal::from_f64(close).unwrap(),
                volume: Decimal::from_f64(volume).unwrap(),
            }
        })
        .collect()
}

pub fn context<'a>(
    klines: &'a [Kline],
    state: &'a MarketState,
    position: Option<&'a Position>,
) -> MarketContext<'a> {
    MarketContext {
        symbol: "BTC-USDT-SWAP",
        klines,
        equity: dec!(10000),
        position,
        market_state: state,
        advisory: None,
    }
}

pub fn position(side: PositionSide, entry_price: Decimal, open_timestamp: DateTime<Utc>) -> Position {
    Position {
        symbol: "BTC-USDT-SWAP".to_string(),
        side,
        entry_price,
        size: dec!(1),
        leverage: dec!(6),
        contract_value: dec!(0.01),
        open_timestamp,
        entry_fee: Decimal::ZERO,
        entry_slippage: Decimal::ZERO,
        initial_risk: Decimal::ZERO,
        protection: ProtectionState {
            current_stop_loss: entry_price * dec!(0.95),
            current_take_profit: entry_price * dec!(1.05),
            lock_ratio_applied: None,
            last_update_timestamp: open_timestamp,
            regime_at_open: Regime::Ranging,
            volatility_at_open: VolatilityLevel::Medium,
            atr_at_open: dec!(1),
            level: "defensive".to_string(),
        },
    }
}

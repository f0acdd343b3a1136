//! Initial protection and the throttled protection orbit with its lock-in ratchet.

use crate::error::RiskError;
use chrono::{DateTime, Utc};
use configuration::RiskManagement;
use core_types::{MarketState, Position, PositionSide, ProtectionState, StrategySignal};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::time::Duration;

/// Price precision of computed stop and target levels.
const PRICE_DP: u32 = 8;

/// The stricter of two stops: higher for a long, lower for a short.
fn tighter(side: PositionSide, a: Decimal, b: Decimal) -> Decimal {
    match side {
        PositionSide::Long => a.max(b),
        PositionSide::Short => a.min(b),
    }
}

fn looser(side: PositionSide, candidate: Decimal, current: Decimal) -> bool {
    match side {
        PositionSide::Long => candidate < current,
        PositionSide::Short => candidate > current,
    }
}

/// `stop < take_profit` for a long, the mirror for a short.
fn ordered(side: PositionSide, stop: Decimal, take_profit: Decimal) -> bool {
    match side {
        PositionSide::Long => stop < take_profit,
        PositionSide::Short => stop > take_profit,
    }
}

fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

/// ATR-based bracket from the volatility tier table.
///
/// The ATR is `atr_pct * entry` from the market state. When no usable ATR is
/// available the signal's own stop and target are kept, and the implied ATR is
/// recorded for later orbit updates.
pub(crate) fn initial_protection(
    params: &RiskManagement,
    signal: &StrategySignal,
    market_state: &MarketState,
    opened_at: DateTime<Utc>,
) -> Result<ProtectionState, RiskError> {
    let Some(side) = signal.direction.side() else {
        return Err(RiskError::InvalidParameters("cannot protect a flat signal".to_string()));
    };
    let entry = signal.entry_price;
    if entry <= Decimal::ZERO {
        return Err(RiskError::InvalidEntryPrice(entry));
    }
    let tier = params.atr_tiers.for_level(market_state.volatility_level);
    let level = params
        .protection_levels
        .first()
        .map(|l| l.name.clone())
        .unwrap_or_default();

    let atr = Decimal::from_f64(market_state.atr_pct)
        .filter(|pct| *pct > Decimal::ZERO && market_state.atr_pct.is_finite())
        .map(|pct| (pct * entry).round_dp(PRICE_DP));

    let (stop, take_profit, atr_at_open) = match atr {
        Some(atr) => {
            let sign = side.sign();
            (
                entry - sign * tier.stop_loss * atr,
                entry + sign * tier.take_profit * atr,
                atr,
            )
        }
        None => {
            tracing::debug!("No usable ATR at open; keeping the signal's bracket");
            let implied = if tier.stop_loss > Decimal::ZERO {
                ((entry - signal.stop_loss).abs() / tier.stop_loss).round_dp(PRICE_DP)
            } else {
                (entry - signal.stop_loss).abs()
            };
            (signal.stop_loss, signal.take_profit, implied)
        }
    };

    let state = ProtectionState {
        current_stop_loss: stop.round_dp(PRICE_DP),
        current_take_profit: take_profit.round_dp(PRICE_DP),
        lock_ratio_applied: None,
        last_update_timestamp: opened_at,
        regime_at_open: market_state.regime,
        volatility_at_open: market_state.volatility_level,
        atr_at_open,
        level,
    };
    let brackets_entry = match side {
        PositionSide::Long => state.current_stop_loss < entry && entry < state.current_take_profit,
        PositionSide::Short => state.current_take_profit < entry && entry < state.current_stop_loss,
    };
    if !brackets_entry || state.current_stop_loss <= Decimal::ZERO || state.current_take_profit <= Decimal::ZERO {
        return Err(RiskError::InvariantViolation {
            side,
            detail: format!(
                "initial protection stop {} / target {} does not bracket entry {}",
                state.current_stop_loss, state.current_take_profit, entry
            ),
        });
    }
    Ok(state)
}

/// One orbit step. Returns `None` when the update is throttled or would not move
/// the protection by more than the minimum delta.
pub(crate) fn update_protection(
    params: &RiskManagement,
    position: &Position,
    mark: Decimal,
    now: DateTime<Utc>,
) -> Result<Option<ProtectionState>, RiskError> {
    let state = &position.protection;
    let side = position.side;
    let entry = position.entry_price;

    // --- 1. Cadence ---
    let held = elapsed(position.open_timestamp, now);
    if held < params.orbit_min_trigger_time {
        return Ok(None);
    }
    if state.last_update_timestamp > position.open_timestamp
        && elapsed(state.last_update_timestamp, now) < params.orbit_update_interval
    {
        return Ok(None);
    }

    // --- 2. Protection level for the holding time and profit ---
    let profit = position.profit_ratio(mark);
    let level = params
        .protection_levels
        .iter()
        .rev()
        .find(|l| l.activation_time <= held && profit >= l.min_profit_required);
    let sign = side.sign();
    let atr = state.atr_at_open;
    let (mut stop, mut take_profit, level_name) = match level {
        Some(l) => (
            entry - sign * l.stop_loss_multiplier * atr,
            entry + sign * l.take_profit_multiplier * atr,
            l.name.clone(),
        ),
        None => (state.current_stop_loss, state.current_take_profit, state.level.clone()),
    };

    // --- 3. Lock-in ratchet ---
    let mut lock_ratio = state.lock_ratio_applied;
    if profit >= params.lock_stop_loss_profit_threshold {
        if let Some(tier) = params.lock_tiers.iter().rev().find(|t| profit >= t.min_profit) {
            let locked = entry + tier.lock_ratio * (mark - entry);
            stop = tighter(side, stop, locked);
            lock_ratio = Some(lock_ratio.map_or(tier.lock_ratio, |r| r.max(tier.lock_ratio)));
        }
    }
    if lock_ratio.is_some() {
        stop = tighter(side, stop, state.current_stop_loss);
    }
    stop = stop.round_dp(PRICE_DP);
    take_profit = take_profit.round_dp(PRICE_DP);
    if !ordered(side, stop, take_profit) {
        take_profit = state.current_take_profit;
    }
    if !ordered(side, stop, take_profit) {
        tracing::debug!(%stop, %take_profit, "Orbit proposal has crossed levels; skipping");
        return Ok(None);
    }

    // --- 4. Throttle on the size of the move ---
    let min_delta = params.min_update_delta * entry;
    let moved = (stop - state.current_stop_loss).abs() > min_delta
        || (take_profit - state.current_take_profit).abs() > min_delta;
    if !moved {
        return Ok(None);
    }

    let updated = ProtectionState {
        current_stop_loss: stop,
        current_take_profit: take_profit,
        lock_ratio_applied: lock_ratio,
        last_update_timestamp: now,
        level: level_name,
        ..state.clone()
    };
    ensure_ratchet(side, state, &updated)?;
    Ok(Some(updated))
}

/// Rejects any transition that loosens a stop after a lock-in was applied, or
/// that produces a non-positive stop.
pub fn ensure_ratchet(
    side: PositionSide,
    before: &ProtectionState,
    after: &ProtectionState,
) -> Result<(), RiskError> {
    if after.current_stop_loss <= Decimal::ZERO {
        return Err(RiskError::InvariantViolation {
            side,
            detail: format!("stop moved to non-positive price {}", after.current_stop_loss),
        });
    }
    if before.lock_ratio_applied.is_some()
        && looser(side, after.current_stop_loss, before.current_stop_loss)
    {
        return Err(RiskError::InvariantViolation {
            side,
            detail: format!(
                "locked stop loosened from {} to {}",
                before.current_stop_loss, after.current_stop_loss
            ),
        });
    }
    if after.lock_ratio_applied < before.lock_ratio_applied {
        return Err(RiskError::InvariantViolation {
            side,
            detail: "lock ratio decreased".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{Direction, Regime, VolatilityLevel};
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn secs(n: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(n)
    }

    fn long_at_90000() -> Position {
        Position {
            symbol: "BTC-USDT-SWAP".to_string(),
            side: PositionSide::Long,
            entry_price: dec!(90000),
            size: dec!(1),
            leverage: dec!(6),
            contract_value: dec!(0.01),
            open_timestamp: t0(),
            entry_fee: dec!(0.9),
            entry_slippage: dec!(0.45),
            initial_risk: dec!(30),
            protection: ProtectionState {
                current_stop_loss: dec!(87000),
                current_take_profit: dec!(93750),
                lock_ratio_applied: None,
                last_update_timestamp: t0(),
                regime_at_open: Regime::Trending,
                volatility_at_open: VolatilityLevel::Medium,
                atr_at_open: dec!(1500),
                level: "defensive".to_string(),
            },
        }
    }

    fn mirrored_short() -> Position {
        let mut p = long_at_90000();
        p.side = PositionSide::Short;
        p.protection.current_stop_loss = dec!(93000);
        p.protection.current_take_profit = dec!(86250);
        p
    }

    #[test]
    fn initial_bracket_uses_the_volatility_tier() {
        let signal = StrategySignal::long(dec!(96000), dec!(95000), dec!(97000));
        // 1/64 is exact in binary: ATR = 1500.
        let state = MarketState { atr_pct: 0.015625, volatility_level: VolatilityLevel::Medium, ..MarketState::default() };
        let p = initial_protection(&RiskManagement::default(), &signal, &state, t0()).unwrap();
        assert_eq!(p.current_stop_loss, dec!(93000));
        assert_eq!(p.current_take_profit, dec!(99750));
        assert_eq!(p.atr_at_open, dec!(1500));
        assert_eq!(p.level, "defensive");
        assert_eq!(p.lock_ratio_applied, None);

        let high = MarketState { volatility_level: VolatilityLevel::High, ..state };
        let p = initial_protection(&RiskManagement::default(), &StrategySignal { direction: Direction::Short, stop_loss: dec!(97000), take_profit: dec!(95000), ..signal }, &high, t0()).unwrap();
        assert_eq!(p.current_stop_loss, dec!(99750));
        assert_eq!(p.current_take_profit, dec!(91500));
    }

    #[test]
    fn missing_atr_keeps_the_signal_bracket() {
        let signal = StrategySignal::long(dec!(100), dec!(96), dec!(110));
        let state = MarketState { atr_pct: f64::NAN, ..MarketState::default() };
        let p = initial_protection(&RiskManagement::default(), &signal, &state, t0()).unwrap();
        assert_eq!(p.current_stop_loss, dec!(96));
        assert_eq!(p.current_take_profit, dec!(110));
        assert_eq!(p.atr_at_open, dec!(2));
    }

    #[test]
    fn lock_in_moves_the_stop_above_entry() {
        let position = long_at_90000();
        let updated = update_protection(&RiskManagement::default(), &position, dec!(90900), secs(200))
            .unwrap()
            .unwrap();
        assert_eq!(updated.current_stop_loss, dec!(90360));
        assert!(updated.current_stop_loss > dec!(87000));
        assert_eq!(updated.current_take_profit, dec!(93750));
        assert_eq!(updated.lock_ratio_applied, Some(dec!(0.4)));
        assert_eq!(updated.last_update_timestamp, secs(200));
    }

    #[test]
    fn lock_in_is_mirrored_for_shorts() {
        let position = mirrored_short();
        let updated = update_protection(&RiskManagement::default(), &position, dec!(89100), secs(200))
            .unwrap()
            .unwrap();
        assert_eq!(updated.current_stop_loss, dec!(89640));
        assert_eq!(updated.lock_ratio_applied, Some(dec!(0.4)));
    }

    #[test]
    fn updates_wait_for_the_minimum_trigger_time() {
        let position = long_at_90000();
        let result = update_protection(&RiskManagement::default(), &position, dec!(90900), secs(179)).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn updates_are_throttled_by_the_interval() {
        let mut position = long_at_90000();
        position.protection.last_update_timestamp = secs(200);
        let params = RiskManagement::default();
        assert_eq!(update_protection(&params, &position, dec!(91500), secs(300)).unwrap(), None);
        assert!(update_protection(&params, &position, dec!(91500), secs(320)).unwrap().is_some());
    }

    #[test]
    fn small_moves_are_a_no_op() {
        // Defensive level reproduces the current bracket and there is no lock yet.
        let position = long_at_90000();
        let result = update_protection(&RiskManagement::default(), &position, dec!(90100), secs(600)).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn later_levels_tighten_with_profit_and_time() {
        let position = long_at_90000();
        // One hour in, 0.6% up: aggressive level, below the lock threshold.
        let updated = update_protection(&RiskManagement::default(), &position, dec!(90540), secs(3600))
            .unwrap()
            .unwrap();
        assert_eq!(updated.level, "aggressive");
        assert_eq!(updated.current_stop_loss, dec!(88800));
        assert_eq!(updated.current_take_profit, dec!(92250));
    }

    #[test]
    fn locked_stop_survives_a_pullback() {
        let mut position = long_at_90000();
        position.protection.current_stop_loss = dec!(90360);
        position.protection.lock_ratio_applied = Some(dec!(0.4));
        // Price falls back under the lock threshold; the orbit alone would drop the stop to 87000.
        let result = update_protection(&RiskManagement::default(), &position, dec!(90200), secs(900)).unwrap();
        match result {
            None => {}
            Some(state) => assert!(state.current_stop_loss >= dec!(90360)),
        }
    }

    #[test]
    fn loosening_a_locked_stop_is_an_invariant_violation() {
        let before = ProtectionState { lock_ratio_applied: Some(dec!(0.4)), current_stop_loss: dec!(90360), ..long_at_90000().protection };
        let after = ProtectionState { current_stop_loss: dec!(90000), ..before.clone() };
        assert!(matches!(
            ensure_ratchet(PositionSide::Long, &before, &after),
            Err(RiskError::InvariantViolation { .. })
        ));
        // The same move before any lock is allowed.
        let unlocked = ProtectionState { lock_ratio_applied: None, ..before.clone() };
        let after = ProtectionState { lock_ratio_applied: None, ..after };
        assert!(ensure_ratchet(PositionSide::Long, &unlocked, &after).is_ok());
        // For a short, raising the stop is loosening.
        let short_before = ProtectionState { current_stop_loss: dec!(89640), ..before };
        let short_after = ProtectionState { current_stop_loss: dec!(90000), ..short_before.clone() };
        assert!(ensure_ratchet(PositionSide::Short, &short_before, &short_after).is_err());
    }
}

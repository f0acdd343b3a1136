//! Regression tests for contract-value-correct fee and PnL accounting.

use chrono::{DateTime, Duration, TimeZone, Utc};
use configuration::Simulation;
use core_types::{ExitReason, PositionSide, ProtectionState, Regime, Trade, VolatilityLevel};
use executor::{Executor, ExecutorError, FillRequest, Leg, Portfolio, SimulatedExecutor};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn opened_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

fn executor(contract_value: Decimal, slippage_rate: Decimal) -> SimulatedExecutor {
    SimulatedExecutor::new(&Simulation {
        fee_rate: dec!(0.001),
        slippage_rate,
        contract_value,
        ..Simulation::default()
    })
    .unwrap()
}

fn protection(side: PositionSide, entry: Decimal) -> ProtectionState {
    let (stop, target) = match side {
        PositionSide::Long => (entry * dec!(0.9), entry * dec!(1.1)),
        PositionSide::Short => (entry * dec!(1.1), entry * dec!(0.9)),
    };
    ProtectionState {
        current_stop_loss: stop,
        current_take_profit: target,
        lock_ratio_applied: None,
        last_update_timestamp: opened_at(),
        regime_at_open: Regime::Ranging,
        volatility_at_open: VolatilityLevel::Medium,
        atr_at_open: entry * dec!(0.01),
        level: "defensive".to_string(),
    }
}

fn round_trip(
    exchange: &SimulatedExecutor,
    side: PositionSide,
    entry: Decimal,
    exit: Decimal,
    size: Decimal,
) -> (Trade, Portfolio) {
    let mut portfolio = Portfolio::new(dec!(10000));
    let entry_fill = exchange
        .execute(&FillRequest { side, leg: Leg::Entry, price: entry, size, timestamp: opened_at() })
        .unwrap();
    let position = entry_fill
        .into_position("BTCUSDT", dec!(6), Decimal::ZERO, protection(side, entry))
        .unwrap();
    portfolio.open(position).unwrap();

    let exit_fill = exchange
        .execute(&FillRequest {
            side,
            leg: Leg::Exit,
            price: exit,
            size,
            timestamp: opened_at() + Duration::hours(4),
        })
        .unwrap();
    let trade = portfolio.close(&exit_fill, ExitReason::TakeProfit).unwrap();
    (trade, portfolio)
}

#[test]
fn btc_perpetual_round_trip_uses_the_contract_value() {
    let (trade, portfolio) =
        round_trip(&executor(dec!(0.01), Decimal::ZERO), PositionSide::Long, dec!(90000), dec!(90900), dec!(1));

    // 90000 * 0.01 * 0.001 and 90900 * 0.01 * 0.001.
    assert_eq!(trade.fee_paid, dec!(0.9) + dec!(0.909));
    assert_eq!(trade.gross_pnl, dec!(9.0));
    assert_eq!(trade.realized_pnl, dec!(7.191));
    assert_eq!(portfolio.balance(), dec!(10007.191));
}

#[test]
fn a_contract_value_of_100_inflates_costs_ten_thousandfold() {
    let (trade, _) =
        round_trip(&executor(dec!(100), Decimal::ZERO), PositionSide::Long, dec!(90000), dec!(90900), dec!(1));

    assert_ne!(trade.realized_pnl, dec!(7.191));
    assert_eq!(trade.fee_paid, dec!(1.809) * dec!(10000));
}

#[test]
fn shorts_profit_from_falling_prices() {
    let (trade, _) =
        round_trip(&executor(dec!(0.01), Decimal::ZERO), PositionSide::Short, dec!(90000), dec!(89100), dec!(1));
    assert_eq!(trade.gross_pnl, dec!(9.0));
    assert_eq!(trade.fee_paid, dec!(0.9) + dec!(0.891));
    assert_eq!(trade.realized_pnl, dec!(9.0) - dec!(1.791));
}

#[test]
fn slippage_is_charged_on_both_legs() {
    let (trade, _) =
        round_trip(&executor(dec!(0.01), dec!(0.0005)), PositionSide::Long, dec!(90000), dec!(90900), dec!(1));
    assert_eq!(trade.slippage_cost, dec!(0.45) + dec!(0.4545));
    assert_eq!(trade.realized_pnl, dec!(7.191) - dec!(0.9045));
}

#[test]
fn a_fill_priced_with_another_contract_value_is_rejected() {
    let mut portfolio = Portfolio::new(dec!(10000));
    let entry = executor(dec!(0.01), Decimal::ZERO)
        .execute(&FillRequest {
            side: PositionSide::Long,
            leg: Leg::Entry,
            price: dec!(90000),
            size: dec!(1),
            timestamp: opened_at(),
        })
        .unwrap();
    portfolio
        .open(entry.into_position("BTCUSDT", dec!(6), Decimal::ZERO, protection(PositionSide::Long, dec!(90000))).unwrap())
        .unwrap();

    let exit = executor(dec!(100), Decimal::ZERO)
        .execute(&FillRequest {
            side: PositionSide::Long,
            leg: Leg::Exit,
            price: dec!(90900),
            size: dec!(1),
            timestamp: opened_at(),
        })
        .unwrap();
    assert_eq!(
        portfolio.close(&exit, ExitReason::SignalExit),
        Err(ExecutorError::ContractValueMismatch { position: dec!(0.01), executor: dec!(100) })
    );
}

// ── Generators ──

fn arb_side() -> impl Strategy<Value = PositionSide> {
    prop_oneof![Just(PositionSide::Long), Just(PositionSide::Short)]
}

fn arb_price() -> impl Strategy<Value = Decimal> {
    (1_000u32..200_000).prop_map(Decimal::from)
}

// ── Properties ──

proptest! {
    #[test]
    fn balance_after_close_is_capital_plus_realized(
        side in arb_side(),
        entry in arb_price(),
        exit in arb_price(),
        lots in 1u32..500,
    ) {
        let size = Decimal::from(lots) / dec!(100);
        let (trade, portfolio) = round_trip(&executor(dec!(0.01), dec!(0.0005)), side, entry, exit, size);
        prop_assert_eq!(portfolio.balance(), dec!(10000) + trade.realized_pnl);
        prop_assert_eq!(trade.realized_pnl, trade.gross_pnl - trade.fee_paid - trade.slippage_cost);
    }
}

mod support;

use chrono::{DateTime, Utc};
use configuration::Config;
use core_types::{Direction, ExitReason, Kline, MarketContext, MarketState, Position, PositionSide, ProtectionState, Regime, StrategySignal};
use engine::{CycleInputs, EngineError, ExecutionEngine, Phase, RegimeAdaptation};
use events::EngineEvent;
use executor::SimulatedExecutor;
use risk::{ContractSpec, ExitTrigger, OrbitRiskManager, PositionSizing, RiskError, RiskManager};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use support::{Scripted, at, bar, calm, config};

const SYMBOL: &str = "BTC-USDT-SWAP";

fn engine(config: &Config, strategy: Scripted) -> ExecutionEngine {
    ExecutionEngine::new(config, SYMBOL, strategy.boxed()).unwrap()
}

fn feed(engine: &mut ExecutionEngine, bars: Vec<Kline>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    for kline in bars {
        if let Some(outcome) = engine.on_kline(kline, &CycleInputs::default()).unwrap() {
            events.extend(outcome.events);
        }
    }
    events
}

// ---===[ Entries and exits ]===---

#[test]
fn long_round_trip_to_take_profit() {
    let mut engine = engine(&config(), Scripted::new().enter(0, Direction::Long));
    let events = feed(
        &mut engine,
        vec![calm(0, dec!(100)), bar(1, dec!(100), dec!(103), dec!(99.8), dec!(102.8))],
    );

    // Ranging at 1% ATR: stop 2.0 ATR below, target 2.5 ATR above.
    let opened = match &events[0] {
        EngineEvent::PositionOpened { position } => position,
        other => panic!("expected an open, got {other:?}"),
    };
    assert_eq!(opened.protection.current_stop_loss, dec!(98));
    assert_eq!(opened.protection.current_take_profit, dec!(102.5));
    // 2% of 10000 over a 2.00 stop at 0.01 per contract, times the ranging multiplier.
    assert_eq!(opened.size, dec!(8000));
    assert_eq!(opened.entry_fee, dec!(8));
    assert_eq!(opened.entry_slippage, dec!(4));
    assert_eq!(opened.initial_risk, dec!(160));

    let trade = match &events[1] {
        EngineEvent::PositionClosed { trade } => trade,
        other => panic!("expected a close, got {other:?}"),
    };
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_eq!(trade.exit_price, dec!(102.5));
    assert_eq!(trade.gross_pnl, dec!(200));
    assert_eq!(trade.fee_paid, dec!(16.2));
    assert_eq!(trade.slippage_cost, dec!(8.1));
    assert_eq!(trade.realized_pnl, dec!(175.7));

    assert_eq!(engine.phase(), Phase::Flat);
    assert_eq!(engine.portfolio().balance(), dec!(10175.7));
    let curve = engine.equity_curve();
    assert_eq!(curve.len(), 3);
    assert_eq!(curve[0].equity, dec!(10000));
    assert_eq!(curve[0].timestamp, at(0));
    assert_eq!(curve[2].equity, dec!(10175.7));
}

#[test]
fn stop_wins_when_both_levels_are_inside_the_bar() {
    let mut engine = engine(&config(), Scripted::new().enter(0, Direction::Long));
    feed(
        &mut engine,
        vec![calm(0, dec!(100)), bar(1, dec!(100), dec!(103), dec!(97.5), dec!(101))],
    );

    let trade = &engine.trades()[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, dec!(98));
    assert_eq!(trade.realized_pnl, dec!(-183.76));
}

#[test]
fn strategy_exit_takes_precedence_over_protection() {
    let mut engine = engine(&config(), Scripted::new().enter(0, Direction::Long).exit(1));
    feed(
        &mut engine,
        vec![calm(0, dec!(100)), bar(1, dec!(100), dec!(103), dec!(99.8), dec!(102.8))],
    );

    let trade = &engine.trades()[0];
    assert_eq!(trade.exit_reason, ExitReason::SignalExit);
    assert_eq!(trade.exit_price, dec!(102.8));
}

#[test]
fn short_position_mirrors_the_bracket() {
    let mut engine = engine(&config(), Scripted::new().enter(0, Direction::Short));
    feed(
        &mut engine,
        vec![calm(0, dec!(100)), bar(1, dec!(100), dec!(100.3), dec!(97), dec!(97.2))],
    );

    let trade = &engine.trades()[0];
    assert_eq!(trade.side, PositionSide::Short);
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_eq!(trade.exit_price, dec!(97.5));
    assert_eq!(trade.gross_pnl, dec!(200));
}

#[test]
fn the_entry_bar_is_not_checked_for_exits() {
    let mut engine = engine(&config(), Scripted::new().enter(0, Direction::Long));
    feed(&mut engine, vec![bar(0, dec!(104), dec!(106), dec!(90), dec!(100))]);

    assert_eq!(engine.phase(), Phase::Open);
    assert!(engine.trades().is_empty());
}

#[test]
fn malformed_and_out_of_order_bars_are_skipped() {
    let mut engine = engine(&config(), Scripted::new());
    let inputs = CycleInputs::default();

    assert!(engine.on_kline(calm(1, dec!(100)), &inputs).unwrap().is_some());
    assert!(engine.on_kline(calm(0, dec!(100)), &inputs).unwrap().is_none());
    assert!(engine.on_kline(calm(1, dec!(100)), &inputs).unwrap().is_none());
    let inverted = bar(2, dec!(100), dec!(99), dec!(101), dec!(100));
    assert!(engine.on_kline(inverted, &inputs).unwrap().is_none());

    assert_eq!(engine.equity_curve().len(), 2);
}

#[test]
fn warmup_bars_produce_no_decisions() {
    let mut config = config();
    config.simulation.warmup_bars = 2;
    let mut engine = engine(&config, Scripted::new().enter(1, Direction::Long).enter(2, Direction::Long));
    let inputs = CycleInputs::default();

    let first = engine.on_kline(calm(1, dec!(100)), &inputs).unwrap().unwrap();
    assert!(first.market_state.is_none());
    assert!(first.events.is_empty());
    engine.on_kline(calm(2, dec!(100)), &inputs).unwrap();
    assert_eq!(engine.phase(), Phase::Flat);
}

// ---===[ Rejections and permissions ]===---

#[test]
fn leverage_above_the_cap_rejects_the_signal() {
    let mut config = config();
    config.risk_management.leverage = dec!(12);
    let mut engine = engine(&config, Scripted::new().enter(0, Direction::Long));
    let events = feed(&mut engine, vec![calm(0, dec!(100))]);

    assert!(matches!(
        &events[..],
        [EngineEvent::SignalRejected { direction: Direction::Long, .. }]
    ));
    assert_eq!(engine.phase(), Phase::Flat);
    assert_eq!(engine.portfolio().balance(), dec!(10000));
}

#[test]
fn disabled_entries_keep_the_engine_flat() {
    let mut engine = engine(&config(), Scripted::new().enter(0, Direction::Long));
    let inputs = CycleInputs { allow_entries: false, ..CycleInputs::default() };
    let outcome = engine.on_kline(calm(0, dec!(100)), &inputs).unwrap().unwrap();

    assert!(outcome.events.is_empty());
    assert!(engine.position().is_none());
}

#[test]
fn degraded_cycles_still_honour_the_stop() {
    let mut engine = engine(&config(), Scripted::new().enter(0, Direction::Long));
    feed(&mut engine, vec![calm(0, dec!(100))]);
    let outcome = engine
        .on_kline(bar(1, dec!(99), dec!(99.2), dec!(97), dec!(97.5)), &CycleInputs::degraded())
        .unwrap()
        .unwrap();

    assert!(matches!(&outcome.events[..], [EngineEvent::PositionClosed { .. }]));
    assert_eq!(engine.trades()[0].exit_reason, ExitReason::StopLoss);
}

#[test]
fn loss_streak_pauses_entries_for_the_cooldown() {
    let mut config = config();
    config.risk_management.max_consecutive_losses = 2;
    config.risk_management.loss_cooldown_bars = 3;
    let strategy = Scripted::new()
        .enter(0, Direction::Long)
        .enter(1, Direction::Long)
        .enter(2, Direction::Long)
        .enter(3, Direction::Long)
        .enter(4, Direction::Long)
        .enter(5, Direction::Long);
    let mut engine = engine(&config, strategy);

    let events = feed(
        &mut engine,
        vec![
            calm(0, dec!(100)),
            bar(1, dec!(100), dec!(100.2), dec!(97.5), dec!(98)),
            bar(2, dec!(98), dec!(98.1), dec!(95), dec!(96)),
        ],
    );
    assert_eq!(engine.trades().len(), 2);
    assert!(engine.trades().iter().all(|t| t.exit_reason == ExitReason::StopLoss));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::EntriesHalted { timestamp, .. } if *timestamp == at(2))));
    assert_eq!(engine.phase(), Phase::Flat);

    feed(&mut engine, vec![calm(3, dec!(96)), calm(4, dec!(96))]);
    assert!(engine.position().is_none());
    assert_eq!(engine.cooldown_remaining(), 0);

    feed(&mut engine, vec![calm(5, dec!(96))]);
    assert_eq!(engine.position().map(|p| p.open_timestamp), Some(at(5)));
}

#[test]
fn break_even_trades_extend_the_loss_streak() {
    let mut config = config();
    config.simulation.fee_rate = Decimal::ZERO;
    config.simulation.slippage_rate = Decimal::ZERO;
    config.risk_management.max_consecutive_losses = 2;
    config.risk_management.loss_cooldown_bars = 3;
    let strategy = Scripted::new()
        .enter(0, Direction::Long)
        .exit(1)
        .enter(1, Direction::Long)
        .exit(2);
    let mut engine = engine(&config, strategy);

    let events = feed(&mut engine, vec![calm(0, dec!(100)), calm(1, dec!(100)), calm(2, dec!(100))]);

    assert_eq!(engine.trades().len(), 2);
    assert!(engine.trades().iter().all(|t| t.realized_pnl.is_zero() && !t.is_win()));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::EntriesHalted { timestamp, .. } if *timestamp == at(2))));
    assert_eq!(engine.cooldown_remaining(), 2);
}

// ---===[ Regime adaptation ]===---

#[test]
fn confirmed_regime_parameters_take_over_while_flat() {
    let mut config = config();
    config.adaptation.confirmation_bars = 2;
    config.adaptation.switch_cooldown_bars = 0;
    // The neutral classifier reports ranging on every bar.
    let ranging = Scripted::new().enter(0, Direction::Long).enter(3, Direction::Long);
    let adaptation = RegimeAdaptation::new(
        BTreeMap::from([(Regime::Ranging, ranging.boxed())]),
        config.adaptation.clone(),
    );
    let mut engine = engine(&config, Scripted::new()).with_adaptation(adaptation);

    let events = feed(&mut engine, (0..3).map(|h| calm(h, dec!(100))).collect());
    assert!(matches!(
        &events[..],
        [EngineEvent::StrategySwitched { timestamp, from: None, to: Some(Regime::Ranging) }]
            if *timestamp == at(1)
    ));
    // The hour-0 entry belonged to parameters that were not active yet.
    assert!(engine.position().is_none());
    assert_eq!(engine.active_regime(), Some(Regime::Ranging));

    let events = feed(&mut engine, vec![calm(3, dec!(100))]);
    assert!(matches!(&events[..], [EngineEvent::PositionOpened { .. }]));
    assert_eq!(engine.position().map(|p| p.open_timestamp), Some(at(3)));
}

// ---===[ Protection orbit ]===---

fn rising(hour: i64, open: Decimal, close: Decimal) -> Kline {
    bar(hour, open, open.max(close) + dec!(0.2), open.min(close) - dec!(0.3), close)
}

#[test]
fn protection_orbits_and_locks_in_profit() {
    let mut engine = engine(&config(), Scripted::new().enter(0, Direction::Long));
    feed(&mut engine, vec![calm(0, dec!(100))]);

    // One hour in at +0.5%: the aggressive level takes over.
    let events = feed(&mut engine, vec![rising(1, dec!(100), dec!(100.5))]);
    let protection = &engine.position().unwrap().protection;
    assert_eq!(protection.level, "aggressive");
    assert_eq!(protection.current_stop_loss, dec!(99.2));
    assert_eq!(protection.current_take_profit, dec!(101.5));
    assert!(matches!(&events[..], [EngineEvent::ProtectionUpdated { .. }]));

    // At +1% the first lock tier pins the stop at 40% of the move.
    feed(&mut engine, vec![rising(2, dec!(100.5), dec!(101))]);
    let protection = &engine.position().unwrap().protection;
    assert_eq!(protection.current_stop_loss, dec!(100.4));
    assert_eq!(protection.lock_ratio_applied, Some(dec!(0.4)));

    feed(&mut engine, vec![rising(3, dec!(101), dec!(101.5))]);
    let trade = &engine.trades()[0];
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_eq!(trade.exit_price, dec!(101.5));
    assert_eq!(trade.realized_pnl, dec!(95.82));
}

#[test]
fn held_protection_is_not_updated_in_degraded_cycles() {
    let mut engine = engine(&config(), Scripted::new().enter(0, Direction::Long));
    feed(&mut engine, vec![calm(0, dec!(100))]);
    let outcome = engine
        .on_kline(rising(1, dec!(100), dec!(100.5)), &CycleInputs::degraded())
        .unwrap()
        .unwrap();

    assert!(outcome.events.is_empty());
    assert_eq!(engine.position().unwrap().protection.current_stop_loss, dec!(98));
}

/// Delegates to the real manager but reports a broken ratchet on every update.
struct Faulty(OrbitRiskManager);

impl RiskManager for Faulty {
    fn size_position(
        &self,
        signal: &StrategySignal,
        context: &MarketContext<'_>,
    ) -> Result<PositionSizing, RiskError> {
        self.0.size_position(signal, context)
    }

    fn initial_protection(
        &self,
        signal: &StrategySignal,
        market_state: &MarketState,
        opened_at: DateTime<Utc>,
    ) -> Result<ProtectionState, RiskError> {
        self.0.initial_protection(signal, market_state, opened_at)
    }

    fn update_protection(
        &self,
        position: &Position,
        _mark: Decimal,
        _now: DateTime<Utc>,
    ) -> Result<Option<ProtectionState>, RiskError> {
        Err(RiskError::InvariantViolation {
            side: position.side,
            detail: "stop loosened after lock-in".to_string(),
        })
    }

    fn check_exit(&self, position: &Position, kline: &Kline) -> Option<ExitTrigger> {
        self.0.check_exit(position, kline)
    }
}

#[test]
fn an_invariant_violation_aborts_the_cycle_and_keeps_the_position() {
    let config = config();
    let manager = OrbitRiskManager::new(
        config.risk_management.clone(),
        ContractSpec::from_simulation(&config.simulation),
    )
    .unwrap();
    let executor = SimulatedExecutor::new(&config.simulation).unwrap();
    let mut engine = ExecutionEngine::with_components(
        &config,
        SYMBOL,
        Scripted::new().enter(0, Direction::Long).boxed(),
        Box::new(Faulty(manager)),
        Box::new(executor),
    );
    feed(&mut engine, vec![calm(0, dec!(100))]);

    let result = engine.on_kline(calm(1, dec!(100.5)), &CycleInputs::default());
    assert!(matches!(result, Err(EngineError::Invariant(_))));
    assert_eq!(engine.phase(), Phase::Open);
    assert!(engine.position().is_some());
}

// ---===[ Forced close ]===---

#[test]
fn force_close_books_a_forced_trade_and_restates_equity() {
    let mut engine = engine(&config(), Scripted::new().enter(0, Direction::Long));
    feed(&mut engine, vec![calm(0, dec!(100)), calm(1, dec!(101))]);
    let points = engine.equity_curve().len();

    let trade = engine.force_close(dec!(101), at(1)).unwrap().unwrap();
    assert_eq!(trade.exit_reason, ExitReason::Forced);
    assert_eq!(engine.phase(), Phase::Flat);
    assert_eq!(engine.equity_curve().len(), points);
    assert_eq!(engine.equity_curve().last().unwrap().equity, engine.portfolio().balance());
}

#[test]
fn force_close_when_flat_is_a_no_op() {
    let mut engine = engine(&config(), Scripted::new());
    assert!(engine.force_close(dec!(100), at(0)).unwrap().is_none());
    let (trades, curve) = engine.into_results();
    assert!(trades.is_empty());
    assert!(curve.is_empty());
}

mod support;

use configuration::Config;
use core_types::{Direction, EquityPoint, Kline, StrategyId, Trade};
use engine::{CycleInputs, ExecutionEngine};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use strategies::create_strategy;
use support::{Scripted, bar};

fn wave(len: usize) -> Vec<Kline> {
    (0..len)
        .map(|i| {
            let t = i as f64;
            let mid = 100.0 + 8.0 * (t / 18.0).sin() + 0.02 * t;
            let close = Decimal::from_f64(mid).unwrap().round_dp(2);
            let open = Decimal::from_f64(mid - 0.3 * (t / 5.0).cos()).unwrap().round_dp(2);
            let high = open.max(close) + dec!(0.4);
            let low = open.min(close) - dec!(0.4);
            bar(i as i64, open, high, low, close)
        })
        .collect()
}

fn replay(config: &Config, klines: &[Kline]) -> (Vec<Trade>, Vec<EquityPoint>) {
    let strategy = create_strategy(StrategyId::MaCrossover, config).unwrap();
    let mut engine = ExecutionEngine::new(config, "BTC-USDT-SWAP", strategy).unwrap();
    for kline in klines {
        engine.on_kline(kline.clone(), &CycleInputs::default()).unwrap();
    }
    if let Some(last) = klines.last() {
        engine.force_close(last.close, last.timestamp).unwrap();
    }
    engine.into_results()
}

#[test]
fn replaying_the_same_bars_is_deterministic() {
    let config = Config::default();
    let klines = wave(600);

    let first = replay(&config, &klines);
    let second = replay(&config, &klines);

    assert_eq!(first, second);
    assert_eq!(first.1.len(), klines.len() + 1);
}

#[test]
fn ledger_reconciles_with_the_final_equity() {
    let config = Config::default();
    let (trades, curve) = replay(&config, &wave(600));

    let realized: Decimal = trades.iter().map(|t| t.realized_pnl).sum();
    let final_equity = curve.last().unwrap().equity;
    assert_eq!(final_equity, config.simulation.initial_capital + realized);
    for trade in &trades {
        assert_eq!(trade.realized_pnl, trade.gross_pnl - trade.fee_paid - trade.slippage_cost);
    }
}

// ── Generators ──

fn arb_path() -> impl Strategy<Value = Vec<Kline>> {
    prop::collection::vec((-150i64..=150, 1i64..=80, 1i64..=80), 20..80).prop_map(|steps| {
        let mut close = dec!(100);
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (step, up, down))| {
                let open = close;
                close = (open * (Decimal::ONE + Decimal::new(step, 4))).round_dp(4);
                let high = open.max(close) * (Decimal::ONE + Decimal::new(up, 4));
                let low = open.min(close) * (Decimal::ONE - Decimal::new(down, 4));
                bar(i as i64, open, high, low, close)
            })
            .collect()
    })
}

// ── Properties ──

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn balance_is_initial_capital_plus_realized_pnl(klines in arb_path()) {
        let config = support::config();
        let strategy = (0..klines.len() as i64)
            .step_by(4)
            .fold(Scripted::new(), |s, hour| {
                let direction = if hour % 8 == 0 { Direction::Long } else { Direction::Short };
                s.enter(hour, direction)
            });
        let mut engine = ExecutionEngine::new(&config, "BTC-USDT-SWAP", strategy.boxed()).unwrap();
        for kline in &klines {
            engine.on_kline(kline.clone(), &CycleInputs::default()).unwrap();
        }
        let last = klines.last().unwrap();
        engine.force_close(last.close, last.timestamp).unwrap();

        let realized: Decimal = engine.trades().iter().map(|t| t.realized_pnl).sum();
        prop_assert_eq!(engine.portfolio().balance(), config.simulation.initial_capital + realized);
        prop_assert_eq!(engine.equity_curve().len(), klines.len() + 1);
        prop_assert!(engine.position().is_none());
        for pair in engine.trades().windows(2) {
            prop_assert!(pair[0].exit_timestamp <= pair[1].entry_timestamp);
        }
    }
}

use crate::error::RiskError;
use configuration::RiskManagement;
use core_types::{Advisory, MarketContext, StrategySignal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Advisory confidence from which an opposing bias scales the size down.
const ADVISORY_CONFLICT_CONFIDENCE: f64 = 0.5;

/// Exchange contract terms a size is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// Base-asset quantity per contract (0.01 BTC for a BTC perpetual).
    pub contract_value: Decimal,
    /// Smallest tradable increment, in contracts.
    pub lot_size: Decimal,
}

impl ContractSpec {
    pub fn from_simulation(simulation: &configuration::Simulation) -> Self {
        Self { contract_value: simulation.contract_value, lot_size: simulation.lot_size }
    }
}

/// Which of the three sizing bounds was the smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCap {
    Risk,
    Leverage,
    Utilization,
}

/// The outcome of sizing one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSizing {
    /// Contracts, a whole number of lots.
    pub size: Decimal,
    pub leverage: Decimal,
    pub notional: Decimal,
    pub margin: Decimal,
    /// Loss at the signal's stop, before costs.
    pub risk_amount: Decimal,
    pub binding_cap: SizeCap,
    /// Product of the size fraction, regime multiplier and advisory scale.
    pub scale: Decimal,
}

/// `size = min(risk / stop_distance, leverage cap, utilization cap)` in contracts,
/// then scaled and floored to whole lots.
pub(crate) fn size_position(
    params: &RiskManagement,
    contract: &ContractSpec,
    signal: &StrategySignal,
    context: &MarketContext<'_>,
) -> Result<PositionSizing, RiskError> {
    // --- 1. Validation ---
    let entry = signal.entry_price;
    let equity = context.equity;
    if entry <= Decimal::ZERO {
        return Err(RiskError::InvalidEntryPrice(entry));
    }
    if equity <= Decimal::ZERO {
        return Err(RiskError::InsufficientEquity(equity));
    }
    if params.leverage > params.max_leverage {
        return Err(RiskError::LeverageCapExceeded {
            effective: params.leverage,
            max: params.max_leverage,
        });
    }
    let stop_distance = (entry - signal.stop_loss).abs();
    if stop_distance.is_zero() {
        return Err(RiskError::ZeroStopDistance { entry, stop_loss: signal.stop_loss });
    }

    // --- 2. The three bounds, in contracts ---
    let cv = contract.contract_value;
    let per_contract_notional = entry * cv;
    let risk_fraction = match params.max_position_drawdown {
        Some(cap) => params.base_risk_per_trade.min(cap),
        None => params.base_risk_per_trade,
    };
    let risk_size = risk_fraction * equity / (stop_distance * cv);
    let leverage_cap = equity * params.max_leverage / per_contract_notional;
    let utilization_cap =
        params.max_capital_utilization * equity * params.leverage / per_contract_notional;

    let (raw, binding_cap) = [
        (risk_size, SizeCap::Risk),
        (leverage_cap, SizeCap::Leverage),
        (utilization_cap, SizeCap::Utilization),
    ]
    .into_iter()
    .fold((Decimal::MAX, SizeCap::Risk), |best, candidate| {
        if candidate.0 < best.0 { candidate } else { best }
    });

    // --- 3. Scaling ---
    let scale = signal.size_fraction
        * params.regime_size_multipliers.for_regime(context.market_state.regime)
        * advisory_scale(params, signal, context.advisory);
    let size = floor_to_lot(raw * scale, contract.lot_size);
    if size <= Decimal::ZERO {
        return Err(RiskError::PositionTooSmall { size, lot_size: contract.lot_size });
    }

    // --- 4. Cap checks on the final size ---
    let notional = size * per_contract_notional;
    let margin = notional / params.leverage;
    let effective = notional / equity;
    if effective > params.max_leverage {
        return Err(RiskError::LeverageCapExceeded { effective, max: params.max_leverage });
    }
    if margin > params.max_capital_utilization * equity {
        return Err(RiskError::UtilizationCapExceeded {
            margin,
            equity,
            max_utilization: params.max_capital_utilization,
        });
    }

    Ok(PositionSizing {
        size,
        leverage: params.leverage,
        notional,
        margin,
        risk_amount: size * stop_distance * cv,
        binding_cap,
        scale,
    })
}

/// Scales the size down when a confident advisory disagrees with the signal.
/// An advisory never creates or blocks a trade.
fn advisory_scale(
    params: &RiskManagement,
    signal: &StrategySignal,
    advisory: Option<&Advisory>,
) -> Decimal {
    let Some(advisory) = advisory else {
        return Decimal::ONE;
    };
    let opposed = match (signal.direction.side(), advisory.bias.side()) {
        (Some(signal_side), Some(bias_side)) => signal_side == bias_side.opposite(),
        _ => false,
    };
    if opposed && advisory.confidence >= ADVISORY_CONFLICT_CONFIDENCE {
        tracing::debug!(bias = ?advisory.bias, confidence = advisory.confidence, "Advisory opposes the signal; scaling size");
        return params.advisory_conflict_scale;
    }
    Decimal::ONE
}

fn floor_to_lot(size: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size <= Decimal::ZERO {
        return size;
    }
    (size / lot_size).floor() * lot_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Direction, MarketState, Regime};
    use rust_decimal_macros::dec;

    fn contract() -> ContractSpec {
        ContractSpec { contract_value: dec!(0.01), lot_size: dec!(0.01) }
    }

    fn trending() -> MarketState {
        MarketState { regime: Regime::Trending, ..MarketState::default() }
    }

    fn ctx<'a>(state: &'a MarketState, advisory: Option<&'a Advisory>) -> MarketContext<'a> {
        MarketContext {
            symbol: "BTC-USDT-SWAP",
            klines: &[],
            equity: dec!(10000),
            position: None,
            market_state: state,
            advisory,
        }
    }

    #[test]
    fn risk_bound_sizes_a_wide_stop() {
        // Risk 200 over a 3000 stop on 0.01 BTC contracts: 6.66 contracts.
        let signal = StrategySignal::long(dec!(90000), dec!(87000), dec!(93750));
        let state = trending();
        let sizing = size_position(&RiskManagement::default(), &contract(), &signal, &ctx(&state, None)).unwrap();
        assert_eq!(sizing.binding_cap, SizeCap::Risk);
        assert_eq!(sizing.size, dec!(6.66));
        assert_eq!(sizing.notional, dec!(5994));
        assert_eq!(sizing.margin, dec!(999));
        assert_eq!(sizing.risk_amount, dec!(199.8));
    }

    #[test]
    fn max_position_drawdown_caps_the_risk_budget() {
        // 5% risk asked, 3% allowed: 300 over a 3000 stop is 10 contracts.
        let params = RiskManagement { base_risk_per_trade: dec!(0.05), ..RiskManagement::default() };
        let signal = StrategySignal::long(dec!(90000), dec!(87000), dec!(93750));
        let state = trending();
        let sizing = size_position(&params, &contract(), &signal, &ctx(&state, None)).unwrap();
        assert_eq!(sizing.binding_cap, SizeCap::Risk);
        assert_eq!(sizing.size, dec!(10));
        assert_eq!(sizing.risk_amount, dec!(300));

        let uncapped = RiskManagement { max_position_drawdown: None, ..params };
        let sizing = size_position(&uncapped, &contract(), &signal, &ctx(&state, None)).unwrap();
        assert_eq!(sizing.size, dec!(16.66));
    }

    #[test]
    fn utilization_caps_a_tight_stop() {
        // A 90 stop would allow 222 contracts; 0.6 * 10000 * 6 / 900 = 40 is the cap.
        let signal = StrategySignal::long(dec!(90000), dec!(89910), dec!(90500));
        let state = trending();
        let sizing = size_position(&RiskManagement::default(), &contract(), &signal, &ctx(&state, None)).unwrap();
        assert_eq!(sizing.binding_cap, SizeCap::Utilization);
        assert_eq!(sizing.size, dec!(40));
        assert_eq!(sizing.margin, dec!(6000));
    }

    #[test]
    fn configured_leverage_above_the_cap_is_rejected() {
        let params = RiskManagement { leverage: dec!(20), ..RiskManagement::default() };
        let signal = StrategySignal::long(dec!(100), dec!(95), dec!(110));
        let state = trending();
        let err = size_position(&params, &contract(), &signal, &ctx(&state, None)).unwrap_err();
        assert!(matches!(err, RiskError::LeverageCapExceeded { .. }));
        assert!(err.is_sizing_rejection());
    }

    #[test]
    fn regime_and_advisory_scale_the_size() {
        let signal = StrategySignal::long(dec!(90000), dec!(87000), dec!(93750));
        let volatile = MarketState { regime: Regime::Volatile, ..MarketState::default() };
        let advisory = Advisory { bias: Direction::Short, confidence: 0.8, risk_notes: vec![] };
        let sizing = size_position(
            &RiskManagement::default(),
            &contract(),
            &signal,
            &ctx(&volatile, Some(&advisory)),
        )
        .unwrap();
        assert_eq!(sizing.scale, dec!(0.25));
        assert_eq!(sizing.size, dec!(1.66));

        // A weak or agreeing advisory changes nothing.
        let weak = Advisory { bias: Direction::Short, confidence: 0.3, risk_notes: vec![] };
        let agreeing = Advisory { bias: Direction::Long, confidence: 0.9, risk_notes: vec![] };
        for advisory in [weak, agreeing] {
            let state = trending();
            let sizing = size_position(&RiskManagement::default(), &contract(), &signal, &ctx(&state, Some(&advisory))).unwrap();
            assert_eq!(sizing.scale, Decimal::ONE);
        }
    }

    #[test]
    fn dust_is_rejected() {
        let signal = StrategySignal::long(dec!(90000), dec!(87000), dec!(93750)).with_size_fraction(dec!(0.001));
        let state = trending();
        let err = size_position(&RiskManagement::default(), &contract(), &signal, &ctx(&state, None)).unwrap_err();
        assert!(matches!(err, RiskError::PositionTooSmall { .. }));
    }

    #[test]
    fn non_positive_equity_is_rejected() {
        let signal = StrategySignal::long(dec!(100), dec!(95), dec!(110));
        let state = trending();
        let mut context = ctx(&state, None);
        context.equity = Decimal::ZERO;
        assert!(matches!(
            size_position(&RiskManagement::default(), &contract(), &signal, &context),
            Err(RiskError::InsufficientEquity(_))
        ));
    }
}

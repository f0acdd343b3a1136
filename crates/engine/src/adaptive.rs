//! Regime-driven strategy parameters.
//!
//! An optimization run yields one parameter set per regime. `RegimeAdaptation`
//! holds a strategy built from each of them and decides, bar by bar, which one the
//! engine trades. A regime has to be classified on `confirmation_bars` decision
//! bars in a row before its parameters take over, consecutive switches are at least
//! `switch_cooldown_bars` apart, and a switch only happens while the engine is flat:
//! an open position is always managed by the strategy that opened it.

use crate::error::EngineError;
use configuration::{AdaptationConfig, Config, ParameterSet};
use core_types::{Regime, StrategyId};
use std::collections::BTreeMap;
use strategies::{Strategy, create_strategy};

/// A switch between parameter sets. `None` is the base set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeSwitch {
    pub from: Option<Regime>,
    pub to: Option<Regime>,
}

/// The confirmation and cooldown bookkeeping, independent of what is switched.
#[derive(Debug, Clone, PartialEq)]
struct Switcher {
    settings: AdaptationConfig,
    active: Option<Regime>,
    streak: Option<(Regime, usize)>,
    bars_since_switch: usize,
}

impl Switcher {
    fn new(settings: AdaptationConfig) -> Self {
        // The first switch only waits for confirmation.
        let bars_since_switch = settings.switch_cooldown_bars;
        Self { settings, active: None, streak: None, bars_since_switch }
    }

    /// Records one decision bar. `target` is where `regime` maps to: itself when it
    /// has its own parameters, `None` otherwise.
    fn observe(&mut self, regime: Regime, target: Option<Regime>, flat: bool) -> Option<RegimeSwitch> {
        self.bars_since_switch = self.bars_since_switch.saturating_add(1);
        let count = match self.streak {
            Some((current, count)) if current == regime => count + 1,
            _ => 1,
        };
        self.streak = Some((regime, count));

        if target == self.active
            || !flat
            || count < self.settings.confirmation_bars
            || self.bars_since_switch < self.settings.switch_cooldown_bars
        {
            return None;
        }
        let switch = RegimeSwitch { from: self.active, to: target };
        self.active = target;
        self.bars_since_switch = 0;
        Some(switch)
    }
}

pub struct RegimeAdaptation {
    switcher: Switcher,
    strategies: BTreeMap<Regime, Box<dyn Strategy>>,
}

impl RegimeAdaptation {
    pub fn new(strategies: BTreeMap<Regime, Box<dyn Strategy>>, settings: AdaptationConfig) -> Self {
        Self { switcher: Switcher::new(settings), strategies }
    }

    /// Builds one `strategy` per regime by overriding `config` with that regime's
    /// parameters. A set that does not apply fails here, before any bar is seen.
    pub fn from_parameters(
        config: &Config,
        strategy: StrategyId,
        parameters: &BTreeMap<Regime, ParameterSet>,
    ) -> Result<Self, EngineError> {
        let mut strategies = BTreeMap::new();
        for (regime, set) in parameters {
            let tuned = config
                .with_overrides(strategy, set)
                .map_err(|e| EngineError::Configuration(format!("{regime} parameters: {e}")))?;
            let built = create_strategy(strategy, &tuned)
                .map_err(|e| EngineError::Configuration(format!("{regime} parameters: {e}")))?;
            strategies.insert(*regime, built);
        }
        tracing::info!(
            strategy = %strategy,
            regimes = ?strategies.keys().collect::<Vec<_>>(),
            confirmation_bars = config.adaptation.confirmation_bars,
            switch_cooldown_bars = config.adaptation.switch_cooldown_bars,
            "Regime adaptation enabled"
        );
        Ok(Self::new(strategies, config.adaptation.clone()))
    }

    /// The regime whose parameters are in use, `None` for the base set.
    pub fn active(&self) -> Option<Regime> {
        self.switcher.active
    }

    /// The strategy to trade, or `None` when the base strategy applies.
    pub fn active_strategy(&self) -> Option<&dyn Strategy> {
        self.switcher.active.and_then(|regime| self.strategies.get(&regime)).map(|s| s.as_ref())
    }

    /// Records the regime of a decision bar and switches when it is confirmed.
    pub fn observe(&mut self, regime: Regime, flat: bool) -> Option<RegimeSwitch> {
        let target = self.strategies.contains_key(&regime).then_some(regime);
        self.switcher.observe(regime, target, flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn switcher(confirmation_bars: usize, switch_cooldown_bars: usize) -> Switcher {
        Switcher::new(AdaptationConfig { confirmation_bars, switch_cooldown_bars })
    }

    #[test]
    fn a_regime_must_be_confirmed_before_switching() {
        let mut s = switcher(3, 0);
        let t = Some(Regime::Trending);
        assert_eq!(s.observe(Regime::Trending, t, true), None);
        assert_eq!(s.observe(Regime::Trending, t, true), None);
        assert_eq!(s.observe(Regime::Trending, t, true), Some(RegimeSwitch { from: None, to: t }));
        assert_eq!(s.active, t);

        // An interruption restarts the count.
        let r = Some(Regime::Ranging);
        assert_eq!(s.observe(Regime::Ranging, r, true), None);
        assert_eq!(s.observe(Regime::Trending, t, true), None);
        assert_eq!(s.observe(Regime::Ranging, r, true), None);
        assert_eq!(s.observe(Regime::Ranging, r, true), None);
        assert_eq!(s.observe(Regime::Ranging, r, true), Some(RegimeSwitch { from: t, to: r }));
    }

    #[test]
    fn switches_respect_the_cooldown_and_wait_for_flat() {
        let mut s = switcher(1, 3);
        let t = Some(Regime::Trending);
        let v = Some(Regime::Volatile);
        assert!(s.observe(Regime::Trending, t, true).is_some());

        assert_eq!(s.observe(Regime::Volatile, v, true), None);
        assert_eq!(s.observe(Regime::Volatile, v, true), None);
        assert_eq!(s.observe(Regime::Volatile, v, false), None);
        assert_eq!(s.observe(Regime::Volatile, v, true), Some(RegimeSwitch { from: t, to: v }));
    }

    #[test]
    fn a_regime_without_parameters_falls_back_to_the_base_set() {
        let mut s = switcher(1, 0);
        assert!(s.observe(Regime::Trending, Some(Regime::Trending), true).is_some());
        assert_eq!(
            s.observe(Regime::Volatile, None, true),
            Some(RegimeSwitch { from: Some(Regime::Trending), to: None })
        );
        assert_eq!(s.observe(Regime::Volatile, None, true), None);
    }

    #[test]
    fn parameter_sets_are_applied_at_construction() {
        let config = Config::default();
        let good = BTreeMap::from([(
            Regime::Trending,
            ParameterSet::from([("ma_fast_period".to_string(), json!(5))]),
        )]);
        let adaptation = RegimeAdaptation::from_parameters(&config, StrategyId::MaCrossover, &good).unwrap();
        assert_eq!(adaptation.active(), None);
        assert!(adaptation.active_strategy().is_none());

        let bad = BTreeMap::from([(
            Regime::Ranging,
            ParameterSet::from([("no_such_knob".to_string(), json!(1))]),
        )]);
        assert!(matches!(
            RegimeAdaptation::from_parameters(&config, StrategyId::MaCrossover, &bad),
            Err(EngineError::Configuration(_))
        ));
    }
}

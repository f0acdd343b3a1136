use crate::error::ConfigError;
use core_types::{Regime, StrategyId, VolatilityLevel};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
///
/// Every section falls back to its `Default` when omitted, so an empty
/// `config.toml` yields the reference parameter set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub simulation: Simulation,
    pub risk_management: RiskManagement,
    pub classifier: ClassifierParams,
    pub strategies: Strategies,
    pub adaptation: AdaptationConfig,
    pub live: LiveConfig,
    pub logging: LoggingConfig,
}

/// Contains parameters for the backtesting and simulation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Simulation {
    /// The starting equity of a simulated account, in quote currency.
    pub initial_capital: Decimal,
    /// Fee charged on the notional of each leg. 0.001 corresponds to 0.1%.
    pub fee_rate: Decimal,
    /// Slippage cost charged on the notional of each leg.
    pub slippage_rate: Decimal,
    /// Base-asset quantity represented by one contract (0.01 BTC for a BTC perpetual).
    pub contract_value: Decimal,
    /// Smallest tradable increment, in contracts.
    pub lot_size: Decimal,
    /// Number of bars in a year, used to annualize the Sharpe ratio.
    pub periods_per_year: u32,
    /// Bars consumed before the first decision cycle.
    pub warmup_bars: usize,
    /// Number of trailing bars handed to strategies and the classifier.
    pub history_window: usize,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            initial_capital: dec!(10000),
            fee_rate: dec!(0.001),
            slippage_rate: dec!(0.0005),
            contract_value: dec!(0.01),
            lot_size: dec!(0.01),
            periods_per_year: 8760,
            warmup_bars: 50,
            history_window: 200,
        }
    }
}

/// Stop-loss and take-profit distances expressed in ATRs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtrMultipliers {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Initial protection multipliers keyed by the classified volatility level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtrTierTable {
    pub high: AtrMultipliers,
    pub medium: AtrMultipliers,
    pub low: AtrMultipliers,
}

impl AtrTierTable {
    pub fn for_level(&self, level: VolatilityLevel) -> &AtrMultipliers {
        match level {
            VolatilityLevel::High => &self.high,
            VolatilityLevel::Medium => &self.medium,
            VolatilityLevel::Low => &self.low,
        }
    }
}

impl Default for AtrTierTable {
    fn default() -> Self {
        Self {
            high: AtrMultipliers { stop_loss: dec!(2.5), take_profit: dec!(3.0) },
            medium: AtrMultipliers { stop_loss: dec!(2.0), take_profit: dec!(2.5) },
            low: AtrMultipliers { stop_loss: dec!(1.8), take_profit: dec!(2.2) },
        }
    }
}

/// One row of the protection orbit table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionLevelConfig {
    pub name: String,
    /// Minimum holding time before this level can take over.
    #[serde(with = "humantime_serde")]
    pub activation_time: Duration,
    pub stop_loss_multiplier: Decimal,
    pub take_profit_multiplier: Decimal,
    /// Minimum favourable move (0.002 = 0.2%) before this level can take over.
    pub min_profit_required: Decimal,
}

/// A lock-in tier: from `min_profit` upwards, lock `lock_ratio` of the gained distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockTier {
    pub min_profit: Decimal,
    pub lock_ratio: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeMultipliers {
    pub trending: Decimal,
    pub ranging: Decimal,
    pub volatile: Decimal,
}

impl RegimeMultipliers {
    pub fn for_regime(&self, regime: Regime) -> Decimal {
        match regime {
            Regime::Trending => self.trending,
            Regime::Ranging => self.ranging,
            Regime::Volatile => self.volatile,
        }
    }
}

impl Default for RegimeMultipliers {
    fn default() -> Self {
        Self { trending: dec!(1.0), ranging: dec!(0.8), volatile: dec!(0.5) }
    }
}

/// Contains parameters for trade-level risk management and the protection orbit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskManagement {
    /// The fraction of equity to lose if the initial stop is hit (0.02 for 2%).
    pub base_risk_per_trade: Decimal,
    /// Leverage applied to new positions.
    pub leverage: Decimal,
    pub max_leverage: Decimal,
    /// Maximum share of equity that may be committed as margin.
    pub max_capital_utilization: Decimal,
    /// Upper bound on `base_risk_per_trade` (0.03 = 3% of equity lost at the stop).
    /// `None` leaves the risk budget uncapped.
    pub max_position_drawdown: Option<Decimal>,
    pub atr_tiers: AtrTierTable,
    /// Ordered by `activation_time`; the first row is the level in force at open.
    pub protection_levels: Vec<ProtectionLevelConfig>,
    pub lock_stop_loss_profit_threshold: Decimal,
    /// Ordered by `min_profit`.
    pub lock_tiers: Vec<LockTier>,
    #[serde(with = "humantime_serde")]
    pub orbit_update_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub orbit_min_trigger_time: Duration,
    /// Relative price change (of entry) below which an orbit update is a no-op.
    pub min_update_delta: Decimal,
    pub regime_size_multipliers: RegimeMultipliers,
    /// Size scale applied when the advisory bias opposes the signal.
    pub advisory_conflict_scale: Decimal,
    pub max_consecutive_losses: u32,
    pub loss_cooldown_bars: usize,
}

impl Default for RiskManagement {
    fn default() -> Self {
        Self {
            base_risk_per_trade: dec!(0.02),
            leverage: dec!(6),
            max_leverage: dec!(10),
            max_capital_utilization: dec!(0.60),
            max_position_drawdown: Some(dec!(0.03)),
            atr_tiers: AtrTierTable::default(),
            protection_levels: vec![
                ProtectionLevelConfig {
                    name: "defensive".to_string(),
                    activation_time: Duration::ZERO,
                    stop_loss_multiplier: dec!(2.0),
                    take_profit_multiplier: dec!(2.5),
                    min_profit_required: dec!(0),
                },
                ProtectionLevelConfig {
                    name: "balanced".to_string(),
                    activation_time: Duration::from_secs(1800),
                    stop_loss_multiplier: dec!(1.5),
                    take_profit_multiplier: dec!(2.5),
                    min_profit_required: dec!(0.002),
                },
                ProtectionLevelConfig {
                    name: "aggressive".to_string(),
                    activation_time: Duration::from_secs(3600),
                    stop_loss_multiplier: dec!(0.8),
                    take_profit_multiplier: dec!(1.5),
                    min_profit_required: dec!(0.005),
                },
            ],
            lock_stop_loss_profit_threshold: dec!(0.008),
            lock_tiers: vec![
                LockTier { min_profit: dec!(0.008), lock_ratio: dec!(0.4) },
                LockTier { min_profit: dec!(0.015), lock_ratio: dec!(0.5) },
                LockTier { min_profit: dec!(0.025), lock_ratio: dec!(0.6) },
            ],
            orbit_update_interval: Duration::from_secs(120),
            orbit_min_trigger_time: Duration::from_secs(180),
            min_update_delta: dec!(0.002),
            regime_size_multipliers: RegimeMultipliers::default(),
            advisory_conflict_scale: dec!(0.5),
            max_consecutive_losses: 4,
            loss_cooldown_bars: 12,
        }
    }
}

/// Parameters of the market state classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierParams {
    /// Trailing bars considered per classification.
    pub window: usize,
    /// Below this many bars the neutral default state is reported.
    pub min_bars: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub band_period: usize,
    pub band_std_dev: f64,
    pub ma_fast: usize,
    pub ma_slow: usize,
    pub volume_period: usize,
    pub atr_pct_low: f64,
    pub atr_pct_high: f64,
    /// ADX value mapped to a full-strength trend reading.
    pub adx_normalizer: f64,
    pub trending_threshold: f64,
    pub weak_trend_threshold: f64,
    pub volume_low: f64,
    pub volume_high: f64,
    /// Bars a band breach has to return inside the band.
    pub reentry_lookahead: usize,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            window: 100,
            min_bars: 50,
            atr_period: 14,
            adx_period: 14,
            band_period: 20,
            band_std_dev: 2.0,
            ma_fast: 20,
            ma_slow: 50,
            volume_period: 20,
            atr_pct_low: 0.005,
            atr_pct_high: 0.02,
            adx_normalizer: 50.0,
            trending_threshold: 0.6,
            weak_trend_threshold: 0.4,
            volume_low: 0.8,
            volume_high: 1.5,
            reentry_lookahead: 3,
        }
    }
}

/// Contains the parameter sets for all available strategies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Strategies {
    pub bracket: BracketParams,
    pub ma_crossover: MACrossoverParams,
    pub super_trend: SuperTrendParams,
    pub prob_reversion: ProbReversionParams,
    pub momentum: MomentumParams,
    pub breakout: BreakoutParams,
    pub grid: GridParams,
}

/// How every strategy brackets its own signal before the risk manager takes over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BracketParams {
    pub atr_period: usize,
    pub stop_atr_multiple: f64,
    pub take_profit_atr_multiple: f64,
}

impl Default for BracketParams {
    fn default() -> Self {
        Self { atr_period: 14, stop_atr_multiple: 2.0, take_profit_atr_multiple: 3.0 }
    }
}

/// Parameters for the Triple Moving Average Crossover strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MACrossoverParams {
    pub ma_fast_period: usize,
    pub ma_slow_period: usize,
    /// A long-term MA to act as a trend filter.
    pub trend_filter_period: usize,
}

impl Default for MACrossoverParams {
    fn default() -> Self {
        Self { ma_fast_period: 10, ma_slow_period: 30, trend_filter_period: 100 }
    }
}

/// Parameters for the SuperTrend strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperTrendParams {
    pub atr_period: usize,
    pub atr_multiplier: f64,
}

impl Default for SuperTrendParams {
    fn default() -> Self {
        Self { atr_period: 10, atr_multiplier: 3.0 }
    }
}

/// Parameters for the multi-factor Probabilistic Mean Reversion strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbReversionParams {
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// ADX ceiling that confirms a ranging market.
    pub adx_threshold: f64,
    pub adx_period: usize,
}

impl Default for ProbReversionParams {
    fn default() -> Self {
        Self {
            bb_period: 20,
            bb_std_dev: 2.0,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            adx_threshold: 25.0,
            adx_period: 14,
        }
    }
}

/// Parameters for the momentum strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumParams {
    pub consecutive_candles: usize,
    pub volume_surge_multiplier: f64,
    pub rsi_min: f64,
    pub rsi_max: f64,
    pub adx_threshold: f64,
    /// Mean close-to-close change over the last five bars required to enter.
    pub min_momentum: f64,
    /// Bars after which the position is exited regardless of protection.
    pub max_hold_bars: usize,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            consecutive_candles: 2,
            volume_surge_multiplier: 1.2,
            rsi_min: 55.0,
            rsi_max: 85.0,
            adx_threshold: 25.0,
            min_momentum: 0.005,
            max_hold_bars: 6,
        }
    }
}

/// Parameters for the consolidation breakout strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutParams {
    pub consolidation_period: usize,
    /// Widest (high - low) / low range still treated as consolidation.
    pub max_range_pct: f64,
    pub volume_surge_multiplier: f64,
    /// Minimum close beyond the range edge, relative to the edge.
    pub min_breakout_pct: f64,
    pub max_hold_bars: usize,
}

impl Default for BreakoutParams {
    fn default() -> Self {
        Self {
            consolidation_period: 10,
            max_range_pct: 0.05,
            volume_surge_multiplier: 1.5,
            min_breakout_pct: 0.005,
            max_hold_bars: 24,
        }
    }
}

/// Parameters for the range grid strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParams {
    /// Bars before the last one whose high/low bound the grid.
    pub range_period: usize,
    /// Widening of the range on both sides (0.03 = 3%).
    pub range_buffer_pct: f64,
    /// Number of levels, centered on the range midpoint.
    pub grid_count: usize,
    /// Level spacing as a multiple of the bracket ATR.
    pub spacing_atr_multiple: f64,
    /// Trade only while the classifier reports a non-trending market.
    pub skip_trending: bool,
    pub max_hold_bars: usize,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            range_period: 20,
            range_buffer_pct: 0.03,
            grid_count: 7,
            spacing_atr_multiple: 0.5,
            skip_trending: true,
            max_hold_bars: 48,
        }
    }
}

/// When a replay or live run swaps in the parameters optimized for a regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Consecutive decision bars a regime must be classified before switching to it.
    pub confirmation_bars: usize,
    /// Decision bars after a switch during which no further switch happens.
    pub switch_cooldown_bars: usize,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self { confirmation_bars: 3, switch_cooldown_bars: 50 }
    }
}

/// Settings of the advisory circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub failure_window: Duration,
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(300),
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Contains parameters for the live polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub symbol: String,
    pub interval: String,
    pub strategy: StrategyId,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Upper bound on every exchange or advisory call.
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,
    /// Consecutive failed cycles after which new entries are halted.
    pub max_consecutive_io_failures: u32,
    pub advisory: CircuitBreakerConfig,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-USDT-SWAP".to_string(),
            interval: "15m".to_string(),
            strategy: StrategyId::MaCrossover,
            poll_interval: Duration::from_secs(15 * 60),
            io_timeout: Duration::from_secs(10),
            max_consecutive_io_failures: 3,
            advisory: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), directory: None, file_prefix: "perpetua.log".to_string() }
    }
}

impl Config {
    /// Rejects parameter tables that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.contract_value <= Decimal::ZERO {
            return Err(invalid("simulation.contract_value must be positive"));
        }
        if sim.fee_rate.is_sign_negative() || sim.fee_rate >= Decimal::ONE {
            return Err(invalid("simulation.fee_rate must be in [0, 1)"));
        }
        if sim.slippage_rate.is_sign_negative() || sim.slippage_rate >= Decimal::ONE {
            return Err(invalid("simulation.slippage_rate must be in [0, 1)"));
        }
        if sim.initial_capital <= Decimal::ZERO {
            return Err(invalid("simulation.initial_capital must be positive"));
        }
        if sim.lot_size <= Decimal::ZERO {
            return Err(invalid("simulation.lot_size must be positive"));
        }
        if sim.history_window < 2 {
            return Err(invalid("simulation.history_window must hold at least two bars"));
        }

        let risk = &self.risk_management;
        if risk.base_risk_per_trade <= Decimal::ZERO || risk.base_risk_per_trade >= Decimal::ONE {
            return Err(invalid("risk_management.base_risk_per_trade must be between 0 and 1"));
        }
        if risk.leverage <= Decimal::ZERO || risk.max_leverage <= Decimal::ZERO {
            return Err(invalid("risk_management leverage values must be positive"));
        }
        if risk.max_capital_utilization <= Decimal::ZERO
            || risk.max_capital_utilization > Decimal::ONE
        {
            return Err(invalid("risk_management.max_capital_utilization must be in (0, 1]"));
        }
        if risk.protection_levels.is_empty() {
            return Err(invalid("risk_management.protection_levels must not be empty"));
        }
        if !risk
            .protection_levels
            .windows(2)
            .all(|w| w[0].activation_time <= w[1].activation_time)
        {
            return Err(invalid("risk_management.protection_levels must be ordered by activation_time"));
        }
        if !risk.lock_tiers.windows(2).all(|w| w[0].min_profit < w[1].min_profit) {
            return Err(invalid("risk_management.lock_tiers must be ordered by min_profit"));
        }
        if risk
            .lock_tiers
            .iter()
            .any(|t| t.lock_ratio <= Decimal::ZERO || t.lock_ratio >= Decimal::ONE)
        {
            return Err(invalid("risk_management.lock_tiers ratios must be in (0, 1)"));
        }

        let cls = &self.classifier;
        if cls.atr_pct_low >= cls.atr_pct_high {
            return Err(invalid("classifier.atr_pct_low must be below classifier.atr_pct_high"));
        }
        if cls.ma_fast >= cls.ma_slow {
            return Err(invalid("classifier.ma_fast must be shorter than classifier.ma_slow"));
        }
        if self.adaptation.confirmation_bars == 0 {
            return Err(invalid("adaptation.confirmation_bars must be at least 1"));
        }
        if cls.min_bars == 0 {
            return Err(invalid("classifier.min_bars must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn classifier_bar_minimum_is_checked() {
        let mut config = Config::default();
        config.classifier.min_bars = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn regime_switches_need_at_least_one_confirming_bar() {
        let mut config = Config::default();
        config.adaptation.confirmation_bars = 0;
        assert!(config.validate().is_err());
        config.adaptation.confirmation_bars = 1;
        config.adaptation.switch_cooldown_bars = 0;
        config.validate().unwrap();
    }

    #[test]
    fn zero_contract_value_is_rejected() {
        let mut config = Config::default();
        config.simulation.contract_value = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn unordered_lock_tiers_are_rejected() {
        let mut config = Config::default();
        config.risk_management.lock_tiers.reverse();
        assert!(config.validate().is_err());
    }

    #[test]
    fn atr_tier_lookup_follows_volatility_level() {
        let tiers = AtrTierTable::default();
        assert_eq!(tiers.for_level(VolatilityLevel::Medium).stop_loss, dec!(2.0));
        assert_eq!(tiers.for_level(VolatilityLevel::High).take_profit, dec!(3.0));
    }
}

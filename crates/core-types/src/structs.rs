use crate::enums::{
    Direction, ExitReason, PositionSide, Regime, VolatilityLevel, VolumeProfile,
};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One OHLCV bar for a fixed timeframe. `timestamp` is the bar's close time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kline {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Kline {
    /// Checks the internal consistency of the bar.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.open <= Decimal::ZERO
            || self.high <= Decimal::ZERO
            || self.low <= Decimal::ZERO
            || self.close <= Decimal::ZERO
        {
            return Err(CoreError::InvalidInput(
                "kline".to_string(),
                format!("non-positive price at {}", self.timestamp),
            ));
        }
        if self.high < self.low
            || self.high < self.open.max(self.close)
            || self.low > self.open.min(self.close)
        {
            return Err(CoreError::InvalidInput(
                "kline".to_string(),
                format!(
                    "high/low do not bound open/close at {} (o={} h={} l={} c={})",
                    self.timestamp, self.open, self.high, self.low, self.close
                ),
            ));
        }
        if self.volume.is_sign_negative() {
            return Err(CoreError::InvalidInput(
                "kline".to_string(),
                format!("negative volume at {}", self.timestamp),
            ));
        }
        Ok(())
    }
}

/// A strategy's trade proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Fraction of the risk-derived size to actually take, in `[0, 1]`.
    pub size_fraction: Decimal,
    pub metadata: BTreeMap<String, String>,
}

impl StrategySignal {
    pub fn flat() -> Self {
        Self {
            direction: Direction::Flat,
            entry_price: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            size_fraction: Decimal::ZERO,
            metadata: BTreeMap::new(),
        }
    }

    pub fn long(entry_price: Decimal, stop_loss: Decimal, take_profit: Decimal) -> Self {
        Self::directional(Direction::Long, entry_price, stop_loss, take_profit)
    }

    pub fn short(entry_price: Decimal, stop_loss: Decimal, take_profit: Decimal) -> Self {
        Self::directional(Direction::Short, entry_price, stop_loss, take_profit)
    }

    fn directional(
        direction: Direction,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Self {
        Self {
            direction,
            entry_price,
            stop_loss,
            take_profit,
            size_fraction: Decimal::ONE,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_size_fraction(mut self, size_fraction: Decimal) -> Self {
        self.size_fraction = size_fraction;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_flat(&self) -> bool {
        self.direction == Direction::Flat
    }

    /// Enforces `stop_loss < entry < take_profit` for longs, the mirror for shorts,
    /// and `size_fraction` within `[0, 1]`. Flat signals always pass.
    pub fn validate(&self) -> Result<(), CoreError> {
        let ordered = match self.direction {
            Direction::Flat => return Ok(()),
            Direction::Long => {
                self.stop_loss < self.entry_price && self.entry_price < self.take_profit
            }
            Direction::Short => {
                self.take_profit < self.entry_price && self.entry_price < self.stop_loss
            }
        };
        if !ordered {
            return Err(CoreError::InvalidSignal(format!(
                "{:?} entry={} stop_loss={} take_profit={}",
                self.direction, self.entry_price, self.stop_loss, self.take_profit
            )));
        }
        if self.size_fraction < Decimal::ZERO || self.size_fraction > Decimal::ONE {
            return Err(CoreError::InvalidSignal(format!(
                "size_fraction {} outside [0, 1]",
                self.size_fraction
            )));
        }
        Ok(())
    }
}

/// The stop-loss/take-profit envelope of an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionState {
    pub current_stop_loss: Decimal,
    pub current_take_profit: Decimal,
    /// The largest lock-in fraction applied so far. Once set, the stop never loosens.
    pub lock_ratio_applied: Option<Decimal>,
    pub last_update_timestamp: DateTime<Utc>,
    pub regime_at_open: Regime,
    pub volatility_at_open: VolatilityLevel,
    /// ATR at entry; orbit recomputations scale from it.
    pub atr_at_open: Decimal,
    /// Name of the protection level currently in force.
    pub level: String,
}

/// An open position. `size` is in contracts; base-asset exposure is
/// `size * contract_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub leverage: Decimal,
    pub contract_value: Decimal,
    pub open_timestamp: DateTime<Utc>,
    pub entry_fee: Decimal,
    pub entry_slippage: Decimal,
    /// Loss in quote currency if the initial stop is hit, before costs.
    pub initial_risk: Decimal,
    pub protection: ProtectionState,
}

impl Position {
    pub fn notional(&self, price: Decimal) -> Decimal {
        self.size * price * self.contract_value
    }

    pub fn margin(&self) -> Decimal {
        if self.leverage.is_zero() {
            return self.notional(self.entry_price);
        }
        self.notional(self.entry_price) / self.leverage
    }

    /// Price PnL at `mark`, before any costs.
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        (mark - self.entry_price) * self.size * self.contract_value * self.side.sign()
    }

    /// Favourable move relative to entry (0.01 = 1% in the trader's favour).
    pub fn profit_ratio(&self, mark: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (mark - self.entry_price) / self.entry_price * self.side.sign()
    }
}

/// One closed round trip in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u64,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: Decimal,
    pub contract_value: Decimal,
    /// Entry plus exit fees.
    pub fee_paid: Decimal,
    /// Entry plus exit slippage.
    pub slippage_cost: Decimal,
    pub gross_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub initial_risk: Decimal,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.realized_pnl > Decimal::ZERO
    }

    /// Realized PnL in units of the risk taken at entry.
    pub fn r_multiple(&self) -> Option<Decimal> {
        if self.initial_risk > Decimal::ZERO {
            Some(self.realized_pnl / self.initial_risk)
        } else {
            None
        }
    }
}

/// Derived features of the recent market. Recomputed every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub regime: Regime,
    pub volatility_level: VolatilityLevel,
    pub atr_pct: f64,
    pub oscillation_strength: f64,
    pub trend_strength: f64,
    pub volume_profile: VolumeProfile,
    pub adx: f64,
}

impl Default for MarketState {
    /// The neutral state reported when the window is too short to classify.
    fn default() -> Self {
        Self {
            regime: Regime::Ranging,
            volatility_level: VolatilityLevel::Medium,
            atr_pct: 0.01,
            oscillation_strength: 0.5,
            trend_strength: 0.5,
            volume_profile: VolumeProfile::Normal,
            adx: f64::NAN,
        }
    }
}

/// The optional structured suggestion from the external advisory layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub bias: Direction,
    /// In `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub risk_notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

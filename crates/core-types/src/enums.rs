use crate::error::CoreError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Returns the opposite side of the position
    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    /// `1` for longs and `-1` for shorts. Multiplying a price move by this yields
    /// the move in the trader's favour.
    pub fn sign(&self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// The direction carried by a `StrategySignal`. `Flat` means "no action".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    pub fn side(&self) -> Option<PositionSide> {
        match self {
            Direction::Long => Some(PositionSide::Long),
            Direction::Short => Some(PositionSide::Short),
            Direction::Flat => None,
        }
    }
}

impl From<PositionSide> for Direction {
    fn from(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => Direction::Long,
            PositionSide::Short => Direction::Short,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    SignalExit,
    Forced,
}

/// Classified market condition.
///
/// `Ord` exists only to give regime-keyed maps a stable order. Use
/// `Regime::PRIORITY` when precedence matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Ranging,
    Trending,
    Volatile,
}

impl Regime {
    /// Precedence used when more than one regime condition holds.
    pub const PRIORITY: [Regime; 3] = [Regime::Trending, Regime::Volatile, Regime::Ranging];

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Ranging => "ranging",
            Regime::Trending => "trending",
            Regime::Volatile => "volatile",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeProfile {
    Low,
    Normal,
    High,
}

/// The closed registry of strategy variants. The serialized form doubles as the
/// registry name used in configuration files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    MaCrossover,
    SuperTrend,
    ProbReversion,
    Momentum,
    Breakout,
    Grid,
}

impl StrategyId {
    pub const ALL: [StrategyId; 6] = [
        StrategyId::MaCrossover,
        StrategyId::SuperTrend,
        StrategyId::ProbReversion,
        StrategyId::Momentum,
        StrategyId::Breakout,
        StrategyId::Grid,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyId::MaCrossover => "ma_crossover",
            StrategyId::SuperTrend => "super_trend",
            StrategyId::ProbReversion => "prob_reversion",
            StrategyId::Momentum => "momentum",
            StrategyId::Breakout => "breakout",
            StrategyId::Grid => "grid",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        StrategyId::ALL
            .into_iter()
            .find(|id| id.name() == wanted)
            .ok_or_else(|| CoreError::UnknownStrategy(s.to_string()))
    }
}

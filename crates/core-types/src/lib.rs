//! # Perpetua Core Types
//!
//! The shared vocabulary of the workspace: market data, signals, positions,
//! protection state and the trade ledger. Every other crate depends on this one.
//!
//! ## Architectural Principles
//!
//! - **Layer 0:** No knowledge of strategies, risk or execution. Only data and the
//!   invariants that belong to the data itself (e.g. the signal bracket ordering).
//! - **Money is `Decimal`:** prices, sizes, fees and PnL use `rust_decimal`.
//!   Derived market features (ATR %, trend strength) are `f64`.
//!
//! ## Public API
//!
//! - `Kline`, `StrategySignal`, `Position`, `ProtectionState`, `Trade`, `EquityPoint`
//! - `MarketState`, `Advisory`, `MarketContext`
//! - Closed enums: `Direction`, `PositionSide`, `ExitReason`, `Regime`,
//!   `VolatilityLevel`, `VolumeProfile`, `StrategyId`

pub mod context;
pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use context::MarketContext;
pub use enums::{
    Direction, ExitReason, PositionSide, Regime, StrategyId, VolatilityLevel, VolumeProfile,
};
pub use error::CoreError;
pub use structs::{
    Advisory, EquityPoint, Kline, MarketState, Position, ProtectionState, StrategySignal, Trade,
};

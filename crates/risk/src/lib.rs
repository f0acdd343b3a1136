//! # Risk & Protection Manager
//!
//! Turns a strategy's signal into a position size and owns the position's
//! stop-loss/take-profit envelope for as long as it is open.
//!
//! ## Architectural Principles
//!
//! - **Pure Decisions:** Every operation is a function of its arguments and the
//!   injected `RiskManagement` table. Time is always passed in (the bar timestamp),
//!   never read from the clock.
//! - **Reject, Don't Fail:** Cap breaches surface as `RiskError` variants for which
//!   `is_sizing_rejection()` holds; the engine downgrades those signals to flat.
//! - **Never Loosen:** Once a lock-in tier has been applied the stop only moves in
//!   the profit-protecting direction. A transition that would loosen it is an
//!   `InvariantViolation`.
//!
//! ## Public API
//!
//! - `RiskManager`: the trait the engine drives.
//! - `OrbitRiskManager`: the configured implementation.
//! - `PositionSizing`, `ContractSpec`, `ExitTrigger`: decision payloads.

pub mod error;
mod exits;
mod manager;
mod protection;
mod sizing;

pub use error::RiskError;
pub use exits::ExitTrigger;
pub use manager::OrbitRiskManager;
pub use protection::ensure_ratchet;
pub use sizing::{ContractSpec, PositionSizing, SizeCap};

use chrono::{DateTime, Utc};
use core_types::{Kline, MarketContext, MarketState, Position, ProtectionState, StrategySignal};
use rust_decimal::Decimal;

/// The risk decisions the execution engine delegates.
///
/// The `Send + Sync` bounds allow one manager to be shared by parallel optimizer trials.
pub trait RiskManager: Send + Sync {
    /// Sizes a non-flat signal in contracts, or rejects it.
    fn size_position(
        &self,
        signal: &StrategySignal,
        context: &MarketContext<'_>,
    ) -> Result<PositionSizing, RiskError>;

    /// The protection envelope a new position opens with.
    fn initial_protection(
        &self,
        signal: &StrategySignal,
        market_state: &MarketState,
        opened_at: DateTime<Utc>,
    ) -> Result<ProtectionState, RiskError>;

    /// One orbit step at `mark`. `Ok(None)` means "leave protection as it is".
    fn update_protection(
        &self,
        position: &Position,
        mark: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<ProtectionState>, RiskError>;

    /// Whether `kline` reaches a protection level of `position`.
    fn check_exit(&self, position: &Position, kline: &Kline) -> Option<ExitTrigger>;
}

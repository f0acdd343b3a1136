//! # Perpetua Execution Engine
//!
//! The orchestrator of a symbol's trading: for each closed bar it builds the
//! `MarketContext`, asks the strategy for exits and entries, has the risk manager
//! size and protect positions, fills them through the `Executor` and books the
//! result in the `Portfolio` ledger.
//!
//! ## Architectural Principles
//!
//! - **One Engine, Two Drivers:** The backtester and the live loop feed the same
//!   `ExecutionEngine::on_kline`. Nothing in the decision path reads the clock or a
//!   random source, so replaying the same bars reproduces the same ledger.
//! - **Fixed Cycle Order:** exits first (`should_exit`, then the protection levels),
//!   then one protection orbit step, then the regime adaptation step while flat,
//!   then entries. A position is never exit-checked on the bar it was opened on.
//! - **Degrade, Don't Block:** Sizing rejections leave the engine flat. In live mode
//!   every collaborator call is bounded by a timeout; failures hold the current
//!   protection and skip entries, and repeated failures halt new entries.
//! - **Abort on Invariants:** `EngineError::Invariant` ends the cycle immediately and
//!   leaves the position `Open` or `Flat`, never half-transitioned.
//!
//! ## Public API
//!
//! - `ExecutionEngine`, `CycleInputs`, `CycleOutcome`, `Phase`
//! - `LiveRunner` with the `MarketDataFeed`, `AdvisoryProvider` and `ExchangeGateway`
//!   collaborator traits
//! - `CircuitBreaker`, `CircuitState`
//! - `RegimeAdaptation`, which swaps in per-regime optimized parameters while flat
//! - `EngineError`

pub mod adaptive;
pub mod circuit_breaker;
pub mod error;
pub mod execution;
pub mod live;

pub use adaptive::{RegimeAdaptation, RegimeSwitch};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use error::EngineError;
pub use execution::{CycleInputs, CycleOutcome, ExecutionEngine, Phase};
pub use live::{AdvisoryProvider, CycleHealth, ExchangeGateway, LiveRunner, MarketDataFeed};

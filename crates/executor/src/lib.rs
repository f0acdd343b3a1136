//! # Perpetua Executor Crate
//!
//! This crate provides the fill cost model and the per-symbol ledger. It defines a
//! generic `Executor` trait with a `SimulatedExecutor` for backtesting, and a
//! `Portfolio` that books positions and closes them into trades.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** The `Executor` is a pure calculator that
//!   determines the costs of a fill (fee and slippage on the contract-value-correct
//!   notional) without mutating state. The `Portfolio` applies fills to the balance,
//!   the open position and the ledger.
//! - **One Contract Value:** `notional = size * price * contract_value` everywhere.
//!   A close whose fill was priced with a different contract value than the position
//!   was opened with is rejected, never booked.
//!
//! ## Public API
//!
//! - `Executor`: The core trait for all execution engines.
//! - `SimulatedExecutor`: The "virtual exchange" for backtesting.
//! - `FillRequest`, `Fill`, `Leg`: The request and receipt of one leg.
//! - `Portfolio`: The in-memory state manager for a trading account.
//! - `ExecutorError`: The specific error types that can be returned from this crate.

pub mod error;
pub mod exchange;
pub mod portfolio;

pub use error::ExecutorError;
pub use exchange::{Executor, Fill, FillRequest, Leg, SimulatedExecutor};
pub use portfolio::Portfolio;

//! # Perpetua Analytics Engine
//!
//! This crate provides the tools for conducting quantitative analysis of trading strategy
//! performance. It acts as the "unbiased judge" of the system.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of external systems.
//!   It depends only on `core-types` (Layer 0).
//! - **Stateless Calculation:** The `AnalyticsEngine` is a stateless calculator. It takes
//!   the trade ledger and equity curve as input and produces a `PerformanceReport`.
//! - **Derived Rating:** `Rating` is computed from a report on demand and never stored
//!   in its place.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: The main struct that contains the calculation logic.
//! - `PerformanceReport`: Return, drawdown, Sharpe, win rate, profit factor, expectancy.
//! - `Rating`, `Grade`: The weighted letter-grade rubric.
//! - `AnalyticsError`: The specific error types that can be returned from this crate.

pub mod engine;
pub mod error;
pub mod rating;
pub mod report;

pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use rating::{Grade, Rating, ScoreBreakdown};
pub use report::{ExitBreakdown, PerformanceReport};

//! # Market State Classifier
//!
//! Labels a trailing window of bars with a `MarketState`: volatility bucket,
//! oscillation and trend strength, volume profile and the resulting `Regime`.
//!
//! ## Architectural Principles
//!
//! - **Advisory Only:** The state scales sizing and drives the optimizer's
//!   segmentation. It never blocks a strategy's signal.
//! - **Recomputable:** Output is a pure function of the bars and `ClassifierParams`;
//!   nothing is persisted.
//! - **Fail-Soft:** Windows that are too short or contain malformed bars yield the
//!   neutral `MarketState::default()`.
//!
//! ## Public API
//!
//! - `MarketStateClassifier`: `classify` one window, or `segment` a whole history.
//! - `RegimeSegmentation`: per-bar labels, regime frequencies and regime runs.

mod classifier;
mod segmentation;

pub use classifier::MarketStateClassifier;
pub use segmentation::{RegimeRun, RegimeSegmentation};

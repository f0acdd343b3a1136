//! # Perpetua Events
//!
//! This crate defines the real-time event structures the engine publishes to the
//! dashboard layer.
//!
//! As a Layer 0 crate, it depends only on `core-types` and provides the definitive
//! language for all real-time state synchronization. Every payload is plain data
//! that serializes to JSON without loss.

pub mod error;
pub mod messages;

pub use error::EventsError;
pub use messages::{EngineEvent, KlineData, LogLevel, LogMessage, PortfolioState, WsMessage};

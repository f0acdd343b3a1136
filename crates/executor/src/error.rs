use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Invalid execution parameters: {0}")]
    InvalidParameters(String),

    #[error("A position is already open for symbol: {0}")]
    PositionAlreadyOpen(String),

    #[error("No open position to close")]
    NoOpenPosition,

    #[error("Contract value mismatch. Position: {position}, Executor: {executor}")]
    ContractValueMismatch { position: Decimal, executor: Decimal },

    /// A programming error. The cycle that produced it must not continue.
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),
}

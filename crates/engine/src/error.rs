use executor::ExecutorError;
use risk::RiskError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Risk management error: {0}")]
    Risk(RiskError),

    #[error("Execution error: {0}")]
    Executor(ExecutorError),

    /// A numerical invariant was broken. The cycle is aborted and, in a backtest,
    /// the run with it.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Market data feed error: {0}")]
    Feed(String),

    #[error("Advisory provider error: {0}")]
    Advisory(String),

    #[error("Exchange gateway error: {0}")]
    Gateway(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: &'static str, after: Duration },
}

impl EngineError {
    /// External I/O failures degrade a live cycle instead of stopping the loop.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            EngineError::Feed(_)
                | EngineError::Advisory(_)
                | EngineError::Gateway(_)
                | EngineError::Timeout { .. }
        )
    }
}

impl From<RiskError> for EngineError {
    fn from(error: RiskError) -> Self {
        match error {
            RiskError::InvariantViolation { .. } => EngineError::Invariant(error.to_string()),
            other => EngineError::Risk(other),
        }
    }
}

impl From<ExecutorError> for EngineError {
    fn from(error: ExecutorError) -> Self {
        match error {
            ExecutorError::InvariantViolation(_) | ExecutorError::ContractValueMismatch { .. } => {
                EngineError::Invariant(error.to_string())
            }
            other => EngineError::Executor(other),
        }
    }
}

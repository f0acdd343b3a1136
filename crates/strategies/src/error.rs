use core_types::CoreError;
use indicators::IndicatorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(#[from] IndicatorError),

    #[error("Indicator produced a value that cannot be priced: {0}")]
    NonFinite(String),

    #[error("Strategy produced an invalid signal: {0}")]
    InvalidSignal(#[from] CoreError),

    #[error("Strategy of type '{0}' not found or implemented")]
    StrategyNotFound(String),
}

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("Indicator received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Bar {index} cannot be used for indicator calculation: {reason}")]
    MalformedBar { index: usize, reason: String },
}

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Signal violates its bracket ordering: {0}")]
    InvalidSignal(String),

    #[error("Unknown strategy name: '{0}'")]
    UnknownStrategy(String),
}

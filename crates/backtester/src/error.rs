use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Strategy construction error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Execution engine error: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("Analytics calculation error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid kline row {line} in {path}: {reason}")]
    InvalidRow { path: PathBuf, line: u64, reason: String },

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),

    #[error("No cached klines at {0}")]
    DataUnavailable(PathBuf),
}

impl From<indicatif::style::TemplateError> for BacktestError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        BacktestError::ProgressBarTemplate(error.to_string())
    }
}

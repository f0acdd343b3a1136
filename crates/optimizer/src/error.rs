use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Configuration error: {0}")]
    Config(#[from] configuration::error::ConfigError),

    #[error("Backtest execution failed: {0}")]
    Backtest(#[from] backtester::BacktestError),

    #[error("Parameter generation failed: {0}")]
    ParameterGeneration(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),

    #[error("No regime has at least {min_regime_bars} labeled bars ({labeled_bars} labeled in total)")]
    NoEligibleRegime { min_regime_bars: usize, labeled_bars: usize },

    #[error("The search space is empty: no parameter ranges and no seeds")]
    EmptySearchSpace,
}

impl From<indicatif::style::TemplateError> for OptimizerError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        OptimizerError::ProgressBarTemplate(error.to_string())
    }
}

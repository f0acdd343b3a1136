use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Initial capital must be positive, got {0}")]
    InvalidInitialCapital(String),

    #[error("Periods per year must be positive, got {0}")]
    InvalidAnnualization(u32),

    #[error("Calculation error: Division by zero encountered in metric '{0}'")]
    DivisionByZero(String),

    #[error("Equity curve is not in chronological order at index {0}")]
    UnorderedEquityCurve(usize),
}

use core_types::PositionSide;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("Insufficient portfolio equity ({0}) to execute trade based on risk rules.")]
    InsufficientEquity(Decimal),

    #[error("The provided entry price ({0}) is zero or negative.")]
    InvalidEntryPrice(Decimal),

    #[error("Stop distance is zero for entry {entry} and stop {stop_loss}.")]
    ZeroStopDistance { entry: Decimal, stop_loss: Decimal },

    #[error("Effective leverage {effective} would exceed the cap of {max}.")]
    LeverageCapExceeded { effective: Decimal, max: Decimal },

    #[error("Margin {margin} would exceed {max_utilization} of equity {equity}.")]
    UtilizationCapExceeded { margin: Decimal, equity: Decimal, max_utilization: Decimal },

    #[error("Position size rounds to {size} contracts (lot size {lot_size}).")]
    PositionTooSmall { size: Decimal, lot_size: Decimal },

    /// A programming error. The cycle that produced it must be aborted.
    #[error("Protection invariant violated on {side:?} position: {detail}")]
    InvariantViolation { side: PositionSide, detail: String },
}

impl RiskError {
    /// Sizing rejections downgrade the signal to flat; everything else is a bug or bad input.
    pub fn is_sizing_rejection(&self) -> bool {
        matches!(
            self,
            RiskError::LeverageCapExceeded { .. }
                | RiskError::UtilizationCapExceeded { .. }
                | RiskError::PositionTooSmall { .. }
                | RiskError::ZeroStopDistance { .. }
                | RiskError::InsufficientEquity(_)
        )
    }
}

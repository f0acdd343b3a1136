use crate::error::ExecutorError;
use chrono::{DateTime, Utc};
use configuration::Simulation;
use core_types::PositionSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which half of a round trip a fill belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Entry,
    Exit,
}

/// A request to fill `size` contracts of a position on one of its legs.
#[derive(Debug, Clone, PartialEq)]
pub struct FillRequest {
    pub side: PositionSide,
    pub leg: Leg,
    pub price: Decimal,
    /// In contracts.
    pub size: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// The cost receipt of one leg.
///
/// `notional = size * price * contract_value`; fee and slippage are both charged
/// on that notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub side: PositionSide,
    pub leg: Leg,
    pub price: Decimal,
    pub size: Decimal,
    pub contract_value: Decimal,
    pub notional: Decimal,
    pub fee: Decimal,
    pub slippage: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A generic trait for an execution engine.
///
/// This trait allows the backtester and live engine to be agnostic about whether
/// they are talking to a simulated exchange or a real one.
pub trait Executor: Send + Sync {
    /// Computes the costs of a fill.
    ///
    /// Crucially this **does not modify the portfolio state itself**. The caller is
    /// responsible for applying the returned `Fill` to the `Portfolio`.
    fn execute(&self, request: &FillRequest) -> Result<Fill, ExecutorError>;

    /// Base-asset quantity represented by one contract.
    fn contract_value(&self) -> Decimal;
}

/// The "virtual exchange" for backtesting.
///
/// Fills happen at the requested price. Slippage is booked as a separate cost
/// rather than folded into the price, so the ledger shows it explicitly.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    fee_rate: Decimal,
    slippage_rate: Decimal,
    contract_value: Decimal,
}

impl SimulatedExecutor {
    pub fn new(params: &Simulation) -> Result<Self, ExecutorError> {
        if params.contract_value <= Decimal::ZERO {
            return Err(ExecutorError::InvalidParameters(format!(
                "contract_value must be positive, got {}",
                params.contract_value
            )));
        }
        for (name, rate) in [("fee_rate", params.fee_rate), ("slippage_rate", params.slippage_rate)] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(ExecutorError::InvalidParameters(format!(
                    "{name} must be within [0, 1), got {rate}"
                )));
            }
        }
        Ok(Self {
            fee_rate: params.fee_rate,
            slippage_rate: params.slippage_rate,
            contract_value: params.contract_value,
        })
    }
}

impl Executor for SimulatedExecutor {
    fn execute(&self, request: &FillRequest) -> Result<Fill, ExecutorError> {
        // --- 1. Validation ---
        if request.size <= Decimal::ZERO {
            return Err(ExecutorError::InvariantViolation(format!(
                "fill size must be positive, got {}",
                request.size
            )));
        }
        if request.price <= Decimal::ZERO {
            return Err(ExecutorError::InvariantViolation(format!(
                "fill price must be positive, got {}",
                request.price
            )));
        }

        // --- 2. Costs ---
        let notional = request.size * request.price * self.contract_value;
        let fee = notional * self.fee_rate;
        let slippage = notional * self.slippage_rate;

        tracing::debug!(
            leg = ?request.leg,
            side = ?request.side,
            price = %request.price,
            size = %request.size,
            notional = %notional,
            fee = %fee,
            slippage = %slippage,
            "Simulated fill"
        );

        Ok(Fill {
            side: request.side,
            leg: request.leg,
            price: request.price,
            size: request.size,
            contract_value: self.contract_value,
            notional,
            fee,
            slippage,
            timestamp: request.timestamp,
        })
    }

    fn contract_value(&self) -> Decimal {
        self.contract_value
    }
}

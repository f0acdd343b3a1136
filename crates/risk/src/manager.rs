use crate::RiskManager;
use crate::error::RiskError;
use crate::exits::{self, ExitTrigger};
use crate::protection;
use crate::sizing::{self, ContractSpec, PositionSizing};
use chrono::{DateTime, Utc};
use configuration::RiskManagement;
use core_types::{Kline, MarketContext, MarketState, Position, ProtectionState, StrategySignal};
use rust_decimal::Decimal;

/// The concrete `RiskManager`: fixed-fractional sizing against the signal's stop,
/// ATR-tiered initial protection and the throttled protection orbit.
#[derive(Debug, Clone)]
pub struct OrbitRiskManager {
    params: RiskManagement,
    contract: ContractSpec,
}

impl OrbitRiskManager {
    /// Creates a new `OrbitRiskManager` with the given configuration parameters.
    pub fn new(params: RiskManagement, contract: ContractSpec) -> Result<Self, RiskError> {
        // Validate that risk parameters are logical.
        if params.base_risk_per_trade <= Decimal::ZERO || params.base_risk_per_trade >= Decimal::ONE {
            return Err(RiskError::InvalidParameters(
                "base_risk_per_trade must be between 0 and 1".to_string(),
            ));
        }
        if contract.contract_value <= Decimal::ZERO {
            return Err(RiskError::InvalidParameters(format!(
                "contract_value must be positive, got {}",
                contract.contract_value
            )));
        }
        if params.protection_levels.is_empty() {
            return Err(RiskError::InvalidParameters(
                "at least one protection level is required".to_string(),
            ));
        }
        if params.leverage <= Decimal::ZERO {
            return Err(RiskError::InvalidParameters("leverage must be positive".to_string()));
        }
        Ok(Self { params, contract })
    }

    pub fn params(&self) -> &RiskManagement {
        &self.params
    }

    pub fn contract(&self) -> &ContractSpec {
        &self.contract
    }
}

impl RiskManager for OrbitRiskManager {
    fn size_position(
        &self,
        signal: &StrategySignal,
        context: &MarketContext<'_>,
    ) -> Result<PositionSizing, RiskError> {
        let sizing = sizing::size_position(&self.params, &self.contract, signal, context)?;
        tracing::debug!(
            symbol = context.symbol,
            size = %sizing.size,
            notional = %sizing.notional,
            cap = ?sizing.binding_cap,
            "Position sized"
        );
        Ok(sizing)
    }

    fn initial_protection(
        &self,
        signal: &StrategySignal,
        market_state: &MarketState,
        opened_at: DateTime<Utc>,
    ) -> Result<ProtectionState, RiskError> {
        protection::initial_protection(&self.params, signal, market_state, opened_at)
    }

    fn update_protection(
        &self,
        position: &Position,
        mark: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<ProtectionState>, RiskError> {
        let update = protection::update_protection(&self.params, position, mark, now)?;
        if let Some(state) = &update {
            tracing::debug!(
                symbol = %position.symbol,
                level = %state.level,
                stop_loss = %state.current_stop_loss,
                take_profit = %state.current_take_profit,
                lock = ?state.lock_ratio_applied,
                "Protection orbit update"
            );
        }
        Ok(update)
    }

    fn check_exit(&self, position: &Position, kline: &Kline) -> Option<ExitTrigger> {
        exits::check_exit(position, kline)
    }
}

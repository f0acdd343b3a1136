use crate::error::ExecutorError;
use crate::exchange::{Fill, Leg};
use core_types::{ExitReason, Position, ProtectionState, Trade};
use rust_decimal::Decimal;

impl Fill {
    /// Turns an entry fill into the position it opens.
    pub fn into_position(
        self,
        symbol: &str,
        leverage: Decimal,
        initial_risk: Decimal,
        protection: ProtectionState,
    ) -> Result<Position, ExecutorError> {
        if self.leg != Leg::Entry {
            return Err(ExecutorError::InvariantViolation(
                "an exit fill cannot open a position".to_string(),
            ));
        }
        Ok(Position {
            symbol: symbol.to_string(),
            side: self.side,
            entry_price: self.price,
            size: self.size,
            leverage,
            contract_value: self.contract_value,
            open_timestamp: self.timestamp,
            entry_fee: self.fee,
            entry_slippage: self.slippage,
            initial_risk,
            protection,
        })
    }
}

/// The account of one symbol: its balance, the open position (if any) and the
/// trade ledger.
///
/// Entry costs are debited when a position opens; price PnL and exit costs are
/// credited when it closes. Between trades `balance` therefore equals the initial
/// capital plus the sum of realized PnL.
#[derive(Debug, Clone)]
pub struct Portfolio {
    initial_capital: Decimal,
    balance: Decimal,
    position: Option<Position>,
    trades: Vec<Trade>,
    next_trade_id: u64,
}

impl Portfolio {
    /// Creates a new `Portfolio` with a given amount of starting capital.
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            balance: initial_capital,
            position: None,
            trades: Vec::new(),
            next_trade_id: 1,
        }
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    /// Cash after all booked costs and realized PnL.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    /// Balance plus the unrealized PnL of the open position at `mark`.
    pub fn equity(&self, mark: Decimal) -> Decimal {
        match &self.position {
            Some(position) => self.balance + position.unrealized_pnl(mark),
            None => self.balance,
        }
    }

    /// Books a newly opened position and debits its entry costs.
    pub fn open(&mut self, position: Position) -> Result<(), ExecutorError> {
        // --- 1. Validation ---
        if let Some(open) = &self.position {
            return Err(ExecutorError::PositionAlreadyOpen(open.symbol.clone()));
        }
        if position.size <= Decimal::ZERO {
            return Err(ExecutorError::InvariantViolation(format!(
                "position size must be positive, got {}",
                position.size
            )));
        }
        if position.contract_value <= Decimal::ZERO {
            return Err(ExecutorError::InvariantViolation(format!(
                "contract value must be positive, got {}",
                position.contract_value
            )));
        }
        if position.entry_fee.is_sign_negative() || position.entry_slippage.is_sign_negative() {
            return Err(ExecutorError::InvariantViolation(format!(
                "entry costs must not be negative (fee {}, slippage {})",
                position.entry_fee, position.entry_slippage
            )));
        }

        // --- 2. State Update ---
        self.balance -= position.entry_fee + position.entry_slippage;
        self.position = Some(position);
        Ok(())
    }

    /// Replaces the protection envelope of the open position.
    pub fn set_protection(&mut self, protection: ProtectionState) -> Result<(), ExecutorError> {
        let position = self.position.as_mut().ok_or(ExecutorError::NoOpenPosition)?;
        position.protection = protection;
        Ok(())
    }

    /// Closes the open position with `exit` and appends exactly one trade to the ledger.
    ///
    /// On error the position stays open and the ledger is untouched.
    pub fn close(&mut self, exit: &Fill, reason: ExitReason) -> Result<Trade, ExecutorError> {
        // --- 1. Validation ---
        let position = self.position.as_ref().ok_or(ExecutorError::NoOpenPosition)?;
        if exit.leg != Leg::Exit || exit.side != position.side {
            return Err(ExecutorError::InvariantViolation(format!(
                "{:?} {:?} fill cannot close a {:?} position",
                exit.side, exit.leg, position.side
            )));
        }
        if exit.size != position.size {
            return Err(ExecutorError::InvariantViolation(format!(
                "exit size {} does not match position size {}",
                exit.size, position.size
            )));
        }
        if exit.contract_value != position.contract_value {
            return Err(ExecutorError::ContractValueMismatch {
                position: position.contract_value,
                executor: exit.contract_value,
            });
        }

        // --- 2. PnL ---
        let gross_pnl = position.unrealized_pnl(exit.price);
        let fee_paid = position.entry_fee + exit.fee;
        let slippage_cost = position.entry_slippage + exit.slippage;
        let realized_pnl = gross_pnl - fee_paid - slippage_cost;

        let trade = Trade {
            trade_id: self.next_trade_id,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_timestamp: position.open_timestamp,
            exit_timestamp: exit.timestamp,
            entry_price: position.entry_price,
            exit_price: exit.price,
            size: position.size,
            contract_value: position.contract_value,
            fee_paid,
            slippage_cost,
            gross_pnl,
            realized_pnl,
            initial_risk: position.initial_risk,
            exit_reason: reason,
        };

        // --- 3. State Update ---
        self.balance += gross_pnl - exit.fee - exit.slippage;
        self.position = None;
        self.next_trade_id += 1;
        self.trades.push(trade.clone());

        tracing::debug!(
            trade_id = trade.trade_id,
            realized_pnl = %trade.realized_pnl,
            balance = %self.balance,
            "Trade booked"
        );
        Ok(trade)
    }
}

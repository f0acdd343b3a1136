use core_types::{ExitReason, Kline, Position, PositionSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A protection level reached within a bar, and where it fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitTrigger {
    pub reason: ExitReason,
    pub price: Decimal,
}

impl ExitTrigger {
    fn new(reason: ExitReason, price: Decimal) -> Option<Self> {
        Some(Self { reason, price })
    }
}

/// Checks the bar against the stop and the target.
///
/// A bar that opens beyond a level fills at the open. When the stop and the
/// target are both inside the bar's range, the stop is assumed to have been hit
/// first.
pub(crate) fn check_exit(position: &Position, kline: &Kline) -> Option<ExitTrigger> {
    let stop = position.protection.current_stop_loss;
    let target = position.protection.current_take_profit;

    match position.side {
        PositionSide::Long => {
            if kline.open <= stop {
                return ExitTrigger::new(ExitReason::StopLoss, kline.open);
            }
            if kline.open >= target {
                return ExitTrigger::new(ExitReason::TakeProfit, kline.open);
            }
            if kline.low <= stop {
                return ExitTrigger::new(ExitReason::StopLoss, stop);
            }
            if kline.high >= target {
                return ExitTrigger::new(ExitReason::TakeProfit, target);
            }
        }
        PositionSide::Short => {
            if kline.open >= stop {
                return ExitTrigger::new(ExitReason::StopLoss, kline.open);
            }
            if kline.open <= target {
                return ExitTrigger::new(ExitReason::TakeProfit, kline.open);
            }
            if kline.high >= stop {
                return ExitTrigger::new(ExitReason::StopLoss, stop);
            }
            if kline.low <= target {
                return ExitTrigger::new(ExitReason::TakeProfit, target);
            }
        }
    }
    None
}

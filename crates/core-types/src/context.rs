use crate::structs::{Advisory, Kline, MarketState, Position};
use rust_decimal::Decimal;

/// The read-only snapshot a decision cycle is made from.
///
/// Built once per cycle by the engine and handed out by shared reference, so
/// neither strategies nor the risk manager can mutate it.
#[derive(Debug, Clone, Copy)]
pub struct MarketContext<'a> {
    pub symbol: &'a str,
    /// Recent bars, oldest first. The last element is the bar being decided on.
    pub klines: &'a [Kline],
    pub equity: Decimal,
    pub position: Option<&'a Position>,
    pub market_state: &'a MarketState,
    pub advisory: Option<&'a Advisory>,
}

impl<'a> MarketContext<'a> {
    pub fn last_kline(&self) -> Option<&'a Kline> {
        self.klines.last()
    }

    /// The close of the latest bar, used as the mark price.
    pub fn mark_price(&self) -> Option<Decimal> {
        self.klines.last().map(|k| k.close)
    }
}

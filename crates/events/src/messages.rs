use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{Direction, Kline, Position, ProtectionState, Regime, Trade};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Enum representing the severity of a log message for structured logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A structured log message to be sent over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// A snapshot of the account after a decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub timestamp: DateTime<Utc>,
    pub balance: Decimal,
    pub equity: Decimal,
    pub position: Option<Position>,
}

/// A kline data message containing symbol and kline information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineData {
    pub symbol: String,
    pub kline: Kline,
}

/// A state transition of the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    PositionOpened {
        position: Position,
    },
    ProtectionUpdated {
        timestamp: DateTime<Utc>,
        previous: ProtectionState,
        current: ProtectionState,
    },
    PositionClosed {
        trade: Trade,
    },
    /// A non-flat signal that did not become a position.
    SignalRejected {
        timestamp: DateTime<Utc>,
        direction: Direction,
        reason: String,
    },
    /// New entries are paused. Open positions keep being monitored.
    EntriesHalted {
        timestamp: DateTime<Utc>,
        reason: String,
    },
    /// The engine now trades the parameters optimized for `to`. `None` is the
    /// configured base parameter set.
    StrategySwitched {
        timestamp: DateTime<Utc>,
        from: Option<Regime>,
        to: Option<Regime>,
    },
}

impl EngineEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::PositionOpened { position } => position.open_timestamp,
            EngineEvent::ProtectionUpdated { timestamp, .. }
            | EngineEvent::SignalRejected { timestamp, .. }
            | EngineEvent::EntriesHalted { timestamp, .. }
            | EngineEvent::StrategySwitched { timestamp, .. } => *timestamp,
            EngineEvent::PositionClosed { trade } => trade.exit_timestamp,
        }
    }
}

/// The top-level WebSocket message enum.
/// All communication from the server to the client will be one of these variants.
///
/// It serializes as `{"type": ..., "payload": ...}`, e.g. a `Log` variant looks like
/// `{"type": "Log", "payload": {"timestamp": "...", "level": "Info", "message": "..."}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WsMessage {
    /// A structured log message.
    Log(LogMessage),
    /// The account after a decision cycle.
    PortfolioState(PortfolioState),
    /// A state transition of the engine.
    Engine(EngineEvent),
    /// The bar a decision cycle was run on.
    KlineData(KlineData),
}

impl WsMessage {
    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<EngineEvent> for WsMessage {
    fn from(event: EngineEvent) -> Self {
        WsMessage::Engine(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn engine_events_are_tagged_twice() {
        let message = WsMessage::from(EngineEvent::EntriesHalted {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            reason: "3 consecutive feed failures".to_string(),
        });
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "Engine");
        assert_eq!(value["payload"]["event"], "entries_halted");
        assert_eq!(value["payload"]["reason"], "3 consecutive feed failures");
    }

    #[test]
    fn portfolio_state_round_trips() {
        let message = WsMessage::PortfolioState(PortfolioState {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap(),
            balance: dec!(10007.191),
            equity: dec!(10007.191),
            position: None,
        });
        let back: WsMessage = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(back, message);
    }
}

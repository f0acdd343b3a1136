use crate::adaptive::RegimeAdaptation;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use configuration::Config;
use core_types::{Advisory, EquityPoint, ExitReason, Kline, MarketContext, MarketState, Position, Trade};
use events::EngineEvent;
use executor::{Executor, FillRequest, Leg, Portfolio, SimulatedExecutor};
use regime::MarketStateClassifier;
use risk::{ContractSpec, OrbitRiskManager, RiskError, RiskManager};
use rust_decimal::Decimal;
use strategies::Strategy;
use tracing::{debug, info, warn};

/// Where the position of the engine's symbol is in its lifecycle.
///
/// `Opening` and `Closing` only exist inside a cycle. Between cycles the engine is
/// always `Flat` or `Open`, including after a cycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Flat,
    Opening,
    Open,
    Closing,
}

/// Per-cycle permissions and auxiliary input, decided by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleInputs {
    pub advisory: Option<Advisory>,
    pub allow_entries: bool,
    pub allow_protection_updates: bool,
}

impl Default for CycleInputs {
    fn default() -> Self {
        Self { advisory: None, allow_entries: true, allow_protection_updates: true }
    }
}

impl CycleInputs {
    /// Hold the current protection and skip new entries. Exits are still checked.
    pub fn degraded() -> Self {
        Self { advisory: None, allow_entries: false, allow_protection_updates: false }
    }
}

/// What a decision cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub timestamp: DateTime<Utc>,
    pub market_state: Option<MarketState>,
    pub events: Vec<EngineEvent>,
    pub equity: Decimal,
}

/// The per-symbol execution state machine: `FLAT -> OPENING -> OPEN -> CLOSING -> FLAT`.
///
/// The engine is fed one bar at a time by either the backtester or the live loop and
/// behaves identically in both. It holds no clock: every timestamp it uses comes from
/// the bars.
pub struct ExecutionEngine {
    // --- Context ---
    symbol: String,
    history_window: usize,
    warmup_bars: usize,
    max_consecutive_losses: u32,
    loss_cooldown_bars: usize,

    // --- Components ---
    strategy: Box<dyn Strategy>,
    risk_manager: Box<dyn RiskManager>,
    executor: Box<dyn Executor>,
    classifier: MarketStateClassifier,
    adaptation: Option<RegimeAdaptation>,

    // --- State ---
    portfolio: Portfolio,
    phase: Phase,
    history: Vec<Kline>,
    bars_seen: usize,
    last_timestamp: Option<DateTime<Utc>>,
    equity_curve: Vec<EquityPoint>,
    consecutive_losses: u32,
    cooldown_remaining: usize,
}

impl ExecutionEngine {
    /// Builds an engine with the configured risk manager and the simulated executor.
    pub fn new(
        config: &Config,
        symbol: impl Into<String>,
        strategy: Box<dyn Strategy>,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(|e| EngineError::Configuration(e.to_string()))?;
        let risk_manager = OrbitRiskManager::new(
            config.risk_management.clone(),
            ContractSpec::from_simulation(&config.simulation),
        )?;
        let executor = SimulatedExecutor::new(&config.simulation)?;
        Ok(Self::with_components(
            config,
            symbol,
            strategy,
            Box::new(risk_manager),
            Box::new(executor),
        ))
    }

    /// Builds an engine around explicitly supplied risk and execution components.
    pub fn with_components(
        config: &Config,
        symbol: impl Into<String>,
        strategy: Box<dyn Strategy>,
        risk_manager: Box<dyn RiskManager>,
        executor: Box<dyn Executor>,
    ) -> Self {
        let history_window = config.simulation.history_window.max(1);
        Self {
            symbol: symbol.into(),
            history_window,
            warmup_bars: config.simulation.warmup_bars,
            max_consecutive_losses: config.risk_management.max_consecutive_losses,
            loss_cooldown_bars: config.risk_management.loss_cooldown_bars,
            strategy,
            risk_manager,
            executor,
            classifier: MarketStateClassifier::new(config.classifier.clone()),
            adaptation: None,
            portfolio: Portfolio::new(config.simulation.initial_capital),
            phase: Phase::Flat,
            history: Vec::with_capacity(history_window * 2),
            bars_seen: 0,
            last_timestamp: None,
            equity_curve: Vec::new(),
            consecutive_losses: 0,
            cooldown_remaining: 0,
        }
    }

    /// Trades the per-regime parameters of `adaptation` once their regime is confirmed.
    pub fn with_adaptation(mut self, adaptation: RegimeAdaptation) -> Self {
        self.adaptation = Some(adaptation);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn position(&self) -> Option<&Position> {
        self.portfolio.position()
    }

    pub fn trades(&self) -> &[Trade] {
        self.portfolio.trades()
    }

    /// One point per processed bar, preceded by the initial balance at the first bar.
    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Bars left in the loss-streak pause.
    pub fn cooldown_remaining(&self) -> usize {
        self.cooldown_remaining
    }

    /// The regime whose parameters are being traded, `None` for the base set.
    pub fn active_regime(&self) -> Option<core_types::Regime> {
        self.adaptation.as_ref().and_then(RegimeAdaptation::active)
    }

    pub fn into_results(self) -> (Vec<Trade>, Vec<EquityPoint>) {
        (self.portfolio.into_trades(), self.equity_curve)
    }

    /// Runs one decision cycle on a newly closed bar.
    ///
    /// Malformed and out-of-order bars are skipped with a warning and yield `Ok(None)`.
    /// An `Err` means an invariant was broken; the position is left `Open` or `Flat`.
    pub fn on_kline(
        &mut self,
        kline: Kline,
        inputs: &CycleInputs,
    ) -> Result<Option<CycleOutcome>, EngineError> {
        // --- 1. Validation ---
        if let Err(e) = kline.validate() {
            warn!(symbol = %self.symbol, error = %e, "Skipping malformed bar");
            return Ok(None);
        }
        if let Some(last) = self.last_timestamp {
            if kline.timestamp <= last {
                warn!(
                    symbol = %self.symbol,
                    timestamp = %kline.timestamp,
                    last = %last,
                    "Skipping out-of-order bar"
                );
                return Ok(None);
            }
        }
        self.last_timestamp = Some(kline.timestamp);
        if self.equity_curve.is_empty() {
            self.equity_curve.push(EquityPoint {
                timestamp: kline.timestamp,
                equity: self.portfolio.initial_capital(),
            });
        }

        // --- 2. History ---
        self.history.push(kline.clone());
        if self.history.len() >= self.history_window * 2 {
            let excess = self.history.len() - self.history_window;
            self.history.drain(..excess);
        }
        self.bars_seen += 1;

        // --- 3. Decision ---
        let (market_state, events) = if self.bars_seen > self.warmup_bars {
            let start = self.history.len().saturating_sub(self.history_window);
            let market_state = self.classifier.classify(&self.history[start..]);
            match self.run_cycle(&kline, &market_state, inputs) {
                Ok(events) => (Some(market_state), events),
                Err(e) => {
                    self.settle_phase();
                    return Err(e);
                }
            }
        } else {
            (None, Vec::new())
        };
        self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);

        // --- 4. Equity ---
        let equity = self.portfolio.equity(kline.close);
        self.equity_curve.push(EquityPoint { timestamp: kline.timestamp, equity });

        Ok(Some(CycleOutcome { timestamp: kline.timestamp, market_state, events, equity }))
    }

    /// Closes the open position at `price` with reason `forced`. The last equity
    /// point is restated to include the exit costs.
    pub fn force_close(
        &mut self,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Trade>, EngineError> {
        if self.portfolio.position().is_none() {
            return Ok(None);
        }
        let mut events = Vec::new();
        let trade = match self.close_position(price, ExitReason::Forced, timestamp, &mut events) {
            Ok(trade) => trade,
            Err(e) => {
                self.settle_phase();
                return Err(e);
            }
        };
        let equity = self.portfolio.equity(price);
        match self.equity_curve.last_mut() {
            Some(point) if point.timestamp == timestamp => point.equity = equity,
            _ => self.equity_curve.push(EquityPoint { timestamp, equity }),
        }
        Ok(Some(trade))
    }

    fn run_cycle(
        &mut self,
        kline: &Kline,
        market_state: &MarketState,
        inputs: &CycleInputs,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let mut events = Vec::new();

        // ---===[ Exits and protection ]===---
        if self.portfolio.position().is_some() {
            self.manage_position(kline, market_state, inputs, &mut events)?;
        }

        // ---===[ Parameter adaptation ]===---
        let flat = self.portfolio.position().is_none();
        if let Some(switch) =
            self.adaptation.as_mut().and_then(|a| a.observe(market_state.regime, flat))
        {
            info!(
                symbol = %self.symbol,
                from = ?switch.from,
                to = ?switch.to,
                "Switched strategy parameters"
            );
            events.push(EngineEvent::StrategySwitched {
                timestamp: kline.timestamp,
                from: switch.from,
                to: switch.to,
            });
        }

        // ---===[ Entries ]===---
        if self.portfolio.position().is_none() {
            if !inputs.allow_entries {
                debug!(symbol = %self.symbol, "Entries disabled for this cycle");
            } else if self.cooldown_remaining > 0 {
                debug!(
                    symbol = %self.symbol,
                    remaining = self.cooldown_remaining,
                    "Loss-streak cooldown; skipping entries"
                );
            } else {
                self.try_enter(kline, market_state, inputs.advisory.as_ref(), &mut events)?;
            }
        }
        Ok(events)
    }

    /// `should_exit`, then the protection levels, then one orbit step.
    fn manage_position(
        &mut self,
        kline: &Kline,
        market_state: &MarketState,
        inputs: &CycleInputs,
        events: &mut Vec<EngineEvent>,
    ) -> Result<(), EngineError> {
        let start = self.history.len().saturating_sub(self.history_window);
        let exit = {
            let Some(position) = self.portfolio.position() else {
                return Ok(());
            };
            let context = MarketContext {
                symbol: &self.symbol,
                klines: &self.history[start..],
                equity: self.portfolio.equity(kline.close),
                position: Some(position),
                market_state,
                advisory: inputs.advisory.as_ref(),
            };
            if self.active_strategy().should_exit(&context, position) {
                Some((ExitReason::SignalExit, kline.close))
            } else {
                self.risk_manager
                    .check_exit(position, kline)
                    .map(|trigger| (trigger.reason, trigger.price))
            }
        };
        if let Some((reason, price)) = exit {
            self.close_position(price, reason, kline.timestamp, events)?;
            return Ok(());
        }

        if !inputs.allow_protection_updates {
            return Ok(());
        }
        let Some(position) = self.portfolio.position() else {
            return Ok(());
        };
        let previous = position.protection.clone();
        if let Some(current) =
            self.risk_manager.update_protection(position, kline.close, kline.timestamp)?
        {
            info!(
                symbol = %self.symbol,
                level = %current.level,
                stop_loss = %current.current_stop_loss,
                take_profit = %current.current_take_profit,
                lock_ratio = ?current.lock_ratio_applied,
                "Protection updated"
            );
            self.portfolio.set_protection(current.clone())?;
            events.push(EngineEvent::ProtectionUpdated { timestamp: kline.timestamp, previous, current });
        }
        Ok(())
    }

    fn try_enter(
        &mut self,
        kline: &Kline,
        market_state: &MarketState,
        advisory: Option<&Advisory>,
        events: &mut Vec<EngineEvent>,
    ) -> Result<(), EngineError> {
        let start = self.history.len().saturating_sub(self.history_window);
        let (signal, sizing) = {
            let context = MarketContext {
                symbol: &self.symbol,
                klines: &self.history[start..],
                equity: self.portfolio.equity(kline.close),
                position: None,
                market_state,
                advisory,
            };
            let Some(signal) = self.active_strategy().generate_signal(&context) else {
                return Ok(());
            };
            let sizing = self.risk_manager.size_position(&signal, &context);
            (signal, sizing)
        };
        let Some(side) = signal.direction.side() else {
            return Ok(());
        };
        self.phase = Phase::Opening;

        // --- 1. Sizing ---
        let sizing = match sizing {
            Ok(sizing) => sizing,
            Err(error @ RiskError::InvariantViolation { .. }) => return Err(error.into()),
            Err(error) => {
                self.reject(&signal, kline.timestamp, error, events);
                return Ok(());
            }
        };

        // --- 2. Initial protection ---
        let protection =
            match self.risk_manager.initial_protection(&signal, market_state, kline.timestamp) {
                Ok(protection) => protection,
                Err(error @ RiskError::InvariantViolation { .. }) => return Err(error.into()),
                Err(error) => {
                    self.reject(&signal, kline.timestamp, error, events);
                    return Ok(());
                }
            };

        // --- 3. Fill and book ---
        let fill = self.executor.execute(&FillRequest {
            side,
            leg: Leg::Entry,
            price: signal.entry_price,
            size: sizing.size,
            timestamp: kline.timestamp,
        })?;
        let position = fill.into_position(&self.symbol, sizing.leverage, sizing.risk_amount, protection)?;
        info!(
            symbol = %self.symbol,
            side = ?position.side,
            entry = %position.entry_price,
            size = %position.size,
            stop_loss = %position.protection.current_stop_loss,
            take_profit = %position.protection.current_take_profit,
            regime = %market_state.regime,
            "Position opened"
        );
        self.portfolio.open(position.clone())?;
        self.phase = Phase::Open;
        events.push(EngineEvent::PositionOpened { position });
        Ok(())
    }

    fn reject(
        &mut self,
        signal: &core_types::StrategySignal,
        timestamp: DateTime<Utc>,
        error: RiskError,
        events: &mut Vec<EngineEvent>,
    ) {
        warn!(
            symbol = %self.symbol,
            direction = ?signal.direction,
            entry = %signal.entry_price,
            error = %error,
            "Signal rejected; staying flat"
        );
        self.phase = Phase::Flat;
        events.push(EngineEvent::SignalRejected {
            timestamp,
            direction: signal.direction,
            reason: error.to_string(),
        });
    }

    fn close_position(
        &mut self,
        price: Decimal,
        reason: ExitReason,
        timestamp: DateTime<Utc>,
        events: &mut Vec<EngineEvent>,
    ) -> Result<Trade, EngineError> {
        let (side, size) = match self.portfolio.position() {
            Some(position) => (position.side, position.size),
            None => return Err(EngineError::Invariant("no open position to close".to_string())),
        };
        self.phase = Phase::Closing;
        let fill = self.executor.execute(&FillRequest { side, leg: Leg::Exit, price, size, timestamp })?;
        let trade = self.portfolio.close(&fill, reason)?;
        self.phase = Phase::Flat;
        info!(
            symbol = %self.symbol,
            reason = ?trade.exit_reason,
            exit = %trade.exit_price,
            realized_pnl = %trade.realized_pnl,
            "Position closed"
        );
        events.push(EngineEvent::PositionClosed { trade: trade.clone() });
        self.record_outcome(&trade, timestamp, events);
        Ok(trade)
    }

    fn record_outcome(&mut self, trade: &Trade, timestamp: DateTime<Utc>, events: &mut Vec<EngineEvent>) {
        // Break-even trades extend the streak, matching `Trade::is_win`.
        if !trade.is_win() {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
        if self.max_consecutive_losses == 0
            || self.loss_cooldown_bars == 0
            || self.consecutive_losses < self.max_consecutive_losses
        {
            return;
        }
        warn!(
            symbol = %self.symbol,
            losses = self.consecutive_losses,
            cooldown_bars = self.loss_cooldown_bars,
            "Loss streak; pausing entries"
        );
        events.push(EngineEvent::EntriesHalted {
            timestamp,
            reason: format!(
                "{} consecutive losses; entries paused for {} bars",
                self.consecutive_losses, self.loss_cooldown_bars
            ),
        });
        self.cooldown_remaining = self.loss_cooldown_bars;
        self.consecutive_losses = 0;
    }

    fn active_strategy(&self) -> &dyn Strategy {
        self.adaptation
            .as_ref()
            .and_then(RegimeAdaptation::active_strategy)
            .unwrap_or(self.strategy.as_ref())
    }

    fn settle_phase(&mut self) {
        self.phase = if self.portfolio.position().is_some() { Phase::Open } else { Phase::Flat };
    }
}

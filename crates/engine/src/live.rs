//! The live polling loop.
//!
//! Drives the same `ExecutionEngine` as the backtester. The only suspension points
//! are the calls to the external collaborators, each bounded by `io_timeout`.

use crate::circuit_breaker::CircuitBreaker;
use crate::error::EngineError;
use crate::execution::{CycleInputs, ExecutionEngine};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::LiveConfig;
use core_types::{Advisory, Kline};
use events::{EngineEvent, KlineData, LogLevel, LogMessage, PortfolioState, WsMessage};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Source of closed bars.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Bars closed after `after` (or the most recent ones when `None`), oldest first.
    async fn poll(&self, symbol: &str, after: Option<DateTime<Utc>>) -> Result<Vec<Kline>, EngineError>;
}

/// The external advisory layer.
#[async_trait]
pub trait AdvisoryProvider: Send + Sync {
    async fn advise(&self, symbol: &str, recent: &[Kline]) -> Result<Option<Advisory>, EngineError>;
}

/// Mirrors engine state transitions on the exchange.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn apply(&self, event: &EngineEvent) -> Result<(), EngineError>;
}

async fn bounded<T>(
    operation: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout { operation, after }),
    }
}

/// Outcome of a single poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleHealth {
    Healthy,
    Degraded,
}

pub struct LiveRunner {
    // --- Configuration ---
    config: LiveConfig,

    // --- Collaborators ---
    engine: ExecutionEngine,
    feed: Arc<dyn MarketDataFeed>,
    advisory: Option<Arc<dyn AdvisoryProvider>>,
    gateway: Arc<dyn ExchangeGateway>,
    event_tx: broadcast::Sender<WsMessage>,

    // --- Internal State ---
    breaker: CircuitBreaker,
    consecutive_failures: u32,
    entries_halted: bool,
    last_seen: Option<DateTime<Utc>>,
    /// Transitions the gateway has not confirmed, oldest first.
    pending: VecDeque<EngineEvent>,
}

impl LiveRunner {
    pub fn new(
        config: LiveConfig,
        engine: ExecutionEngine,
        feed: Arc<dyn MarketDataFeed>,
        advisory: Option<Arc<dyn AdvisoryProvider>>,
        gateway: Arc<dyn ExchangeGateway>,
        event_tx: broadcast::Sender<WsMessage>,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.advisory.clone());
        Self {
            config,
            engine,
            feed,
            advisory,
            gateway,
            event_tx,
            breaker,
            consecutive_failures: 0,
            entries_halted: false,
            last_seen: None,
            pending: VecDeque::new(),
        }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn entries_halted(&self) -> bool {
        self.entries_halted
    }

    /// Failed cycles in a row.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Transitions waiting to be mirrored on the exchange.
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    /// Polls every `poll_interval` until `shutdown` flips to `true` or its sender is
    /// dropped. A stop request is only observed between cycles.
    ///
    /// Returns the engine on a clean stop, or the invariant violation that ended the loop.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<ExecutionEngine, EngineError> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            symbol = %self.engine.symbol(),
            interval = ?self.config.poll_interval,
            "Live loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle().await?;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(symbol = %self.engine.symbol(), "Live loop stopped");
        Ok(self.engine)
    }

    /// One poll: replay unmirrored events, fetch new bars, consult the advisory,
    /// run the engine on each bar and mirror the resulting transitions.
    ///
    /// Events the gateway rejects stay queued in order and are retried first on
    /// the next cycle. New entries are blocked while the queue is not empty. A
    /// cycle counts as at most one failure however many calls failed in it.
    pub async fn cycle(&mut self) -> Result<CycleHealth, EngineError> {
        let timeout = self.config.io_timeout;
        let symbol = self.engine.symbol().to_string();
        let mut failure: Option<EngineError> = None;

        // --- 1. Unmirrored events ---
        if let Err(e) = self.replay_pending().await {
            failure = Some(e);
        }

        // --- 2. Market data ---
        let bars = match bounded("feed poll", timeout, self.feed.poll(&symbol, self.last_seen)).await {
            Ok(bars) => bars,
            Err(e) => return Ok(self.finish(Some(e))),
        };
        if bars.is_empty() {
            tracing::debug!(symbol = %symbol, "No new bars");
            return Ok(self.finish(failure));
        }

        // --- 3. Advisory ---
        let mut inputs = match self.fetch_advisory(&symbol, &bars).await {
            Ok(advisory) => CycleInputs { advisory, ..CycleInputs::default() },
            Err(e) => {
                failure = Some(e);
                CycleInputs::degraded()
            }
        };
        if self.entries_halted || !self.pending.is_empty() {
            inputs.allow_entries = false;
        }

        // --- 4. Decisions ---
        for bar in bars {
            self.last_seen = Some(self.last_seen.map_or(bar.timestamp, |seen| seen.max(bar.timestamp)));
            let Some(outcome) = self.engine.on_kline(bar.clone(), &inputs)? else {
                continue;
            };
            self.publish(WsMessage::KlineData(KlineData { symbol: symbol.clone(), kline: bar }));
            for event in outcome.events {
                self.publish(WsMessage::Engine(event.clone()));
                if !self.pending.is_empty() {
                    // Keep exchange order; this one waits behind the unmirrored ones.
                    self.pending.push_back(event);
                    continue;
                }
                if let Err(e) = bounded("gateway", timeout, self.gateway.apply(&event)).await {
                    tracing::warn!(error = %e, ?event, "Gateway rejected the transition; retrying next cycle");
                    self.pending.push_back(event);
                    inputs.allow_entries = false;
                    failure = Some(e);
                }
            }
            let portfolio = self.engine.portfolio();
            self.publish(WsMessage::PortfolioState(PortfolioState {
                timestamp: outcome.timestamp,
                balance: portfolio.balance(),
                equity: outcome.equity,
                position: portfolio.position().cloned(),
            }));
        }

        Ok(self.finish(failure))
    }

    /// Applies queued events oldest first, stopping at the first failure.
    async fn replay_pending(&mut self) -> Result<(), EngineError> {
        while let Some(event) = self.pending.front() {
            bounded("gateway", self.config.io_timeout, self.gateway.apply(event)).await?;
            tracing::info!(?event, "Mirrored a queued transition");
            self.pending.pop_front();
        }
        Ok(())
    }

    fn finish(&mut self, failure: Option<EngineError>) -> CycleHealth {
        match failure {
            Some(e) => {
                self.record_failure(&e);
                CycleHealth::Degraded
            }
            None => {
                self.consecutive_failures = 0;
                CycleHealth::Healthy
            }
        }
    }

    /// The advisory, if any. A call skipped by the open circuit is not a failure.
    async fn fetch_advisory(&mut self, symbol: &str, bars: &[Kline]) -> Result<Option<Advisory>, EngineError> {
        let Some(provider) = self.advisory.clone() else {
            return Ok(None);
        };
        if !self.breaker.allow_request(Instant::now()) {
            tracing::debug!("Advisory circuit open; continuing without advisory");
            return Ok(None);
        }
        match bounded("advisory", self.config.io_timeout, provider.advise(symbol, bars)).await {
            Ok(advisory) => {
                self.breaker.record_success();
                Ok(advisory)
            }
            Err(e) => {
                self.breaker.record_failure(Instant::now());
                Err(e)
            }
        }
    }

    fn record_failure(&mut self, error: &EngineError) {
        self.consecutive_failures += 1;
        tracing::warn!(
            error = %error,
            consecutive = self.consecutive_failures,
            "Live cycle degraded; holding protection and skipping entries"
        );
        if self.entries_halted || self.consecutive_failures < self.config.max_consecutive_io_failures {
            return;
        }
        self.entries_halted = true;
        let reason = format!("{} consecutive I/O failures; last: {error}", self.consecutive_failures);
        tracing::error!(symbol = %self.engine.symbol(), %reason, "New entries halted");
        self.publish(WsMessage::Log(LogMessage {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            message: format!("ENTRIES HALTED for {}: {reason}", self.engine.symbol()),
        }));
        let timestamp = self.last_seen.unwrap_or_else(Utc::now);
        self.publish(WsMessage::Engine(EngineEvent::EntriesHalted { timestamp, reason }));
    }

    fn publish(&self, message: WsMessage) {
        // No subscribers is not an error.
        let _ = self.event_tx.send(message);
    }
}

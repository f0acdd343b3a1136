//! Circuit breaker around the advisory provider.

use configuration::CircuitBreakerConfig;
use std::collections::VecDeque;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls go through. Failures are counted inside the failure window.
    Closed,
    /// Calls are skipped until the cooldown ends.
    Open { until: Instant },
    /// One trial call is in flight; its result closes or reopens the circuit.
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failures: VecDeque<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config, state: CircuitState::Closed, failures: VecDeque::new() }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a call may be made now. Moves `Open` to `HalfOpen` once the cooldown
    /// has passed, admitting exactly one trial call.
    pub fn allow_request(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open { until } if now >= until => {
                tracing::info!("Advisory circuit half-open; sending a trial call");
                self.state = CircuitState::HalfOpen;
                true
            }
            CircuitState::Open { .. } | CircuitState::HalfOpen => false,
        }
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!("Advisory circuit closed");
        }
        self.state = CircuitState::Closed;
        self.failures.clear();
    }

    pub fn record_failure(&mut self, now: Instant) {
        match self.state {
            CircuitState::HalfOpen => self.open(now),
            CircuitState::Open { .. } => {}
            CircuitState::Closed => {
                self.failures.push_back(now);
                while let Some(first) = self.failures.front() {
                    if now.duration_since(*first) > self.config.failure_window {
                        self.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if self.failures.len() as u32 >= self.config.failure_threshold {
                    self.open(now);
                }
            }
        }
    }

    fn open(&mut self, now: Instant) {
        tracing::warn!(cooldown = ?self.config.cooldown, "Advisory circuit opened");
        self.state = CircuitState::Open { until: now + self.config.cooldown };
        self.failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(120),
        })
    }

    #[test]
    fn opens_after_threshold_failures_within_the_window() {
        let mut breaker = breaker();
        let t0 = Instant::now();
        breaker.record_failure(t0);
        breaker.record_failure(t0 + Duration::from_secs(10));
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure(t0 + Duration::from_secs(20));
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));
        assert!(!breaker.allow_request(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn failures_outside_the_window_are_forgotten() {
        let mut breaker = breaker();
        let t0 = Instant::now();
        breaker.record_failure(t0);
        breaker.record_failure(t0 + Duration::from_secs(30));
        breaker.record_failure(t0 + Duration::from_secs(100));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_admits_one_trial_and_closes_on_success() {
        let mut breaker = breaker();
        let t0 = Instant::now();
        for i in 0..3 {
            breaker.record_failure(t0 + Duration::from_secs(i));
        }
        let after_cooldown = t0 + Duration::from_secs(200);
        assert!(breaker.allow_request(after_cooldown));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.allow_request(after_cooldown));
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request(after_cooldown));
    }

    #[test]
    fn a_failed_trial_reopens_the_circuit() {
        let mut breaker = breaker();
        let t0 = Instant::now();
        for i in 0..3 {
            breaker.record_failure(t0 + Duration::from_secs(i));
        }
        let trial = t0 + Duration::from_secs(200);
        assert!(breaker.allow_request(trial));
        breaker.record_failure(trial);
        assert_eq!(breaker.state(), CircuitState::Open { until: trial + Duration::from_secs(120) });
    }
}

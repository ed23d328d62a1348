//! Circuit breakers for flaky external dependencies.
//!
//! Each breaker is a closed/open/half-open state machine. A process-wide
//! registry hands out breakers keyed by `(kind, identity)` so providers,
//! translation backends and media servers each get their own.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Breaker state, as exposed by `status()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before a half-open probe.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    total_failures: u64,
    total_successes: u64,
    opened_at: Option<Instant>,
    /// Set while a half-open probe is in flight; blocks concurrent probes.
    probing: bool,
}

/// A single circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                total_failures: 0,
                total_successes: 0,
                opened_at: None,
                probing: false,
            }),
        }
    }

    /// May a call proceed right now?
    ///
    /// Closed always permits. Open permits a single half-open probe once the
    /// cooldown has elapsed; further callers are rejected until the probe
    /// reports back via `record_success`/`record_failure`.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                if inner.probing {
                    false
                } else {
                    inner.probing = true;
                    true
                }
            }
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    inner.probing = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_successes += 1;
        inner.consecutive_failures = 0;
        inner.probing = false;
        if inner.state != BreakerState::Closed {
            tracing::info!("Circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.probing = false;

        let should_open = match inner.state {
            // Failed probe re-opens immediately
            BreakerState::HalfOpen => true,
            BreakerState::Closed => {
                inner.consecutive_failures >= self.config.failure_threshold
            }
            BreakerState::Open => false,
        };

        if should_open {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            tracing::warn!(
                failures = inner.consecutive_failures,
                "Circuit breaker opened"
            );
        }
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock().unwrap();
        BreakerStatus {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
        }
    }

    /// True while the breaker rejects regular calls (cooldown not elapsed).
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                elapsed < self.config.cooldown
            }
            BreakerState::HalfOpen | BreakerState::Closed => false,
        }
    }
}

/// Process-wide registry of breakers keyed by `(kind, identity)`.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<(String, String), std::sync::Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch (or lazily create) the breaker for an identity.
    pub fn get(&self, kind: &str, identity: &str) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry((kind.to_string(), identity.to_string()))
            .or_insert_with(|| {
                std::sync::Arc::new(CircuitBreaker::new(self.config.clone()))
            })
            .clone()
    }

    /// Status of every known breaker, for the providers/stats endpoint.
    pub fn all_status(&self) -> Vec<(String, String, BreakerStatus)> {
        let breakers = self.breakers.lock().unwrap();
        breakers
            .iter()
            .map(|((kind, identity), b)| (kind.clone(), identity.clone(), b.status()))
            .collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

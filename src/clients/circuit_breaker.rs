//! Three-state failure isolation for a single upstream.
//!
//! `Closed` admits everything and counts consecutive failures. Reaching
//! `max_failures` opens the breaker, which rejects calls until
//! `reset_timeout` has elapsed since it opened; the next attempt after that
//! moves to `HalfOpen` and is admitted as a probe. Any recorded success closes
//! the breaker again.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::AppError;

pub const DEFAULT_MAX_FAILURES: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen,
}

impl CircuitState {
    pub fn name(&self) -> CircuitStateName {
        match self {
            CircuitState::Closed => CircuitStateName::Closed,
            CircuitState::Open { .. } => CircuitStateName::Open,
            CircuitState::HalfOpen => CircuitStateName::HalfOpen,
        }
    }
}

/// Serializable tag for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStateName {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    max_failures: u32,
    reset_timeout: Duration,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            max_failures: max_failures.max(1),
            reset_timeout,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
            }),
        }
    }

    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT)
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub async fn failures(&self) -> u32 {
        self.inner.read().await.failures
    }

    /// Admission check. May transition `Open -> HalfOpen`, so it takes the
    /// write lock up front.
    pub async fn can_request(&self) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() > self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(breaker = %self.name, "Circuit half-open, admitting probe");
                    Ok(())
                } else {
                    Err(AppError::CircuitOpen)
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        if inner.state != CircuitState::Closed {
            tracing::info!(breaker = %self.name, "Circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.failures = inner.failures.saturating_add(1);
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open {
                    opened_at: Instant::now(),
                };
                tracing::warn!(breaker = %self.name, "Probe failed, circuit re-opened");
            }
            CircuitState::Closed if inner.failures >= self.max_failures => {
                inner.state = CircuitState::Open {
                    opened_at: Instant::now(),
                };
                tracing::warn!(
                    breaker = %self.name,
                    failures = inner.failures,
                    "Circuit opened"
                );
            }
            // Late failures from calls admitted before opening do not extend the timeout.
            CircuitState::Closed | CircuitState::Open { .. } => {}
        }
    }
}

//! Circuit breaker for provider calls.
//!
//! A provider that keeps failing with transient errors (network down, 5xx,
//! timeouts) would otherwise cost every remaining reference the full
//! timeout and retry budget. The breaker tracks consecutive transient
//! failures per provider:
//!
//! - **Closed**: calls pass through
//! - **Open**: calls are rejected without touching the network
//! - **Half-Open**: the cooldown has passed; calls pass through again, and
//!   the next failure reopens the circuit while a success closes it
//!
//! # Usage
//!
//! ```rust
//! use reference_checker::utils::{CircuitBreaker, CircuitState};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new("crossref", 2, Duration::from_secs(60));
//! breaker.record_failure();
//! breaker.record_failure();
//!
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(!breaker.allows_request());
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct Tally {
    consecutive_failures: usize,
    opened_at: Option<Instant>,
}

/// Per-provider circuit breaker
///
/// A `failure_threshold` of zero disables the breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: usize,
    cooldown: Duration,
    tally: Mutex<Tally>,
}

impl CircuitBreaker {
    pub fn new(name: &str, failure_threshold: usize, cooldown: Duration) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold,
            cooldown,
            tally: Mutex::new(Tally::default()),
        }
    }

    /// A breaker that never opens
    pub fn disabled(name: &str) -> Self {
        Self::new(name, 0, Duration::ZERO)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_of(&self, tally: &Tally) -> CircuitState {
        match tally.opened_at {
            None => CircuitState::Closed,
            Some(at) if at.elapsed() >= self.cooldown => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state_of(&self.lock())
    }

    /// Whether a call to the provider may go out now
    pub fn allows_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// The provider answered (even if the answer was "not found")
    pub fn record_success(&self) {
        let mut tally = self.lock();
        if tally.opened_at.take().is_some() {
            tracing::info!("{}: provider recovered, circuit closed", self.name);
        }
        tally.consecutive_failures = 0;
    }

    /// The provider failed with a transient error after all retries
    pub fn record_failure(&self) {
        if self.failure_threshold == 0 {
            return;
        }

        let mut tally = self.lock();
        tally.consecutive_failures += 1;

        match self.state_of(&tally) {
            CircuitState::Closed if tally.consecutive_failures >= self.failure_threshold => {
                tally.opened_at = Some(Instant::now());
                tracing::warn!(
                    "{}: circuit opened after {} consecutive failures",
                    self.name,
                    tally.consecutive_failures
                );
            }
            CircuitState::HalfOpen => {
                tally.opened_at = Some(Instant::now());
                tracing::warn!("{}: still failing, circuit reopened", self.name);
            }
            _ => {}
        }
    }
}

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Circuit state of one live source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed calls that open the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before a half-open trial call.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Circuit {
    Closed,
    Open { reopens_at: Instant },
    /// One trial call is in flight. An abandoned trial is replaced after `open_timeout`.
    HalfOpen { trial_expires_at: Instant },
}

#[derive(Debug)]
struct Tracker {
    circuit: Circuit,
    failures: u32,
}

/// Thread-safe breaker guarding one source. Times come from the tokio clock.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    tracker: Mutex<Tracker>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            tracker: Mutex::new(Tracker {
                circuit: Circuit::Closed,
                failures: 0,
            }),
        }
    }

    pub const fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Admits a call, or returns how long the caller should stay away.
    ///
    /// An open circuit past its timeout turns half-open and admits exactly one
    /// trial call; other callers are refused until it records its outcome.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut tracker = self.lock();
        let now = Instant::now();
        let wait = match tracker.circuit {
            Circuit::Closed => return Ok(()),
            Circuit::Open { reopens_at } => reopens_at.saturating_duration_since(now),
            Circuit::HalfOpen { trial_expires_at } => trial_expires_at.saturating_duration_since(now),
        };
        if !wait.is_zero() {
            return Err(wait);
        }

        debug!("circuit half-open, admitting trial call");
        tracker.circuit = Circuit::HalfOpen {
            trial_expires_at: now + self.config.open_timeout,
        };
        Ok(())
    }

    pub fn record_success(&self) {
        let mut tracker = self.lock();
        tracker.circuit = Circuit::Closed;
        tracker.failures = 0;
    }

    /// Counts a failed call. A failed trial call, or reaching the threshold, opens the circuit.
    pub fn record_failure(&self) {
        let mut tracker = self.lock();
        tracker.failures = tracker.failures.saturating_add(1);

        let trips = matches!(tracker.circuit, Circuit::HalfOpen { .. })
            || tracker.failures >= self.config.failure_threshold;
        if trips {
            debug!(failures = tracker.failures, "circuit opened");
            tracker.circuit = Circuit::Open {
                reopens_at: Instant::now() + self.config.open_timeout,
            };
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.lock().circuit {
            Circuit::Closed => CircuitState::Closed,
            Circuit::Open { .. } => CircuitState::Open,
            Circuit::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().failures
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tracker> {
        self.tracker
            .lock()
            .expect("circuit breaker lock is not poisoned")
    }
}

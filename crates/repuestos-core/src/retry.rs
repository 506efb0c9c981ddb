//! Retry logic with strictly increasing backoff.
//!
//! Only retryable [`SourceError`]s (rate limited, unavailable) are retried.
//! A [`RetryPolicy`] is validated up front so the cumulative wait of one
//! call can never exceed [`MAX_TOTAL_WAIT`].

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::{SourceError, ValidationError};

/// Upper bound on the summed backoff delays of a single call.
pub const MAX_TOTAL_WAIT: Duration = Duration::from_secs(180);

/// Backoff strategy between attempts. Both variants grow on every retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `step * (retry + 1)`.
    Linear {
        step: Duration,
    },
    /// `base * factor ^ retry`, with `factor > 1`.
    Exponential {
        base: Duration,
        factor: f64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(2),
            factor: 3.0,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Linear { step } => step.saturating_mul(retry.saturating_add(1)),
            Self::Exponential { base, factor } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
            }
        }
    }

    fn validate(self) -> Result<(), ValidationError> {
        let increasing = match self {
            Self::Linear { step } => !step.is_zero(),
            Self::Exponential { base, factor } => !base.is_zero() && factor.is_finite() && factor > 1.0,
        };
        if increasing {
            Ok(())
        } else {
            Err(ValidationError::NonIncreasingBackoff)
        }
    }
}

/// Retry configuration for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    max_attempts: u32,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Builds a validated policy.
    ///
    /// # Errors
    /// Fails when no attempt is allowed, when the backoff does not grow, or
    /// when the summed delays exceed [`MAX_TOTAL_WAIT`].
    pub fn new(max_attempts: u32, backoff: Backoff) -> Result<Self, ValidationError> {
        if max_attempts == 0 {
            return Err(ValidationError::NoAttempts);
        }
        backoff.validate()?;

        let policy = Self {
            max_attempts,
            backoff,
        };
        let total = policy.total_backoff();
        if total > MAX_TOTAL_WAIT {
            return Err(ValidationError::UnboundedBackoff {
                total_ms: total.as_millis(),
                bound_ms: MAX_TOTAL_WAIT.as_millis(),
            });
        }
        Ok(policy)
    }

    /// A single attempt with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::default(),
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Sum of every delay the policy may wait.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|retry| self.backoff.delay(retry))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Runs `call` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `call` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut call: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut delays = Vec::new();
        let mut attempt = 1;

        loop {
            match call(attempt).await {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                        delays,
                    }
                }
                Err(error) if !error.retryable() => {
                    return RetryOutcome::Fatal {
                        error,
                        attempts: attempt,
                        delays,
                    }
                }
                Err(error) if attempt >= self.max_attempts => {
                    return RetryOutcome::Exhausted {
                        error,
                        attempts: attempt,
                        delays,
                    }
                }
                Err(error) => {
                    let delay = self.backoff.delay(attempt - 1);
                    debug!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        code = error.code(),
                        "retrying after transient source error"
                    );
                    delays.push(delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Result of a retried call.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Succeeded {
        value: T,
        attempts: u32,
        delays: Vec<Duration>,
    },
    /// Every attempt failed with a retryable error.
    Exhausted {
        error: SourceError,
        attempts: u32,
        delays: Vec<Duration>,
    },
    /// A non-retryable error ended the call.
    Fatal {
        error: SourceError,
        attempts: u32,
        delays: Vec<Duration>,
    },
}

impl<T> RetryOutcome<T> {
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Fatal { attempts, .. } => *attempts,
        }
    }

    pub fn delays(&self) -> &[Duration] {
        match self {
            Self::Succeeded { delays, .. }
            | Self::Exhausted { delays, .. }
            | Self::Fatal { delays, .. } => delays,
        }
    }
}

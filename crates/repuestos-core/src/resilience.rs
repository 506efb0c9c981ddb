//! Resilience wrapper around one live source: circuit breaker plus retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::{PartSource, Repuesto, SearchQuery, SourceError, SourceId};

/// How a source call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    Succeeded,
    /// Registered but switched off, for example for lack of credentials.
    Disabled,
    /// Retryable failures used up every attempt, or the circuit is open.
    Exhausted(SourceError),
    /// A non-retryable error ended the call.
    Failed(SourceError),
}

/// Outcome of one wrapped source call.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: SourceId,
    pub listings: Vec<Repuesto>,
    pub status: SourceStatus,
    pub attempts: u32,
    pub delays: Vec<Duration>,
    pub latency_ms: u64,
}

impl SourceReport {
    /// Error that saturated this source, if any.
    pub fn saturation(&self) -> Option<&SourceError> {
        match &self.status {
            SourceStatus::Exhausted(error) => Some(error),
            _ => None,
        }
    }

    /// Non-retryable error that points at a broken integration, if any.
    pub fn fatal_error(&self) -> Option<&SourceError> {
        match &self.status {
            SourceStatus::Failed(error) if error.kind().is_fatal() => Some(error),
            _ => None,
        }
    }
}

/// A live source wrapped with its retry policy and circuit breaker.
pub struct ResilientSource {
    source: Arc<dyn PartSource>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl ResilientSource {
    pub fn new(source: Arc<dyn PartSource>, retry: RetryPolicy) -> Self {
        Self::with_breaker(source, retry, CircuitBreakerConfig::default())
    }

    pub fn with_breaker(
        source: Arc<dyn PartSource>,
        retry: RetryPolicy,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            source,
            retry,
            breaker: CircuitBreaker::new(breaker),
        }
    }

    pub fn id(&self) -> SourceId {
        self.source.id()
    }

    pub fn enabled(&self) -> bool {
        self.source.enabled()
    }

    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn search(&self, query: &SearchQuery) -> SourceReport {
        let source = self.source.id();
        let started = tokio::time::Instant::now();
        let report = |listings: Vec<Repuesto>, status: SourceStatus, attempts: u32, delays: Vec<Duration>| SourceReport {
            source,
            listings,
            status,
            attempts,
            delays,
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        if !self.source.enabled() {
            debug!(%source, "source disabled, skipping");
            return report(Vec::new(), SourceStatus::Disabled, 0, Vec::new());
        }

        if let Err(remaining) = self.breaker.try_acquire() {
            let error = SourceError::unavailable(format!(
                "{source} circuit open for another {}s",
                remaining.as_secs()
            ));
            debug!(%source, "circuit open, skipping");
            return report(Vec::new(), SourceStatus::Exhausted(error), 0, Vec::new());
        }

        let outcome = self
            .retry
            .run(|attempt| {
                debug!(%source, attempt, "querying source");
                self.source.fetch(query)
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded {
                value,
                attempts,
                delays,
            } => {
                self.breaker.record_success();
                debug!(%source, count = value.len(), attempts, "source succeeded");
                report(value, SourceStatus::Succeeded, attempts, delays)
            }
            RetryOutcome::Exhausted {
                error,
                attempts,
                delays,
            } => {
                self.breaker.record_failure();
                warn!(%source, attempts, code = error.code(), "source exhausted retries: {}", error.message());
                report(Vec::new(), SourceStatus::Exhausted(error), attempts, delays)
            }
            RetryOutcome::Fatal {
                error,
                attempts,
                delays,
            } => {
                if error.kind().is_fatal() {
                    self.breaker.record_failure();
                } else {
                    self.breaker.record_success();
                }
                warn!(%source, attempts, code = error.code(), "source failed: {}", error.message());
                report(Vec::new(), SourceStatus::Failed(error), attempts, delays)
            }
        }
    }
}

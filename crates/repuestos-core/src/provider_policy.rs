use std::time::Duration;

use crate::retry::{Backoff, RetryPolicy};
use crate::SourceId;

/// Local budget for a metered upstream: at most `limit` calls per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub window: Duration,
    pub limit: u32,
}

/// Per-source request limits and retry behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePolicy {
    pub source_id: SourceId,
    pub timeout: Duration,
    pub max_items: usize,
    pub retry: RetryPolicy,
    pub quota: Option<QuotaPolicy>,
}

impl SourcePolicy {
    pub fn marketplace_default() -> Self {
        Self {
            source_id: SourceId::Marketplace,
            timeout: Duration::from_secs(8),
            max_items: 50,
            retry: RetryPolicy::new(
                2,
                Backoff::Exponential {
                    base: Duration::from_secs(1),
                    factor: 2.0,
                },
            )
            .unwrap_or_default(),
            quota: None,
        }
    }

    pub fn classifieds_default() -> Self {
        Self {
            source_id: SourceId::Classifieds,
            max_items: 15,
            ..Self::marketplace_default()
        }
    }

    /// Paid upstream: retried at 2s then 6s, and kept under a local budget.
    pub fn generative_default() -> Self {
        Self {
            source_id: SourceId::Generative,
            timeout: Duration::from_secs(30),
            max_items: 5,
            retry: RetryPolicy::default(),
            quota: Some(QuotaPolicy {
                window: Duration::from_secs(60),
                limit: 10,
            }),
        }
    }

    pub fn synthetic_default() -> Self {
        Self {
            source_id: SourceId::Synthetic,
            timeout: Duration::from_secs(1),
            max_items: 5,
            retry: RetryPolicy::no_retry(),
            quota: None,
        }
    }

    pub fn default_for(source_id: SourceId) -> Self {
        match source_id {
            SourceId::Marketplace => Self::marketplace_default(),
            SourceId::Classifieds => Self::classifieds_default(),
            SourceId::Generative => Self::generative_default(),
            SourceId::Synthetic => Self::synthetic_default(),
        }
    }
}

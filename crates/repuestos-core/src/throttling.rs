use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::provider_policy::QuotaPolicy;

/// Local request budget kept in front of a metered upstream.
///
/// Calls beyond the budget are refused locally so they never spend
/// upstream quota.
#[derive(Clone)]
pub struct QuotaGuard {
    limiter: Arc<DefaultDirectRateLimiter>,
    policy: QuotaPolicy,
}

impl std::fmt::Debug for QuotaGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaGuard")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl QuotaGuard {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                policy.window,
                policy.limit,
            ))),
            policy,
        }
    }

    /// Spends one unit of budget, or returns the suggested wait when none is left.
    pub fn acquire(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|_| self.refill_interval())
    }

    pub const fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    /// Time for one unit of budget to replenish.
    pub fn refill_interval(&self) -> Duration {
        self.policy.window / self.policy.limit.max(1)
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
    let seconds_per_cell = (window.as_secs_f64() / f64::from(burst.get())).max(0.001);

    Quota::with_period(Duration::from_secs_f64(seconds_per_cell))
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Request budget of `limit` calls per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleQuota {
    pub limit: u32,
    pub window: Duration,
}

impl ThrottleQuota {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Polygon's free tier: five calls per minute.
    pub const fn polygon_free_tier() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Shared rate limiter that every upstream request passes through.
///
/// The full `limit` may be spent as a burst; budget then refills at one call
/// per `window / limit`.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Arc<DirectRateLimiter>,
    clock: DefaultClock,
    quota: ThrottleQuota,
}

impl RequestThrottle {
    pub fn new(quota: ThrottleQuota) -> Self {
        let clock = DefaultClock::default();
        Self {
            limiter: Arc::new(RateLimiter::direct(governor_quota(quota))),
            clock,
            quota,
        }
    }

    pub fn quota(&self) -> ThrottleQuota {
        self.quota
    }

    /// Take one unit of budget, or report how long until one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Wait (on the tokio clock) until a unit of budget is available.
    pub async fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "throttling upstream request");
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}

fn governor_quota(quota: ThrottleQuota) -> Quota {
    let burst = NonZeroU32::new(quota.limit).unwrap_or(NonZeroU32::MIN);
    let per_cell = (quota.window.as_secs_f64() / f64::from(burst.get())).max(0.001);

    Quota::with_period(Duration::from_secs_f64(per_cell))
        .map(|quota| quota.allow_burst(burst))
        .unwrap_or_else(|| Quota::per_second(burst))
}

//! In-process token bucket rate limiter (governor)
//!
//! A bucket starts full, regains `capacity` tokens per refill interval and
//! never holds more than `capacity`. Callers pass the capacity on every call,
//! so one keyed limiter is kept per distinct capacity; the scope key picks
//! the bucket inside it.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::domain::repositories::{RateLimitDecision, RateLimitStore};

type KeyedLimiter<C> = RateLimiter<String, DashMapStateStore<String>, C, StateInformationMiddleware>;

pub struct InMemoryRateLimitStore<C: Clock = DefaultClock> {
    limiters: Mutex<HashMap<u32, Arc<KeyedLimiter<C>>>>,
    refill_interval: Duration,
    clock: C,
}

impl InMemoryRateLimitStore<DefaultClock> {
    pub fn new(refill_interval: Duration) -> Self {
        Self::with_clock(refill_interval, DefaultClock::default())
    }
}

impl<C: Clock> InMemoryRateLimitStore<C> {
    pub fn with_clock(refill_interval: Duration, clock: C) -> Self {
        Self {
            limiters: Mutex::new(HashMap::new()),
            refill_interval,
            clock,
        }
    }

    /// `capacity` cells, one replenished every `refill_interval / capacity`.
    fn quota(&self, capacity: NonZeroU32) -> Result<Quota> {
        let period = (self.refill_interval / capacity.get()).max(Duration::from_nanos(1));
        Quota::with_period(period)
            .map(|quota| quota.allow_burst(capacity))
            .with_context(|| format!("Invalid rate limit period {period:?}"))
    }

    fn limiter_for(&self, capacity: NonZeroU32) -> Result<Arc<KeyedLimiter<C>>> {
        let mut limiters = self.limiters.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limiter) = limiters.get(&capacity.get()) {
            return Ok(Arc::clone(limiter));
        }
        let limiter = Arc::new(
            RateLimiter::dashmap_with_clock(self.quota(capacity)?, &self.clock)
                .with_middleware::<StateInformationMiddleware>(),
        );
        limiters.insert(capacity.get(), Arc::clone(&limiter));
        Ok(limiter)
    }
}

#[async_trait]
impl<C> RateLimitStore for InMemoryRateLimitStore<C>
where
    C: Clock + Send + Sync + 'static,
    C::Instant: Send + Sync,
{
    async fn try_acquire(&self, scope_key: &str, capacity: u32) -> Result<RateLimitDecision> {
        let capacity = NonZeroU32::new(capacity).unwrap_or(NonZeroU32::MIN);
        let limiter = self.limiter_for(capacity)?;

        Ok(match limiter.check_key(&scope_key.to_string()) {
            Ok(snapshot) => RateLimitDecision {
                allowed: true,
                remaining: snapshot.remaining_burst_capacity(),
                retry_after: Duration::ZERO,
            },
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(self.clock.now());
                debug!(scope_key, ?retry_after, "rate limit exceeded");
                RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use proptest::prelude::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_capacity_then_reject_then_refill() -> Result<()> {
        let clock = FakeRelativeClock::default();
        let limiter = InMemoryRateLimitStore::with_clock(SECOND, clock.clone());

        for expected_remaining in (0..5).rev() {
            let decision = limiter.try_acquire("ingestion:k1", 5).await?;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let rejected = limiter.try_acquire("ingestion:k1", 5).await?;
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert!(rejected.retry_after > Duration::ZERO);
        assert!(rejected.retry_after <= Duration::from_millis(200));

        clock.advance(SECOND);
        assert!(limiter.try_acquire("ingestion:k1", 5).await?.allowed);
        Ok(())
    }

    #[tokio::test]
    async fn test_scopes_are_independent() -> Result<()> {
        let limiter = InMemoryRateLimitStore::with_clock(SECOND, FakeRelativeClock::default());

        assert!(limiter.try_acquire("a", 1).await?.allowed);
        assert!(!limiter.try_acquire("a", 1).await?.allowed);
        assert!(limiter.try_acquire("b", 1).await?.allowed);
        Ok(())
    }

    #[tokio::test]
    async fn test_capacities_do_not_share_buckets() -> Result<()> {
        let limiter = InMemoryRateLimitStore::with_clock(SECOND, FakeRelativeClock::default());

        assert!(limiter.try_acquire("k", 1).await?.allowed);
        assert!(!limiter.try_acquire("k", 1).await?.allowed);
        assert_eq!(limiter.try_acquire("k", 3).await?.remaining, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_refill_is_proportional() -> Result<()> {
        let clock = FakeRelativeClock::default();
        let limiter = InMemoryRateLimitStore::with_clock(SECOND, clock.clone());
        for _ in 0..10 {
            limiter.try_acquire("k", 10).await?;
        }
        clock.advance(Duration::from_millis(500));
        let decision = limiter.try_acquire("k", 10).await?;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_tokens_stay_within_capacity(
            capacity in 1u32..50,
            steps in proptest::collection::vec((0u64..3000, 1usize..4), 1..40),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let clock = FakeRelativeClock::default();
                let limiter = InMemoryRateLimitStore::with_clock(SECOND, clock.clone());
                let mut allowed_total = 0u64;
                let mut elapsed_ms = 0u64;
                for (advance_ms, calls) in steps {
                    clock.advance(Duration::from_millis(advance_ms));
                    elapsed_ms += advance_ms;
                    for _ in 0..calls {
                        let decision = limiter.try_acquire("k", capacity).await.unwrap();
                        prop_assert!(decision.remaining < capacity);
                        if decision.allowed {
                            allowed_total += 1;
                        } else {
                            prop_assert_eq!(decision.remaining, 0);
                        }
                    }
                }
                // never more than the initial fill plus what the elapsed time refilled
                let budget = u64::from(capacity) + u64::from(capacity) * elapsed_ms / 1000 + 1;
                prop_assert!(allowed_total <= budget);
                Ok(())
            })?;
        }
    }
}

//! Leaky bucket rate limiter.
//!
//! The bucket holds a fill level that drains continuously at
//! `drain_per_second`. Each admitted unit of work adds 1 to the level, and
//! admission is only granted while there is room for a whole unit below
//! `capacity`. Starting empty, a burst of `capacity` units passes immediately;
//! after that one unit is admitted every `1 / drain_per_second` seconds.
//!
//! One bucket belongs to one run. It is shared by reference with the foreman
//! and never stored globally.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use assetsync_core::{ConfigError, RateLimitConfig};

use crate::error::Cancelled;
use crate::shutdown::ShutdownSignal;

/// Slack added to computed waits so the next check lands after the unit has
/// fully drained.
const WAIT_SLACK: Duration = Duration::from_millis(1);

/// Tolerance for float drift when comparing the level against capacity.
const LEVEL_EPSILON: f64 = 1e-9;

#[derive(Debug)]
struct BucketState {
    level: f64,
    last_drain: Instant,
}

impl BucketState {
    fn drain(&mut self, now: Instant, drain_per_second: f64) {
        let elapsed = now.saturating_duration_since(self.last_drain);
        self.level = (self.level - elapsed.as_secs_f64() * drain_per_second).max(0.0);
        self.last_drain = now;
    }
}

/// Rate limiter admitting bursts up to `capacity` and a sustained rate of
/// `drain_per_second`.
#[derive(Debug)]
pub struct LeakyBucket {
    capacity: u32,
    drain_per_second: f64,
    state: Mutex<BucketState>,
}

impl LeakyBucket {
    /// Build an empty bucket. Invalid parameters are rejected here, before any
    /// run starts.
    pub fn new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            capacity: config.capacity,
            drain_per_second: config.drain_per_second,
            state: Mutex::new(BucketState {
                level: 0.0,
                last_drain: Instant::now(),
            }),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn drain_per_second(&self) -> f64 {
        self.drain_per_second
    }

    /// Current fill level after draining up to now.
    pub fn level(&self) -> f64 {
        let mut state = self.lock();
        state.drain(Instant::now(), self.drain_per_second);
        state.level
    }

    /// Admit one unit of work if the bucket has room.
    pub fn allow(&self) -> bool {
        self.try_admit().is_ok()
    }

    /// Time until [`allow`](Self::allow) would succeed, or `None` if it would
    /// succeed now.
    pub fn time_until_available(&self) -> Option<Duration> {
        let mut state = self.lock();
        state.drain(Instant::now(), self.drain_per_second);
        self.wait_for_level(state.level)
    }

    /// Wait until one unit of work is admitted.
    ///
    /// Returns [`Cancelled`] if `shutdown` fires first; no capacity is
    /// consumed in that case.
    pub async fn wait(&self, shutdown: &mut ShutdownSignal) -> Result<(), Cancelled> {
        loop {
            if shutdown.is_fired() {
                return Err(Cancelled);
            }
            match self.try_admit() {
                Ok(()) => return Ok(()),
                Err(delay) => {
                    tokio::select! {
                        _ = shutdown.fired() => return Err(Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Drain, then either admit (bumping the level) or report how long to
    /// wait. Both happen under one lock so concurrent callers cannot overshoot.
    fn try_admit(&self) -> Result<(), Duration> {
        let mut state = self.lock();
        state.drain(Instant::now(), self.drain_per_second);
        match self.wait_for_level(state.level) {
            None => {
                state.level += 1.0;
                Ok(())
            }
            Some(delay) => Err(delay),
        }
    }

    fn wait_for_level(&self, level: f64) -> Option<Duration> {
        let excess = level + 1.0 - f64::from(self.capacity);
        if excess <= LEVEL_EPSILON {
            return None;
        }
        let delay = Duration::try_from_secs_f64(excess / self.drain_per_second).unwrap_or(Duration::MAX);
        Some(delay.saturating_add(WAIT_SLACK))
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::time::advance;

    use crate::shutdown;

    fn bucket(capacity: u32, drain_per_second: f64) -> LeakyBucket {
        LeakyBucket::new(RateLimitConfig::new(capacity, drain_per_second)).expect("bucket")
    }

    #[test]
    fn rejects_zero_capacity_and_non_positive_rate() {
        assert!(LeakyBucket::new(RateLimitConfig::new(0, 1.0)).is_err());
        assert!(LeakyBucket::new(RateLimitConfig::new(1, 0.0)).is_err());
        assert!(LeakyBucket::new(RateLimitConfig::new(1, -2.0)).is_err());
        assert!(LeakyBucket::new(RateLimitConfig::new(1, f64::NAN)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_capped_at_capacity() {
        let limiter = bucket(3, 1.0);
        assert_eq!((limiter.capacity(), limiter.drain_per_second()), (3, 1.0));
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow(), "fourth admission in the same instant");
        assert!(limiter.time_until_available().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn level_drains_over_time() {
        let limiter = bucket(2, 2.0);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        advance(Duration::from_millis(500)).await;
        assert!((limiter.level() - 1.0).abs() < 1e-6);
        assert!(limiter.allow());
        assert!(!limiter.allow());

        advance(Duration::from_secs(10)).await;
        assert_eq!(limiter.level(), 0.0, "level never goes negative");
        assert!(limiter.time_until_available().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_checks_admit_exactly_capacity() {
        let limiter = Arc::new(bucket(5, 1.0));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.allow() }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.expect("join") {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_rate_is_bounded_by_drain_rate() {
        let limiter = bucket(3, 2.0);
        let mut signal = ShutdownSignal::never();
        let started = Instant::now();
        for _ in 0..13 {
            limiter.wait(&mut signal).await.expect("admitted");
        }
        let elapsed = started.elapsed();
        // 3 burst admissions, then 10 more at 2 per second.
        assert!(
            elapsed >= Duration::from_millis(4_990),
            "admitted too fast: {elapsed:?}"
        );
        assert!(
            elapsed < Duration::from_millis(5_200),
            "admitted too slowly: {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_cancelled_when_shutdown_fires() {
        let limiter = Arc::new(bucket(1, 0.001));
        assert!(limiter.allow());

        let (trigger, mut signal) = shutdown::channel();
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.wait(&mut signal).await })
        };
        advance(Duration::from_secs(1)).await;
        trigger.fire();
        assert_eq!(waiter.await.expect("join"), Err(Cancelled));
    }
}

//! Fixed-interval throttle for outbound price requests

use std::time::Duration;
use tokio::time::{self, Interval, MissedTickBehavior};

/// Spaces calls at least `1s / max_per_second` apart.
///
/// The first permit is granted immediately. A call that overruns its slot
/// does not earn a burst afterwards.
pub struct RateLimiter {
    ticker: Interval,
}

impl RateLimiter {
    /// Must be created inside a tokio runtime. `max_per_second` must be non-zero.
    pub fn per_second(max_per_second: u32) -> Self {
        let mut ticker = time::interval(Self::period(max_per_second));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker }
    }

    /// Spacing between two consecutive permits
    pub fn period(max_per_second: u32) -> Duration {
        Duration::from_secs(1) / max_per_second.max(1)
    }

    /// Wait for the next permit
    pub async fn acquire(&mut self) {
        self.ticker.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn period_for_ten_per_second_is_100ms() {
        assert_eq!(RateLimiter::period(10), Duration::from_millis(100));
        assert_eq!(RateLimiter::period(1), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn first_permit_is_immediate() {
        let mut limiter = RateLimiter::per_second(10);
        let start = Instant::now();

        limiter.acquire().await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn permits_are_spaced_by_period() {
        let mut limiter = RateLimiter::per_second(10);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.acquire().await;
        }

        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_caller_gets_no_burst() {
        let mut limiter = RateLimiter::per_second(10);
        limiter.acquire().await;

        // Simulate a request that took longer than one slot
        time::sleep(Duration::from_millis(350)).await;
        limiter.acquire().await;
        let after_late_permit = Instant::now();
        limiter.acquire().await;

        assert!(after_late_permit.elapsed() >= Duration::from_millis(100));
    }
}

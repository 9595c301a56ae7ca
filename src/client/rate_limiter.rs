use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Smooth token bucket handing out `permits_per_second` permits, one at a time.
///
/// Permits are reserved in order: a caller that cannot be served before its
/// deadline leaves the schedule untouched.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_free: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(permits_per_second: f64) -> Self {
        let permits_per_second = if permits_per_second > 0.0 { permits_per_second } else { 1.0 };
        Self {
            interval: Duration::from_secs_f64(1.0 / permits_per_second),
            next_free: Mutex::new(Instant::now()),
        }
    }

    /// Waits for a permit for at most `timeout`. Returns `false` without
    /// waiting when no permit frees up in time.
    pub async fn try_acquire(
        &self,
        timeout: Duration,
    ) -> bool {
        let wait = {
            let mut next_free = self.next_free.lock();
            let now = Instant::now();
            let wait = next_free.saturating_duration_since(now);
            if wait > timeout {
                return false;
            }
            *next_free = now.max(*next_free) + self.interval;
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        true
    }
}

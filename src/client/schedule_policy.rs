use std::time::Duration;

/// Retry delay that doubles on every failure, capped at `upper`, and resets
/// on success.
#[derive(Debug, Clone)]
pub struct ExponentialSchedulePolicy {
    lower: Duration,
    upper: Duration,
    last: Duration,
}

impl ExponentialSchedulePolicy {
    pub fn new(
        lower: Duration,
        upper: Duration,
    ) -> Self {
        Self {
            lower,
            upper: upper.max(lower),
            last: Duration::ZERO,
        }
    }

    /// Records a failure and returns the delay before the next attempt.
    pub fn fail(&mut self) -> Duration {
        let delay = if self.last.is_zero() {
            self.lower
        } else {
            (self.last * 2).min(self.upper)
        };
        self.last = delay;
        delay
    }

    pub fn success(&mut self) {
        self.last = Duration::ZERO;
    }

    /// Delay owed before the next attempt, zero after a success.
    pub fn current(&self) -> Duration {
        self.last
    }
}

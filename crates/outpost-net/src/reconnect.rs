//! Fixed-delay reconnect schedule.
//!
//! Every attempt waits the same delay and there is no attempt cap: the
//! networked runtime keeps retrying until it is disposed.

use std::time::Duration;

/// Default pause between connection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    attempts: u64,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempts: 0 }
    }

    /// Count an attempt and return how long to wait before it.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        self.delay
    }

    /// Called once a connection is established.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts since the last successful connection.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_never_grows() {
        let mut schedule = FixedDelay::new(Duration::from_millis(50));
        for _ in 0..1000 {
            assert_eq!(schedule.next_delay(), Duration::from_millis(50));
        }
        assert_eq!(schedule.attempts(), 1000);
        schedule.reset();
        assert_eq!(schedule.attempts(), 0);
    }
}

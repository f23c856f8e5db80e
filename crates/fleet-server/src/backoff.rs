//! Retry delays for background fetches.
//!
//! Doubles per consecutive failure up to a ceiling, with up to 20% added
//! jitter so several servers do not hammer a recovering collaborator in step.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

const JITTER_RATIO: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct RetryDelay {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl RetryDelay {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn on_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let factor = 1u32.checked_shl(self.failures.min(16)).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(factor).min(self.max);
        with_jitter(delay)
    }

    pub fn on_success(&mut self) {
        self.failures = 0;
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let span_ms = (delay.as_millis() as f64 * JITTER_RATIO) as u64;
    if span_ms == 0 {
        return delay;
    }
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    delay + Duration::from_millis(seed % (span_ms + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_then_caps() {
        let mut retry = RetryDelay::new(Duration::from_millis(100), Duration::from_millis(500));
        let first = retry.on_failure();
        assert!(first >= Duration::from_millis(200) && first <= Duration::from_millis(240));
        let second = retry.on_failure();
        assert!(second >= Duration::from_millis(400) && second <= Duration::from_millis(480));
        for _ in 0..40 {
            let capped = retry.on_failure();
            assert!(capped >= Duration::from_millis(500) && capped <= Duration::from_millis(600));
        }
    }

    #[test]
    fn success_resets() {
        let mut retry = RetryDelay::new(Duration::from_millis(10), Duration::from_secs(1));
        retry.on_failure();
        retry.on_failure();
        assert_eq!(retry.failures(), 2);
        retry.on_success();
        assert_eq!(retry.failures(), 0);
        assert!(retry.on_failure() <= Duration::from_millis(24));
    }
}

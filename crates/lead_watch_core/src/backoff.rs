use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackoffState {
    pub consecutive_failures: u32,
}

impl BackoffState {
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// `min(base * 2^failures, max)` plus uniform jitter in `[0, max_jitter]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(5 * 60),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl BackoffPolicy {
    /// Delay without jitter. Saturates instead of overflowing for large counts.
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn jittered_delay<R: Rng + ?Sized>(&self, failures: u32, rng: &mut R) -> Duration {
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rng.random_range(0..=jitter_ms));
        self.delay(failures).saturating_add(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn delay_doubles_until_cap() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_millis(1000),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(4), Duration::from_millis(1000));
        assert_eq!(policy.delay(200), Duration::from_millis(1000));
    }

    #[test]
    fn delay_is_monotonic() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for failures in 0..64 {
            let delay = policy.delay(failures);
            assert!(delay >= previous, "delay shrank at {failures}");
            assert!(delay <= policy.max);
            previous = delay;
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for failures in [1, 5, 30] {
            let delay = policy.jittered_delay(failures, &mut rng);
            assert!(delay >= policy.delay(failures));
            assert!(delay <= policy.delay(failures) + policy.max_jitter);
        }
    }

    #[test]
    fn failures_reset_only_on_success() {
        let mut state = BackoffState::default();
        assert_eq!(state.record_failure(), 1);
        assert_eq!(state.record_failure(), 2);
        state.record_success();
        assert_eq!(state.consecutive_failures, 0);
    }
}

//! Retry/backoff decisions for failed stage invocations.

use std::time::Duration;

use crate::error::StageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Requeue to the same subscriber as `attempt + 1` after `delay`.
    Retry { delay: Duration },
    /// Stop here; record in the dead-letter log.
    DeadLetter,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn decide(&self, attempt: u32, err: &StageError) -> Verdict {
        match err {
            StageError::Permanent(_) => Verdict::DeadLetter,
            StageError::Transient(_) if attempt >= self.max_attempts => Verdict::DeadLetter,
            StageError::Transient(_) => Verdict::Retry {
                delay: self.backoff(attempt),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(1000))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
        assert_eq!(p.backoff(4), Duration::from_millis(1000));
        assert_eq!(p.backoff(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn transient_retries_until_max_attempts() {
        let p = policy();
        let e = StageError::transient("timeout");
        assert!(matches!(p.decide(1, &e), Verdict::Retry { .. }));
        assert!(matches!(p.decide(2, &e), Verdict::Retry { .. }));
        assert_eq!(p.decide(3, &e), Verdict::DeadLetter);
    }

    #[test]
    fn permanent_is_never_retried() {
        assert_eq!(
            policy().decide(1, &StageError::permanent("bad")),
            Verdict::DeadLetter
        );
    }
}

//! Poll policy: how long to wait before and between link-resolution attempts.

use std::time::Duration;

/// Timing and budget for the link-resolution loop.
///
/// The default is the fixed-delay policy: settle 1s, then at most 5 attempts spaced 1s apart.
/// A `multiplier` above 1.0 turns the spacing into capped exponential backoff; the loop still
/// stops on the first successful attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Upper bound on resolution attempts.
    pub max_attempts: u32,

    /// Wait between the transfer and the first attempt.
    pub settle_delay: Duration,

    /// Wait after the first failed attempt.
    pub retry_delay: Duration,

    /// Growth factor applied to `retry_delay` per further failure.
    pub multiplier: f64,

    /// Cap on any single inter-attempt wait.
    pub max_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            settle_delay: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    /// Delay to sleep after `failed_attempts` attempts have failed (1-indexed).
    ///
    /// delay = retry_delay * multiplier^(failed_attempts - 1), capped at `max_delay`.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1) as i32;
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let secs = self.retry_delay.as_secs_f64() * multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Worst-case time spent sleeping if every attempt fails.
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts).fold(self.settle_delay, |acc, n| acc + self.delay_after(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_fixed_one_second_five_attempts() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.settle_delay, Duration::from_secs(1));
        for n in 1..=4 {
            assert_eq!(policy.delay_after(n), Duration::from_secs(1));
        }
        assert_eq!(policy.worst_case_wait(), Duration::from_secs(5));
    }

    #[test]
    fn exponential_backoff_grows_and_is_capped() {
        let policy = PollPolicy {
            retry_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3),
            ..PollPolicy::default()
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(2));
        assert_eq!(policy.delay_after(4), Duration::from_secs(3));
        assert_eq!(policy.delay_after(9), Duration::from_secs(3));
    }

    #[test]
    fn shrinking_multipliers_fall_back_to_fixed_delay() {
        let policy = PollPolicy {
            multiplier: 0.25,
            ..PollPolicy::default()
        };
        assert_eq!(policy.delay_after(3), Duration::from_secs(1));
    }
}

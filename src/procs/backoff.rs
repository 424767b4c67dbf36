// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::time::Duration;

/// Restart delays for a crashing process.
///
/// The delay for the `n`th consecutive crash is `initial * factor^n`, capped at `max`. A process
///   that stayed up for at least `reset_after` is considered healthy again and its next crash
///   starts over from `initial`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
    pub reset_after: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
            reset_after: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given (0-indexed) consecutive crash
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Consecutive crash counter for one supervisor
#[derive(Debug)]
pub struct RestartBackoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl RestartBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Records a crash after `uptime` and returns how long to wait before restarting
    pub fn next_delay(&mut self, uptime: Duration) -> Duration {
        if uptime >= self.policy.reset_after {
            self.attempt = 0;
        }

        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Number of crashes since the process was last healthy
    pub fn consecutive_crashes(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
            factor: 2.0,
            reset_after: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_exponential_growth() {
        let policy = policy();
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(4), Duration::from_millis(1600));
        assert_eq!(policy.delay(5), Duration::from_secs(2));
    }

    #[test]
    fn test_huge_attempt_is_capped() {
        assert_eq!(policy().delay(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_quick_crashes_never_shrink_delay() {
        let mut backoff = RestartBackoff::new(policy());
        let mut last = Duration::from_secs(0);

        for _ in 0..20 {
            let delay = backoff.next_delay(Duration::from_millis(10));
            assert!(delay >= last, "{:?} < {:?}", delay, last);
            assert!(delay <= policy().max);
            last = delay;
        }

        assert_eq!(last, policy().max);
        assert_eq!(backoff.consecutive_crashes(), 20);
    }

    #[test]
    fn test_sustained_uptime_resets_delay() {
        let mut backoff = RestartBackoff::new(policy());
        for _ in 0..10 {
            backoff.next_delay(Duration::from_millis(10));
        }

        assert_eq!(backoff.next_delay(Duration::from_secs(5)), policy().initial);
        assert_eq!(backoff.consecutive_crashes(), 1);
    }

    #[test]
    fn test_constant_factor() {
        let policy = BackoffPolicy {
            factor: 1.0,
            ..policy()
        };
        let mut backoff = RestartBackoff::new(policy);

        for _ in 0..5 {
            assert_eq!(backoff.next_delay(Duration::ZERO), Duration::from_millis(100));
        }
    }
}

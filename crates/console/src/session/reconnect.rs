//! Reconnect scheduling.
//!
//! [`ReconnectPolicy::Fixed`] retries after a constant delay, forever. The
//! default is an exponential backoff whose first delay matches the fixed
//! five seconds.

use std::time::Duration;

/// Delay before the first reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Upper bound for backoff delays.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
/// Growth factor between consecutive backoff delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a session schedules reconnects after an unexpected close.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    /// Same delay every time, no limit.
    Fixed { delay: Duration },
    /// Exponential backoff, reset by every successful open.
    Backoff {
        initial: Duration,
        max: Duration,
        multiplier: f64,
        /// Consecutive attempts allowed before giving up; `None` = unlimited.
        max_attempts: Option<u32>,
    },
}

impl ReconnectPolicy {
    /// Fixed-delay policy.
    pub fn fixed(delay: Duration) -> Self {
        ReconnectPolicy::Fixed { delay }
    }

    /// Backoff policy with the default bounds.
    pub fn backoff() -> Self {
        ReconnectPolicy::Backoff {
            initial: DEFAULT_RECONNECT_DELAY,
            max: DEFAULT_MAX_RECONNECT_DELAY,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_attempts: None,
        }
    }

    /// Limits consecutive attempts. No effect on `Fixed`.
    pub fn with_max_attempts(mut self, limit: Option<u32>) -> Self {
        if let ReconnectPolicy::Backoff { max_attempts, .. } = &mut self {
            *max_attempts = limit;
        }
        self
    }

    fn initial_delay(&self) -> Duration {
        match self {
            ReconnectPolicy::Fixed { delay } => *delay,
            ReconnectPolicy::Backoff { initial, .. } => *initial,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::backoff()
    }
}

/// Per-session reconnect state driven by a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Reconnector {
    policy: ReconnectPolicy,
    attempts: u32,
    current: Duration,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let current = policy.initial_delay();
        Self {
            policy,
            attempts: 0,
            current,
        }
    }

    /// Delay before the next attempt, or `None` when the policy gives up.
    ///
    /// Each call counts as one attempt.
    pub fn next_delay(&mut self) -> Option<Duration> {
        match &self.policy {
            ReconnectPolicy::Fixed { delay } => {
                self.attempts = self.attempts.saturating_add(1);
                Some(*delay)
            }
            ReconnectPolicy::Backoff {
                max,
                multiplier,
                max_attempts,
                ..
            } => {
                if max_attempts.is_some_and(|limit| self.attempts >= limit) {
                    return None;
                }
                let delay = self.current;
                // A multiplier below 1 (or NaN) would shrink or break the delay.
                let grown = self.current.as_secs_f64() * multiplier.max(1.0);
                self.current = Duration::try_from_secs_f64(grown)
                    .map_or(*max, |next| std::cmp::min(next, *max));
                self.attempts = self.attempts.saturating_add(1);
                Some(delay)
            }
        }
    }

    /// Forgets previous failures; called after a successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.policy.initial_delay();
    }

    /// Consecutive attempts scheduled since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_starts_at_five_seconds() {
        let mut reconnector = Reconnector::new(ReconnectPolicy::default());
        assert_eq!(reconnector.next_delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_fixed_policy_never_grows_or_stops() {
        let mut reconnector = Reconnector::new(ReconnectPolicy::fixed(Duration::from_secs(5)));
        for _ in 0..100 {
            assert_eq!(reconnector.next_delay(), Some(Duration::from_secs(5)));
        }
        assert_eq!(reconnector.attempts(), 100);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut reconnector = Reconnector::new(ReconnectPolicy::default());
        let delays: Vec<u64> = (0..6)
            .map(|_| reconnector.next_delay().unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60]);
    }

    #[test]
    fn test_reset_restarts_backoff() {
        let mut reconnector = Reconnector::new(ReconnectPolicy::default());
        reconnector.next_delay();
        reconnector.next_delay();
        assert_eq!(reconnector.attempts(), 2);

        reconnector.reset();
        assert_eq!(reconnector.attempts(), 0);
        assert_eq!(reconnector.next_delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_max_attempts_gives_up() {
        let policy = ReconnectPolicy::backoff().with_max_attempts(Some(2));
        let mut reconnector = Reconnector::new(policy);
        assert!(reconnector.next_delay().is_some());
        assert!(reconnector.next_delay().is_some());
        assert_eq!(reconnector.next_delay(), None);
        assert_eq!(reconnector.attempts(), 2);
    }

    #[test]
    fn test_max_attempts_ignored_for_fixed() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(1)).with_max_attempts(Some(1));
        assert_eq!(policy, ReconnectPolicy::fixed(Duration::from_secs(1)));
    }

    #[test]
    fn test_backoff_multiplier_below_one_keeps_initial_delay() {
        let mut reconnector = Reconnector::new(ReconnectPolicy::Backoff {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(60),
            multiplier: -1.0,
            max_attempts: None,
        });
        for _ in 0..3 {
            assert_eq!(reconnector.next_delay(), Some(Duration::from_secs(5)));
        }
    }

    #[test]
    fn test_backoff_overflow_saturates_at_max() {
        let mut reconnector = Reconnector::new(ReconnectPolicy::Backoff {
            initial: Duration::from_secs(5),
            max: Duration::MAX,
            multiplier: f64::MAX,
            max_attempts: None,
        });
        assert_eq!(reconnector.next_delay(), Some(Duration::from_secs(5)));
        assert_eq!(reconnector.next_delay(), Some(Duration::MAX));
        assert_eq!(reconnector.next_delay(), Some(Duration::MAX));
    }
}

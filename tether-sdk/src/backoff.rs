//! Exponential reconnect backoff.
//!
//! Delays double per failed attempt and saturate at a ceiling. There is no
//! jitter: the delay sequence for an episode is fully determined by the
//! base delay and the number of failures since the last spawn.

use std::time::Duration;

/// Multiplier applied to the delay after every scheduled reconnect.
pub const MULTIPLIER: u32 = 2;

/// Immutable backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60), 10)
    }
}

impl Backoff {
    /// A ceiling below `base` is raised to `base`.
    pub fn new(base: Duration, ceiling: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            ceiling: ceiling.max(base),
            max_attempts,
        }
    }

    /// Delay to use after `current`: `min(current * 2, ceiling)`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current
            .checked_mul(MULTIPLIER)
            .unwrap_or(Duration::MAX)
            .min(self.ceiling)
    }

    /// Delay at the start of a disconnection episode.
    pub fn reset_delay(&self) -> Duration {
        self.base
    }

    /// Delay of the `n`th (1-based) consecutive reconnect of an episode.
    pub fn nth_delay(&self, n: u32) -> Duration {
        let mut delay = self.base;
        for _ in 1..n {
            delay = self.next_delay(delay);
            if delay == self.ceiling {
                break;
            }
        }
        delay.min(self.ceiling)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Mutable per-process reconnect bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectState {
    attempt_count: u32,
    current_delay: Duration,
}

impl ReconnectState {
    pub fn new(policy: &Backoff) -> Self {
        Self {
            attempt_count: 0,
            current_delay: policy.reset_delay(),
        }
    }

    /// Called on a confirmed spawn only.
    pub fn reset(&mut self, policy: &Backoff) {
        self.attempt_count = 0;
        self.current_delay = policy.reset_delay();
    }

    /// Count a non-fatal termination. Returns the delay to wait before the
    /// next attempt, or `None` once the attempt budget is spent. The stored
    /// delay advances only when a delay is handed out.
    pub fn next_attempt(&mut self, policy: &Backoff) -> Option<Duration> {
        self.attempt_count = self.attempt_count.saturating_add(1);
        if self.attempt_count > policy.max_attempts() {
            return None;
        }
        let delay = self.current_delay;
        self.current_delay = policy.next_delay(delay);
        Some(delay)
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn delay_doubles_until_ceiling() {
        let policy = Backoff::new(ms(1000), ms(30_000), 10);
        assert_eq!(policy.next_delay(ms(1000)), ms(2000));
        assert_eq!(policy.next_delay(ms(8000)), ms(16_000));
        assert_eq!(policy.next_delay(ms(16_000)), ms(30_000));
        assert_eq!(policy.next_delay(ms(30_000)), ms(30_000));
    }

    #[test]
    fn next_delay_is_monotone_and_bounded() {
        let policy = Backoff::new(ms(250), ms(45_000), 10);
        let mut current = ms(1);
        while current <= policy.ceiling() {
            let next = policy.next_delay(current);
            assert!(next >= current, "{next:?} < {current:?}");
            assert!(next <= policy.ceiling());
            current += ms(997);
        }
    }

    #[test]
    fn huge_delays_do_not_overflow() {
        let policy = Backoff::new(ms(1), Duration::MAX, 3);
        assert_eq!(policy.next_delay(Duration::MAX), Duration::MAX);
    }

    #[test]
    fn ceiling_never_below_base() {
        let policy = Backoff::new(ms(5000), ms(100), 1);
        assert_eq!(policy.ceiling(), ms(5000));
        assert_eq!(policy.next_delay(ms(5000)), ms(5000));
    }

    #[test]
    fn nth_delay_matches_closed_form() {
        let policy = Backoff::new(ms(500), ms(20_000), 100);
        for n in 1..=12u32 {
            let expected = ms(500u64 << (n - 1)).min(ms(20_000));
            assert_eq!(policy.nth_delay(n), expected, "n = {n}");
        }
    }

    #[test]
    fn state_hands_out_the_nth_delay() {
        let policy = Backoff::new(ms(1000), ms(10_000), 8);
        let mut state = ReconnectState::new(&policy);
        for n in 1..=8 {
            assert_eq!(state.next_attempt(&policy), Some(policy.nth_delay(n)));
            assert_eq!(state.attempt_count(), n);
        }
    }

    #[test]
    fn budget_exhaustion_scenario() {
        let policy = Backoff::new(ms(5000), ms(60_000), 2);
        let mut state = ReconnectState::new(&policy);
        assert_eq!(state.next_attempt(&policy), Some(ms(5000)));
        assert_eq!(state.next_attempt(&policy), Some(ms(10_000)));
        assert_eq!(state.next_attempt(&policy), None);
        assert_eq!(state.attempt_count(), 3);
        // Exhaustion does not advance the delay any further.
        assert_eq!(state.current_delay(), ms(20_000));
    }

    #[test]
    fn reset_restores_base() {
        let policy = Backoff::new(ms(200), ms(1000), 5);
        let mut state = ReconnectState::new(&policy);
        state.next_attempt(&policy);
        state.next_attempt(&policy);
        state.reset(&policy);
        assert_eq!(state.attempt_count(), 0);
        assert_eq!(state.current_delay(), ms(200));
    }

    #[test]
    fn zero_max_attempts_never_schedules() {
        let policy = Backoff::new(ms(100), ms(1000), 0);
        let mut state = ReconnectState::new(&policy);
        assert_eq!(state.next_attempt(&policy), None);
    }
}

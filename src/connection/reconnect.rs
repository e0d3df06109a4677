//! Reconnect scheduler
//!
//! Exponential backoff with a cap and a bounded number of consecutive
//! attempts. The scheduler only decides; the link arms the timer and calls
//! [`ReconnectScheduler::fire`] when it elapses.

use std::time::Duration;

/// Scheduler lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// A timer is armed
    Scheduled,
    /// The timer fired and a connect is in flight
    Attempting,
    /// The attempt budget is spent; nothing more is scheduled until an open
    Exhausted,
}

/// Outcome of asking the scheduler for another attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Arm a timer for `delay`; pass `token` back to `fire`
    Arm { delay: Duration, token: u64 },
    /// A timer is already armed
    AlreadyScheduled,
    /// The budget just ran out; the caller must invalidate once
    GiveUp,
    /// The budget ran out earlier; do nothing
    Spent,
}

#[derive(Debug)]
pub struct ReconnectScheduler {
    state: SchedulerState,
    attempt: u32,
    token: u64,
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl ReconnectScheduler {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            state: SchedulerState::Idle,
            attempt: 0,
            token: 0,
            base,
            cap,
            max_attempts,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Consecutive attempts scheduled since the last successful open
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before attempt `n` (0-indexed): `min(base * 2^n, cap)`
    pub fn delay_for(&self, n: u32) -> Duration {
        let factor = 2u32.saturating_pow(n);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Called when the connection closed with a retryable code
    pub fn schedule(&mut self) -> Decision {
        match self.state {
            SchedulerState::Scheduled => Decision::AlreadyScheduled,
            SchedulerState::Exhausted => Decision::Spent,
            SchedulerState::Idle | SchedulerState::Attempting => {
                if self.attempt >= self.max_attempts {
                    self.state = SchedulerState::Exhausted;
                    return Decision::GiveUp;
                }
                let delay = self.delay_for(self.attempt);
                self.attempt += 1;
                self.token += 1;
                self.state = SchedulerState::Scheduled;
                Decision::Arm {
                    delay,
                    token: self.token,
                }
            }
        }
    }

    /// Timer elapsed. Returns true if the caller should connect now.
    pub fn fire(&mut self, token: u64) -> bool {
        if self.state == SchedulerState::Scheduled && token == self.token {
            self.state = SchedulerState::Attempting;
            true
        } else {
            false
        }
    }

    /// A socket opened, or recovery was cancelled; forget all attempts.
    /// Any armed timer becomes stale.
    pub fn reset(&mut self) {
        self.state = SchedulerState::Idle;
        self.attempt = 0;
        self.token += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> ReconnectScheduler {
        ReconnectScheduler::new(Duration::from_millis(1000), Duration::from_millis(30_000), 5)
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let s = scheduler();
        for n in 0..12u32 {
            let expected = (1000u64 * 2u64.pow(n)).min(30_000);
            assert_eq!(s.delay_for(n), Duration::from_millis(expected), "attempt {}", n);
        }
        assert_eq!(s.delay_for(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_schedule_is_noop_while_scheduled() {
        let mut s = scheduler();
        let first = s.schedule();
        assert!(matches!(first, Decision::Arm { .. }));
        assert_eq!(s.schedule(), Decision::AlreadyScheduled);
        assert_eq!(s.attempt(), 1);
    }

    #[test]
    fn test_gives_up_after_budget() {
        let mut s = scheduler();
        let mut delays = Vec::new();
        loop {
            match s.schedule() {
                Decision::Arm { delay, token } => {
                    delays.push(delay.as_millis() as u64);
                    assert!(s.fire(token));
                }
                Decision::GiveUp => break,
                other => panic!("unexpected decision {:?}", other),
            }
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(s.state(), SchedulerState::Exhausted);
        assert_eq!(s.schedule(), Decision::Spent);
    }

    #[test]
    fn test_reset_invalidates_armed_timer() {
        let mut s = scheduler();
        let Decision::Arm { token, .. } = s.schedule() else {
            panic!("expected a timer");
        };
        s.reset();
        assert!(!s.fire(token));
        assert_eq!(s.attempt(), 0);
        assert_eq!(s.state(), SchedulerState::Idle);
    }
}

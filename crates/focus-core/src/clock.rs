//! Countdown clock driven by host ticks.
//!
//! [`TimerClock`] never reads the system time. The host reports how many
//! seconds passed through [`TimerClock::advance`], which keeps the clock
//! deterministic under test and independent of any async runtime.

/// Lifecycle of a [`TimerClock`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClockStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
}

/// Result of a single [`TimerClock::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    /// Seconds left on the countdown. Never negative.
    pub remaining: u64,
    /// Set only on the call that brought the countdown to zero.
    pub completed: bool,
}

/// Monotonic countdown over a fixed number of seconds.
#[derive(Debug, Clone, Default)]
pub struct TimerClock {
    status: ClockStatus,
    total: u64,
    elapsed: u64,
}

impl TimerClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the countdown from `total_seconds`.
    pub fn start(&mut self, total_seconds: u64) {
        self.total = total_seconds;
        self.elapsed = 0;
        self.status = if total_seconds == 0 {
            ClockStatus::Completed
        } else {
            ClockStatus::Running
        };
    }

    /// Freeze the remaining time. No-op unless running.
    pub fn pause(&mut self) -> ClockStatus {
        if self.status == ClockStatus::Running {
            self.status = ClockStatus::Paused;
        }
        self.status
    }

    /// Continue from `total - elapsed_at_pause`. No-op unless paused.
    pub fn resume(&mut self) -> ClockStatus {
        if self.status == ClockStatus::Paused {
            self.status = ClockStatus::Running;
        }
        self.status
    }

    /// Stop the clock for good. The completion signal will not fire.
    pub fn cancel(&mut self) {
        if self.status != ClockStatus::Completed {
            self.status = ClockStatus::Cancelled;
        }
    }

    pub fn advance(&mut self, delta_seconds: u64) -> ClockTick {
        if self.status != ClockStatus::Running {
            return ClockTick {
                remaining: self.remaining(),
                completed: false,
            };
        }

        self.elapsed = self.elapsed.saturating_add(delta_seconds).min(self.total);
        let completed = self.elapsed == self.total;
        if completed {
            self.status = ClockStatus::Completed;
        }

        ClockTick {
            remaining: self.remaining(),
            completed,
        }
    }

    pub fn status(&self) -> ClockStatus {
        self.status
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.elapsed)
    }

    pub fn is_completed(&self) -> bool {
        self.status == ClockStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_count_down_and_signal_completion_once() {
        let mut clock = TimerClock::new();
        clock.start(10);

        let tick = clock.advance(4);
        assert_eq!(tick, ClockTick { remaining: 6, completed: false });

        let tick = clock.advance(6);
        assert_eq!(tick, ClockTick { remaining: 0, completed: true });

        let tick = clock.advance(5);
        assert_eq!(tick, ClockTick { remaining: 0, completed: false });
        assert!(clock.is_completed());
    }

    #[test]
    fn test_should_clamp_overshoot_to_zero() {
        let mut clock = TimerClock::new();
        clock.start(3);
        let tick = clock.advance(100);
        assert_eq!(tick.remaining, 0);
        assert!(tick.completed);
        assert_eq!(clock.elapsed(), 3);
    }

    #[test]
    fn test_should_freeze_while_paused() {
        let mut clock = TimerClock::new();
        clock.start(60);
        clock.advance(20);

        assert_eq!(clock.pause(), ClockStatus::Paused);
        assert_eq!(clock.advance(30).remaining, 40);

        assert_eq!(clock.resume(), ClockStatus::Running);
        assert_eq!(clock.advance(10).remaining, 30);
    }

    #[test]
    fn test_should_treat_repeated_pause_and_resume_as_noop() {
        let mut clock = TimerClock::new();
        clock.start(60);

        assert_eq!(clock.resume(), ClockStatus::Running);
        assert_eq!(clock.pause(), ClockStatus::Paused);
        assert_eq!(clock.pause(), ClockStatus::Paused);
        assert_eq!(clock.resume(), ClockStatus::Running);
    }

    #[test]
    fn test_should_not_complete_after_cancel() {
        let mut clock = TimerClock::new();
        clock.start(5);
        clock.cancel();

        let tick = clock.advance(10);
        assert!(!tick.completed);
        assert_eq!(clock.status(), ClockStatus::Cancelled);
    }

    #[test]
    fn test_should_ignore_advance_before_start() {
        let mut clock = TimerClock::new();
        assert_eq!(clock.advance(10), ClockTick { remaining: 0, completed: false });
        assert_eq!(clock.status(), ClockStatus::Idle);
    }
}

//! Deferred, coalescing timers
//!
//! A [`Debouncer`] is the timer handle a session keeps for each deferred
//! callback: the persistence write and the form quiescence window. Arming a
//! pending debouncer pushes its deadline out; the callback runs once when the
//! host polls after the deadline has passed.
//!
//! A debouncer is either inclusive (due at its deadline) or exclusive (due
//! only once the deadline has been passed).

use chrono::{DateTime, Duration, Utc};

/// Debounce state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { deadline: DateTime<Utc> },
}

/// A re-armable single-shot timer
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    state: DebounceState,
    exclusive: bool,
}

impl Debouncer {
    /// A timer that fires once `delay_ms` has elapsed
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: delay_from_ms(delay_ms),
            state: DebounceState::Idle,
            exclusive: false,
        }
    }

    /// A timer that fires only once strictly more than `delay_ms` has elapsed
    pub fn exclusive(delay_ms: u64) -> Self {
        Self {
            exclusive: true,
            ..Self::new(delay_ms)
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, DebounceState::Pending { .. })
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self.state {
            DebounceState::Idle => None,
            DebounceState::Pending { deadline } => Some(deadline),
        }
    }

    /// Earliest instant at which [`Self::fire_if_due`] returns `true`
    pub fn fires_at(&self) -> Option<DateTime<Utc>> {
        let deadline = self.deadline()?;
        if self.exclusive {
            Some(
                deadline
                    .checked_add_signed(Duration::nanoseconds(1))
                    .unwrap_or(deadline),
            )
        } else {
            Some(deadline)
        }
    }

    /// Start the timer, or restart it if already pending.
    ///
    /// A deadline past the representable range never comes due.
    pub fn arm(&mut self, now: DateTime<Utc>) {
        let deadline = now
            .checked_add_signed(self.delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.state = DebounceState::Pending { deadline };
    }

    pub fn cancel(&mut self) {
        self.state = DebounceState::Idle;
    }

    /// Fire if the deadline has passed.
    ///
    /// Returns `true` exactly once per armed period; the debouncer is idle
    /// afterwards.
    pub fn fire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            DebounceState::Pending { deadline } if self.is_past(now, deadline) => {
                self.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }

    fn is_past(&self, now: DateTime<Utc>, deadline: DateTime<Utc>) -> bool {
        if self.exclusive {
            now > deadline
        } else {
            now >= deadline
        }
    }
}

fn delay_from_ms(delay_ms: u64) -> Duration {
    // Saturate rather than wrap to a negative delay
    Duration::milliseconds(i64::try_from(delay_ms).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    #[test]
    fn test_idle_never_fires() {
        let mut debouncer = Debouncer::new(500);
        assert_eq!(debouncer.state(), DebounceState::Idle);
        assert!(!debouncer.fire_if_due(t(10_000)));
    }

    #[test]
    fn test_fires_once_after_delay() {
        let mut debouncer = Debouncer::new(500);
        debouncer.arm(t(0));
        assert_eq!(debouncer.deadline(), Some(t(500)));

        assert!(!debouncer.fire_if_due(t(499)));
        assert!(debouncer.fire_if_due(t(500)));
        assert!(!debouncer.fire_if_due(t(600)));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_rearm_pushes_deadline() {
        let mut debouncer = Debouncer::new(500);
        debouncer.arm(t(0));
        debouncer.arm(t(300));
        debouncer.arm(t(450));

        assert!(!debouncer.fire_if_due(t(800)));
        assert!(debouncer.fire_if_due(t(950)));
    }

    #[test]
    fn test_cancel() {
        let mut debouncer = Debouncer::new(500);
        debouncer.arm(t(0));
        debouncer.cancel();
        assert!(!debouncer.fire_if_due(t(1_000)));
    }

    #[test]
    fn test_exclusive_waits_past_deadline() {
        let mut debouncer = Debouncer::exclusive(30_000);
        debouncer.arm(t(0));
        assert_eq!(debouncer.deadline(), Some(t(30_000)));

        assert!(!debouncer.fire_if_due(t(30_000)));
        let fires_at = debouncer.fires_at().unwrap();
        assert!(fires_at > t(30_000) && fires_at < t(30_001));
        assert!(debouncer.fire_if_due(fires_at));
    }

    #[test]
    fn test_oversized_delay_never_comes_due() {
        for delay_ms in [100_000_000_000_000_000, u64::MAX] {
            let mut debouncer = Debouncer::new(delay_ms);
            assert!(debouncer.delay() > Duration::zero());

            debouncer.arm(t(0));
            assert!(debouncer.is_pending());
            assert!(!debouncer.fire_if_due(t(0)));
            assert!(!debouncer.fire_if_due(t(86_400_000)));
        }
    }
}

use chrono::{DateTime, Duration, Utc};

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// Deterministic timestamp for tests and examples (2025-01-15T10:40:00Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_736_937_600;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

//
// ─── STUDY TIMER ───────────────────────────────────────────────────────────────
//

/// Elapsed-study-time tracking as a derived value.
///
/// The timer holds only a clock origin; elapsed seconds are computed on
/// demand as `now - origin`. Resuming shifts the origin backward by the
/// accumulated time, and joining a continuity session as a follower replaces
/// the origin wholesale with the leader's, ceding timer authority to the
/// leader's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudyTimer {
    origin: DateTime<Utc>,
}

impl StudyTimer {
    /// Timer starting now, with zero accumulated time.
    #[must_use]
    pub fn started(now: DateTime<Utc>) -> Self {
        Self { origin: now }
    }

    /// Timer resuming a session that already accumulated `seconds`.
    #[must_use]
    pub fn resumed(now: DateTime<Utc>, seconds: u64) -> Self {
        let accumulated = Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX));
        Self {
            origin: now - accumulated,
        }
    }

    /// Timer adopting a peer-provided origin (unix milliseconds).
    ///
    /// Returns `None` for origins outside the representable range.
    #[must_use]
    pub fn from_origin_millis(millis: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(|origin| Self { origin })
    }

    /// The origin as unix milliseconds, the form carried by `initial_sync`.
    #[must_use]
    pub fn origin_millis(&self) -> i64 {
        self.origin.timestamp_millis()
    }

    /// Whole seconds elapsed since the origin, floored at zero.
    #[must_use]
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        let seconds = now.signed_duration_since(self.origin).num_seconds();
        u64::try_from(seconds).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_deterministic() {
        let clock = fixed_clock();
        assert_eq!(clock.now(), fixed_now());
    }

    #[test]
    fn advance_moves_fixed_clock_only() {
        let mut clock = fixed_clock();
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), fixed_now() + Duration::seconds(30));
    }

    #[test]
    fn started_timer_counts_from_zero() {
        let now = fixed_now();
        let timer = StudyTimer::started(now);
        assert_eq!(timer.elapsed_seconds(now), 0);
        assert_eq!(timer.elapsed_seconds(now + Duration::seconds(42)), 42);
    }

    #[test]
    fn resumed_timer_includes_accumulated_time() {
        let now = fixed_now();
        let timer = StudyTimer::resumed(now, 120);
        assert_eq!(timer.elapsed_seconds(now), 120);
        assert_eq!(timer.elapsed_seconds(now + Duration::seconds(5)), 125);
    }

    #[test]
    fn origin_roundtrips_through_millis() {
        let timer = StudyTimer::started(fixed_now());
        let adopted = StudyTimer::from_origin_millis(timer.origin_millis()).unwrap();
        assert_eq!(adopted, timer);
    }

    #[test]
    fn elapsed_floors_at_zero_for_future_origin() {
        let now = fixed_now();
        let timer = StudyTimer::from_origin_millis(
            (now + Duration::seconds(60)).timestamp_millis(),
        )
        .unwrap();
        assert_eq!(timer.elapsed_seconds(now), 0);
    }
}

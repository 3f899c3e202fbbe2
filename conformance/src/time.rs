//! How the harness lets time pass while waiting for items to expire.

use carbon::clock::{Clock, ModifiableClock};
use chrono::{FixedOffset, Local, Offset, Timelike, Utc};
use std::sync::{Arc, OnceLock};
use std::thread::sleep;
use std::time::Duration;
use tracing::debug;

pub trait TimeControl {
    /// Let `duration` pass
    fn advance_time(&self, duration: Duration);

    /// Move to the start of the next whole second
    fn align_to_full_second(&self);

    /// The clock adapters should read, if this strategy owns one
    fn clock(&self) -> Option<Arc<dyn Clock>>;
}

/// Wall-clock time; advancing blocks the calling thread
#[derive(Clone, Copy, Debug, Default)]
pub struct RealTime;

impl TimeControl for RealTime {
    fn advance_time(&self, duration: Duration) {
        debug!("Sleeping {:?}", duration);
        sleep(duration);
    }

    fn align_to_full_second(&self) {
        let nanos = Utc::now().nanosecond() % 1_000_000_000;
        if nanos > 0 {
            sleep(Duration::from_nanos(u64::from(1_000_000_000 - nanos)));
        }
    }

    fn clock(&self) -> Option<Arc<dyn Clock>> {
        None
    }
}

/// Virtual time backed by a lazily created [`ModifiableClock`].
///
/// Advancing before anyone asked for the clock does nothing.
#[derive(Debug)]
pub struct ModifiableTime {
    timezone: FixedOffset,
    clock: OnceLock<Arc<ModifiableClock>>,
}

impl ModifiableTime {
    /// Clock frozen in the local timezone
    pub fn new() -> Self {
        Self::in_timezone(Local::now().offset().fix())
    }

    pub fn in_timezone(timezone: FixedOffset) -> Self {
        Self {
            timezone,
            clock: OnceLock::new(),
        }
    }

    /// The same clock on every call
    pub fn modifiable_clock(&self) -> Arc<ModifiableClock> {
        Arc::clone(
            self.clock
                .get_or_init(|| Arc::new(ModifiableClock::new(self.timezone))),
        )
    }
}

impl Default for ModifiableTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeControl for ModifiableTime {
    fn advance_time(&self, duration: Duration) {
        if let Some(clock) = self.clock.get() {
            debug!("Advancing modifiable clock by {:?}", duration);
            clock.add(duration);
        }
    }

    fn align_to_full_second(&self) {}

    fn clock(&self) -> Option<Arc<dyn Clock>> {
        let clock: Arc<dyn Clock> = self.modifiable_clock();
        Some(clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::time::Instant;

    #[test]
    fn test_clock_is_created_once() {
        let time = ModifiableTime::new();
        let first = time.modifiable_clock();
        let second = time.modifiable_clock();
        assert!(Arc::ptr_eq(&first, &second));

        let as_dyn = time.clock().unwrap();
        first.add_seconds(5);
        assert_eq!(as_dyn.now(), second.now());
    }

    #[test]
    fn test_advance_moves_clock_without_blocking() {
        let time = ModifiableTime::new();
        let clock = time.modifiable_clock();
        let before = clock.now();

        let started = Instant::now();
        time.advance_time(Duration::from_secs(3600));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(clock.now(), before + TimeDelta::seconds(3600));
    }

    #[test]
    fn test_advance_by_fraction_of_a_second() {
        let time = ModifiableTime::new();
        let clock = time.modifiable_clock();
        let before = clock.now();

        time.advance_time(Duration::from_millis(500));
        assert_eq!(clock.now(), before + TimeDelta::milliseconds(500));
    }

    #[test]
    fn test_advance_before_clock_exists_is_noop() {
        let time = ModifiableTime::new();
        time.advance_time(Duration::from_secs(10));
        assert_eq!(time.modifiable_clock().elapsed_seconds(), 0);
    }

    #[test]
    fn test_timezone_is_used() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let time = ModifiableTime::in_timezone(tz);
        assert_eq!(time.modifiable_clock().now().offset(), &tz);
    }

    #[test]
    fn test_real_time_advances_wall_clock() {
        let started = Instant::now();
        RealTime.advance_time(Duration::from_millis(300));
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(RealTime.clock().is_none());
    }

    #[test]
    fn test_real_time_aligns_to_full_second() {
        RealTime.align_to_full_second();
        assert!(Utc::now().nanosecond() < 500_000_000);
    }
}

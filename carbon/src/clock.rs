//! Time sources used by adapters to evaluate expiry.

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall-clock time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().fixed_offset()
    }
}

/// A frozen instant that only moves when told to
#[derive(Debug)]
pub struct ModifiableClock {
    frozen_time: DateTime<FixedOffset>,
    millis_to_add: AtomicU64,
}

impl ModifiableClock {
    /// Freeze the current wall-clock time in the given timezone
    pub fn new(timezone: FixedOffset) -> Self {
        Self::frozen_at(Utc::now().with_timezone(&timezone))
    }

    pub fn frozen_at(instant: DateTime<FixedOffset>) -> Self {
        Self {
            frozen_time: instant,
            millis_to_add: AtomicU64::new(0),
        }
    }

    pub fn add_seconds(&self, seconds: u64) {
        self.add(Duration::from_secs(seconds));
    }

    /// Move forward, at millisecond resolution
    pub fn add(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.millis_to_add.fetch_add(millis, Ordering::SeqCst);
    }

    /// Time added since the clock was frozen
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.millis_to_add.load(Ordering::SeqCst))
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed().as_secs()
    }
}

impl Clock for ModifiableClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let offset = TimeDelta::from_std(self.elapsed()).unwrap_or(TimeDelta::MAX);
        self.frozen_time
            .checked_add_signed(offset)
            .unwrap_or(DateTime::<Utc>::MAX_UTC.fixed_offset())
    }
}

/// Time captured once and never advanced.
///
/// Adapters evaluating expiry against it never observe an item expiring.
#[derive(Clone, Copy, Debug)]
pub struct RequestTime {
    captured: DateTime<FixedOffset>,
}

impl RequestTime {
    pub fn capture(clock: &dyn Clock) -> Self {
        Self {
            captured: clock.now(),
        }
    }
}

impl Clock for RequestTime {
    fn now(&self) -> DateTime<FixedOffset> {
        self.captured
    }
}

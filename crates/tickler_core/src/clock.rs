use std::fmt;
use std::sync::{Arc, Mutex};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Source of the local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> PrimitiveDateTime;

    fn today(&self) -> Date {
        self.now().date()
    }
}

/// Looks up the current UTC offset; `None` means it could not be determined.
pub type OffsetSource = Arc<dyn Fn() -> Option<UtcOffset> + Send + Sync>;

/// Reads the system clock in the local UTC offset.
///
/// The offset is resolved on every read so daylight-saving changes during a
/// long session are followed. When the lookup fails the offset captured at
/// construction is used instead.
#[derive(Clone)]
pub struct SystemClock {
    fallback: UtcOffset,
    source: OffsetSource,
}

impl SystemClock {
    /// Follows the machine's local offset, falling back to the startup offset.
    pub fn local() -> Self {
        Self::with_offset_source(local_offset(), Arc::new(chrono_local_offset))
    }

    pub fn with_offset(offset: UtcOffset) -> Self {
        Self::with_offset_source(offset, Arc::new(|| None))
    }

    pub fn with_offset_source(fallback: UtcOffset, source: OffsetSource) -> Self {
        Self { fallback, source }
    }

    fn offset(&self) -> UtcOffset {
        (self.source)().unwrap_or(self.fallback)
    }
}

impl fmt::Debug for SystemClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemClock")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> PrimitiveDateTime {
        let now = OffsetDateTime::now_utc().to_offset(self.offset());
        PrimitiveDateTime::new(now.date(), now.time())
    }
}

/// Offset from the local time zone database; safe to call from any thread.
fn chrono_local_offset() -> Option<UtcOffset> {
    let seconds = chrono::Local::now().offset().local_minus_utc();
    UtcOffset::from_whole_seconds(seconds).ok()
}

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset()
        .ok()
        .or_else(chrono_local_offset)
        .unwrap_or(UtcOffset::UTC)
}

/// Hand-driven clock shared between a test and the code under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<PrimitiveDateTime>>,
}

impl ManualClock {
    pub fn new(start: PrimitiveDateTime) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, value: PrimitiveDateTime) {
        *self.lock() = value;
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.lock();
        *current += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PrimitiveDateTime> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> PrimitiveDateTime {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, ManualClock, SystemClock};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use time::macros::{date, datetime};
    use time::{Duration, UtcOffset};

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new(datetime!(2024-09-01 23:59));
        let observer = clock.clone();

        clock.advance(Duration::minutes(2));

        assert_eq!(observer.now(), datetime!(2024-09-02 0:01));
        assert_eq!(observer.today(), date!(2024 - 09 - 02));

        clock.set(datetime!(2025-01-01 8:00));
        assert_eq!(observer.now(), datetime!(2025-01-01 8:00));
    }

    #[test]
    fn system_clock_applies_offset() {
        let utc = SystemClock::with_offset(UtcOffset::UTC).now();
        let ahead = SystemClock::with_offset(UtcOffset::from_hms(5, 0, 0).unwrap()).now();

        let difference = ahead - utc;
        assert!(difference > Duration::hours(4) && difference < Duration::hours(6));
    }

    #[test]
    fn system_clock_follows_offset_changes_between_reads() {
        let summer = Arc::new(AtomicBool::new(false));
        let flag = summer.clone();
        let clock = SystemClock::with_offset_source(
            UtcOffset::UTC,
            Arc::new(move || {
                let hours = if flag.load(Ordering::SeqCst) { 2 } else { 1 };
                UtcOffset::from_hms(hours, 0, 0).ok()
            }),
        );

        let winter_reading = clock.now();
        summer.store(true, Ordering::SeqCst);
        let summer_reading = clock.now();

        let difference = summer_reading - winter_reading;
        assert!(difference > Duration::minutes(59) && difference < Duration::minutes(61));
    }

    #[test]
    fn system_clock_uses_fallback_when_lookup_fails() {
        let fallback = UtcOffset::from_hms(3, 0, 0).unwrap();
        let clock = SystemClock::with_offset_source(fallback, Arc::new(|| None));
        let reference = SystemClock::with_offset(fallback).now();

        let difference = clock.now() - reference;
        assert!(difference.abs() < Duration::minutes(1));
    }

    #[test]
    fn local_clock_reads_a_plausible_time() {
        let local = SystemClock::local().now();
        let utc = SystemClock::with_offset(UtcOffset::UTC).now();

        assert!((local - utc).abs() <= Duration::hours(15));
    }
}

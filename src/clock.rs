//! Monotonic nanosecond time source.
//!
//! Windowed mutators read the clock on every `put` and `get`. Production code
//! uses [`SystemClock`]; tests substitute a [`ManualClock`] so window
//! arithmetic is deterministic.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

/// A source of monotonic time in nanoseconds.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time in nanoseconds.
    ///
    /// Values never decrease and are never negative.
    fn nanos(&self) -> i64;
}

/// The real, monotonic clock.
///
/// Reports nanoseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock anchored at the current instant.
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn nanos(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// A clock that only moves when told to.
///
/// # Examples
///
/// ```rust
/// use accumulatori::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// assert_eq!(clock.nanos(), 0);
///
/// clock.advance(Duration::from_millis(100));
/// assert_eq!(clock.nanos(), 100_000_000);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading zero.
    pub const fn new() -> Self {
        ManualClock {
            now: AtomicI64::new(0),
        }
    }

    /// Creates a clock reading `nanos`.
    pub const fn starting_at(nanos: i64) -> Self {
        ManualClock {
            now: AtomicI64::new(nanos),
        }
    }

    /// Sets the current time. Moving backwards is ignored.
    pub fn set(&self, nanos: i64) {
        self.now.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Moves the clock forward by `nanos`.
    pub fn advance_nanos(&self, nanos: i64) {
        self.now.fetch_add(nanos.max(0), Ordering::Relaxed);
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.advance_nanos(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX));
    }
}

impl Clock for ManualClock {
    #[inline]
    fn nanos(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.nanos();
        let b = clock.nanos();
        assert!(a >= 0);
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_millis(5));
        clock.advance_nanos(7);
        assert_eq!(clock.nanos(), 5_000_007);
    }

    #[test]
    fn test_manual_clock_never_goes_back() {
        let clock = ManualClock::starting_at(1_000);
        clock.set(500);
        assert_eq!(clock.nanos(), 1_000);
        clock.set(2_000);
        assert_eq!(clock.nanos(), 2_000);
        clock.advance_nanos(-10);
        assert_eq!(clock.nanos(), 2_000);
    }
}

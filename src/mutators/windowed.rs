//! Lock-free sliding-window mutator.
//!
//! This module provides [`Windowed`], an approximate aggregate (sum, min or
//! max) over the last `intervals × resolution` nanoseconds, backed by a fixed
//! ring of time buckets.
//!
//! # Design
//!
//! Each bucket is a pair of atomics: the aggregated value and the timestamp of
//! its last write. A third array records the last timestamp *seen by writers*
//! for each bucket; it is only ever accessed with `Relaxed` ordering and is
//! the cheap test deciding whether a write starts a fresh interval or merges
//! into the current one.
//!
//! ```text
//!                      write index (now)
//!                            │
//!   ┌────┬────┬────┬────┬────▼───┬────┬────┐
//!   │ b3 │ b4 │ b5 │ b6 │ b0 (w) │ b1 │ b2 │   ring of intervals + buffer
//!   └────┴────┴────┴────┴────────┴────┴────┘
//!   └───── read (intervals) ─────┘└ buffer ┘
//! ```
//!
//! A read covers the current interval and the `intervals - 1` before it. The
//! `buffer_intervals` buckets ahead of the write index are the next ones
//! writers rotate into and are never read. A bucket only counts if its last
//! write belongs to exactly the interval the reader expects in that slot, so
//! a slot still holding data from a previous trip around the ring is
//! ignored.
//!
//! # Accuracy
//!
//! Writes are plain `Release` stores, not read-modify-write operations.
//! Two threads writing the same bucket in the same instant can lose one of
//! the two contributions. An [`Unbounded`](super::Unbounded) mutator is the
//! exact alternative.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::clock::Clock;
use crate::mutators::{Combine, IntervalStrategy, Mutator};

/// Timestamp of a bucket that has never been written.
const NEVER: i64 = i64::MIN;

/// An approximate sliding-window aggregate.
///
/// # Examples
///
/// ```rust
/// use accumulatori::clock::ManualClock;
/// use accumulatori::mutators::{Combine, IntervalStrategy, Mutator, Windowed};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = Arc::new(ManualClock::new());
/// let strategy = IntervalStrategy::new(Duration::from_millis(100), 10, 2).unwrap();
/// let window = Windowed::new(strategy, Combine::Sum, clock.clone());
///
/// window.put(1);
/// window.put(1);
///
/// // The current interval is part of the window.
/// assert_eq!(window.get(), 2);
/// clock.advance(Duration::from_millis(200));
/// assert_eq!(window.get(), 2);
///
/// // Once the whole ring has elapsed the value ages out.
/// clock.advance(Duration::from_secs(2));
/// assert_eq!(window.get(), 0);
/// assert!(window.all_buckets_stale());
/// ```
pub struct Windowed {
    strategy: IntervalStrategy,
    combine: Combine,
    clock: Arc<dyn Clock>,
    values: Box<[AtomicI64]>,
    stamps: Box<[AtomicI64]>,
    seen: Box<[AtomicI64]>,
}

impl Windowed {
    /// Creates an empty window.
    pub fn new(strategy: IntervalStrategy, combine: Combine, clock: Arc<dyn Clock>) -> Self {
        let buckets = strategy.buckets();
        let filled = |value: i64| (0..buckets).map(|_| AtomicI64::new(value)).collect();
        Windowed {
            strategy,
            combine,
            clock,
            values: filled(combine.initial()),
            stamps: filled(NEVER),
            seen: filled(NEVER),
        }
    }

    /// The strategy this window was built with.
    pub fn strategy(&self) -> &IntervalStrategy {
        &self.strategy
    }

    /// The merge this window aggregates with.
    pub fn merge(&self) -> Combine {
        self.combine
    }

    /// Folds `delta` in at time `now`.
    #[inline]
    pub fn put_at(&self, now: i64, delta: i64) {
        let idx = self.strategy.index_for(now);
        let seen = self.seen[idx].load(Ordering::Relaxed);

        if seen == NEVER || self.strategy.interval_for(seen) != self.strategy.interval_for(now) {
            // the bucket holds an elapsed interval: start over
            self.values[idx].store(delta, Ordering::Release);
        } else {
            let current = self.values[idx].load(Ordering::Relaxed);
            self.values[idx].store(self.combine.combine(current, delta), Ordering::Release);
        }

        self.stamps[idx].store(now, Ordering::Release);
        self.seen[idx].store(now, Ordering::Relaxed);
    }

    /// Reads the aggregate as of time `now`.
    ///
    /// Walks `intervals` buckets backwards from the write index for `now`.
    /// A bucket whose last write is not from the interval expected in its
    /// slot counts as absent.
    pub fn get_at(&self, now: i64) -> i64 {
        let buckets = self.strategy.buckets();
        let current = self.strategy.interval_for(now);
        let start = self.strategy.index_for(now);

        let mut result = self.combine.initial();
        for step in 0..self.strategy.intervals() {
            let idx = (start + buckets - step) % buckets;
            let stamp = self.stamps[idx].load(Ordering::Acquire);
            if stamp != NEVER && self.strategy.interval_for(stamp) == current - step as i64 {
                result = self
                    .combine
                    .combine(result, self.values[idx].load(Ordering::Acquire));
            }
        }
        result
    }

    /// Returns `true` if no bucket was written within the last
    /// `buckets × resolution` nanoseconds.
    ///
    /// Lets a higher layer detect an idle metric.
    pub fn all_buckets_stale(&self) -> bool {
        self.all_buckets_stale_at(self.clock.nanos())
    }

    /// [`all_buckets_stale`](Self::all_buckets_stale) as of time `now`.
    pub fn all_buckets_stale_at(&self, now: i64) -> bool {
        let span = self.strategy.span();
        self.stamps.iter().all(|stamp| {
            let stamp = stamp.load(Ordering::Acquire);
            stamp == NEVER || now.saturating_sub(stamp) >= span
        })
    }

    /// Raw `(value, timestamp)` of bucket `idx`.
    #[cfg(test)]
    fn bucket(&self, idx: usize) -> (i64, i64) {
        (
            self.values[idx].load(Ordering::Acquire),
            self.stamps[idx].load(Ordering::Acquire),
        )
    }
}

impl Mutator for Windowed {
    #[inline]
    fn put(&self, delta: i64) {
        self.put_at(self.clock.nanos(), delta);
    }

    #[inline]
    fn get(&self) -> i64 {
        self.get_at(self.clock.nanos())
    }

    #[inline]
    fn combine(&self, a: i64, b: i64) -> i64 {
        self.combine.combine(a, b)
    }
}

impl Debug for Windowed {
    /// Formats the window showing buckets that have been written.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "windowed-{}{{", self.combine.as_str())?;
        for (i, stamp) in self.stamps.iter().enumerate() {
            let stamp = stamp.load(Ordering::Relaxed);
            if stamp != NEVER {
                let value = self.values[i].load(Ordering::Relaxed);
                write!(f, " [{i}]:{value}@{stamp}")?;
            }
        }
        write!(f, " }}")
    }
}

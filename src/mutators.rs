//! Write-side capability of an accumulator and the families implementing it.
//!
//! A [`Mutator`] is what instrumented code writes to. Every family answers the
//! same three operations: `put` folds a delta in, `get` reads the aggregate,
//! `combine` is the associative merge the family is built around.
//!
//! # Families
//!
//! | Type | Storage | Expires | Use Case |
//! |------|---------|---------|----------|
//! | [`Windowed`](windowed::Windowed) | ring of time buckets | yes | requests in the last minute |
//! | [`Unbounded`](unbounded::Unbounded) | one atomic, CAS loop | no | lifetime totals and extrema |
//! | [`Sharded`](sharded::Sharded) | one inner mutator per thread slot | as inner | very hot counters |
//! | [`Noop`] | nothing | - | sentinel for disabled or unknown metrics |
//!
//! # Architecture
//!
//! ```text
//!   MutatorFactory ──create(clock)──► Box<dyn Mutator>
//!        │
//!        ├── family:  Windowed(IntervalStrategy) | Unbounded
//!        ├── combine: Sum | Min | Max
//!        └── shards:  None | Some(n)  ──► Sharded[n × family]
//! ```
//!
//! # Accuracy
//!
//! Windowed writes are deliberately approximate: two threads racing on the
//! first write of an interval may lose one contribution. Use an unbounded
//! family when every write has to count.

pub mod interval;
pub mod sharded;
pub mod unbounded;
pub mod windowed;

use std::fmt::Debug;
use std::sync::Arc;

use crate::clock::Clock;

pub use interval::IntervalStrategy;
pub use sharded::Sharded;
pub use unbounded::Unbounded;
pub use windowed::Windowed;

/// The write-side capability shared by every mutator family.
///
/// Implementations never block and never allocate on `put` or `get`.
///
/// # Examples
///
/// ```rust
/// use accumulatori::mutators::{Combine, Mutator, Unbounded};
///
/// let max = Unbounded::new(Combine::Max);
/// max.put(3);
/// max.put(9);
/// max.put(4);
/// assert_eq!(max.get(), 9);
/// assert_eq!(max.combine(1, 2), 2);
/// ```
pub trait Mutator: Send + Sync + Debug {
    /// Folds `delta` into the aggregate.
    fn put(&self, delta: i64);

    /// Returns the current aggregate.
    fn get(&self) -> i64;

    /// The associative merge this mutator aggregates with.
    fn combine(&self, a: i64, b: i64) -> i64;
}

/// The associative merge of a mutator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Combine {
    /// Wrapping addition, identity `0`.
    #[default]
    Sum,
    /// Minimum, identity `i64::MAX`.
    Min,
    /// Maximum, identity `i64::MIN`.
    Max,
}

impl Combine {
    /// Merges two values.
    #[inline]
    pub const fn combine(self, a: i64, b: i64) -> i64 {
        match self {
            Combine::Sum => a.wrapping_add(b),
            Combine::Min => {
                if a < b {
                    a
                } else {
                    b
                }
            }
            Combine::Max => {
                if a > b {
                    a
                } else {
                    b
                }
            }
        }
    }

    /// The identity element: what an empty aggregate reads as.
    #[inline]
    pub const fn initial(self) -> i64 {
        match self {
            Combine::Sum => 0,
            Combine::Min => i64::MAX,
            Combine::Max => i64::MIN,
        }
    }

    /// Lower-case name of the merge (`sum`, `min`, `max`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Combine::Sum => "sum",
            Combine::Min => "min",
            Combine::Max => "max",
        }
    }
}

/// A mutator that discards every write.
///
/// Backs sentinel accumulators returned for unknown or invalid names.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Mutator for Noop {
    #[inline]
    fn put(&self, _delta: i64) {}

    #[inline]
    fn get(&self) -> i64 {
        0
    }

    #[inline]
    fn combine(&self, a: i64, _b: i64) -> i64 {
        a
    }
}

/// Storage family selected by a [`MutatorFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Sliding window over time buckets.
    Windowed(IntervalStrategy),
    /// Single never-expiring atomic.
    Unbounded,
}

/// Describes, and builds, a mutator.
///
/// A factory is a plain value: the same factory can build any number of
/// independent mutators, one per accumulator.
///
/// # Examples
///
/// ```rust
/// use accumulatori::clock::ManualClock;
/// use accumulatori::mutators::{IntervalStrategy, MutatorFactory};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let strategy = IntervalStrategy::new(Duration::from_millis(100), 10, 2).unwrap();
/// let factory = MutatorFactory::windowed_sum(strategy).sharded(4);
///
/// let mutator = factory.create(Arc::new(ManualClock::new()));
/// mutator.put(1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutatorFactory {
    family: Family,
    combine: Combine,
    shards: Option<usize>,
}

impl MutatorFactory {
    /// Creates a factory for the given family and merge.
    pub const fn new(family: Family, combine: Combine) -> Self {
        MutatorFactory {
            family,
            combine,
            shards: None,
        }
    }

    /// Windowed sum.
    pub const fn windowed_sum(strategy: IntervalStrategy) -> Self {
        Self::new(Family::Windowed(strategy), Combine::Sum)
    }

    /// Windowed minimum.
    pub const fn windowed_min(strategy: IntervalStrategy) -> Self {
        Self::new(Family::Windowed(strategy), Combine::Min)
    }

    /// Windowed maximum.
    pub const fn windowed_max(strategy: IntervalStrategy) -> Self {
        Self::new(Family::Windowed(strategy), Combine::Max)
    }

    /// Lifetime sum.
    pub const fn unbounded_sum() -> Self {
        Self::new(Family::Unbounded, Combine::Sum)
    }

    /// Lifetime minimum.
    pub const fn unbounded_min() -> Self {
        Self::new(Family::Unbounded, Combine::Min)
    }

    /// Lifetime maximum.
    pub const fn unbounded_max() -> Self {
        Self::new(Family::Unbounded, Combine::Max)
    }

    /// Spreads writes over `shards` independent mutators, one per thread slot.
    ///
    /// A shard count of zero or one disables sharding.
    pub const fn sharded(self, shards: usize) -> Self {
        Self {
            shards: if shards > 1 { Some(shards) } else { None },
            ..self
        }
    }

    /// The storage family.
    pub const fn family(&self) -> Family {
        self.family
    }

    /// The merge.
    pub const fn combine(&self) -> Combine {
        self.combine
    }

    /// The shard count, if sharded.
    pub const fn shards(&self) -> Option<usize> {
        self.shards
    }

    /// Builds a fresh mutator.
    ///
    /// `clock` is only consulted by windowed families.
    pub fn create(&self, clock: Arc<dyn Clock>) -> Box<dyn Mutator> {
        match self.shards {
            Some(shards) => Box::new(Sharded::new(shards, self.combine, |_| {
                self.create_single(Arc::clone(&clock))
            })),
            None => self.create_single(clock),
        }
    }

    fn create_single(&self, clock: Arc<dyn Clock>) -> Box<dyn Mutator> {
        match self.family {
            Family::Windowed(strategy) => Box::new(Windowed::new(strategy, self.combine, clock)),
            Family::Unbounded => Box::new(Unbounded::new(self.combine)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    #[test]
    fn test_combine_sum() {
        assert_eq!(Combine::Sum.combine(2, 3), 5);
        assert_eq!(Combine::Sum.combine(i64::MAX, 1), i64::MIN);
        assert_eq!(Combine::Sum.initial(), 0);
    }

    #[test]
    fn test_combine_min_max() {
        assert_eq!(Combine::Min.combine(5, 3), 3);
        assert_eq!(Combine::Max.combine(5, 3), 5);
        assert_eq!(Combine::Min.combine(Combine::Min.initial(), 7), 7);
        assert_eq!(Combine::Max.combine(Combine::Max.initial(), -7), -7);
    }

    #[test]
    fn test_noop() {
        let noop = Noop;
        noop.put(42);
        assert_eq!(noop.get(), 0);
    }

    #[test]
    fn test_factory_unbounded() {
        let mutator = MutatorFactory::unbounded_sum().create(Arc::new(ManualClock::new()));
        mutator.put(2);
        mutator.put(3);
        assert_eq!(mutator.get(), 5);
    }

    #[test]
    fn test_factory_windowed_min() {
        let clock = Arc::new(ManualClock::new());
        let strategy = IntervalStrategy::new(Duration::from_millis(100), 10, 2).unwrap();
        let mutator = MutatorFactory::windowed_min(strategy).create(clock.clone());
        mutator.put(5);
        mutator.put(3);
        clock.advance(Duration::from_millis(200));
        assert_eq!(mutator.get(), 3);
    }

    #[test]
    fn test_factory_sharded() {
        let factory = MutatorFactory::unbounded_max().sharded(8);
        assert_eq!(factory.shards(), Some(8));
        assert_eq!(MutatorFactory::unbounded_max().sharded(1).shards(), None);

        let mutator = factory.create(Arc::new(ManualClock::new()));
        mutator.put(4);
        mutator.put(11);
        assert_eq!(mutator.get(), 11);
    }
}

//! Per-thread sharding over any mutator family.
//!
//! This module provides [`Sharded`], which spreads writes across several
//! independent inner mutators so that threads updating the same accumulator
//! typically touch different cache lines.
//!
//! # Thread Slot Assignment
//!
//! 1. A global atomic counter (`NEXT_SLOT_ID`) assigns sequential IDs to threads
//! 2. Each thread stores its assigned slot in thread-local storage
//! 3. The slot is taken modulo the shard count to select the inner mutator
//! 4. Each inner mutator is cache-line padded to prevent false sharing
//!
//! ```text
//!                          ┌─────────────────────────────────────┐
//!                          │          Sharded mutator            │
//!                          ├─────────────────────────────────────┤
//!   Thread 0 ──put──────►  │ [Shard 0] windowed (CachePadded)    │
//!   Thread 1 ──put──────►  │ [Shard 1] windowed (CachePadded)    │
//!        ...               │    ...                              │
//!   Thread n ──put──────►  │ [Shard n] windowed (CachePadded)    │
//!                          └─────────────────────────────────────┘
//!                                          │
//!                                          ▼
//!                                 get() combines all
//!                                 shard aggregates
//! ```
//!
//! Because every merge is associative, folding shard aggregates with the
//! same merge yields the aggregate of all writes.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::mutators::{Combine, Mutator};

/// Global counter for assigning slot IDs to threads.
static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Slot assigned to the current thread, stable for the thread's lifetime.
    static THREAD_SLOT: usize = NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed);
}

/// Returns the current thread's slot.
#[inline]
pub(crate) fn thread_slot() -> usize {
    THREAD_SLOT.with(|slot| *slot)
}

/// A mutator split into per-thread shards.
///
/// # Examples
///
/// ```rust
/// use accumulatori::mutators::{Combine, Mutator, Sharded, Unbounded};
/// use std::sync::Arc;
/// use std::thread;
///
/// let counter = Arc::new(Sharded::new(8, Combine::Sum, |_| {
///     Box::new(Unbounded::new(Combine::Sum))
/// }));
///
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let c = Arc::clone(&counter);
///         thread::spawn(move || {
///             for _ in 0..1000 {
///                 c.put(1);
///             }
///         })
///     })
///     .collect();
///
/// for h in handles {
///     h.join().unwrap();
/// }
///
/// assert_eq!(counter.get(), 4000);
/// ```
pub struct Sharded {
    combine: Combine,
    shards: Box<[CachePadded<Box<dyn Mutator>>]>,
}

impl Sharded {
    /// Creates `shards` inner mutators with `make(index)`.
    ///
    /// At least one shard is always created.
    pub fn new(
        shards: usize,
        combine: Combine,
        mut make: impl FnMut(usize) -> Box<dyn Mutator>,
    ) -> Self {
        Sharded {
            combine,
            shards: (0..shards.max(1))
                .map(|i| CachePadded::new(make(i)))
                .collect(),
        }
    }

    /// Number of shards.
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Always `false`: a sharded mutator has at least one shard.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// The current thread's shard.
    #[inline]
    fn local(&self) -> &dyn Mutator {
        &**self.shards[thread_slot() % self.shards.len()]
    }

    /// Returns the aggregate of the current thread's shard.
    #[inline]
    pub fn local_value(&self) -> i64 {
        self.local().get()
    }
}

impl Mutator for Sharded {
    #[inline]
    fn put(&self, delta: i64) {
        self.local().put(delta);
    }

    fn get(&self) -> i64 {
        self.shards
            .iter()
            .fold(self.combine.initial(), |acc, shard| {
                self.combine.combine(acc, shard.get())
            })
    }

    #[inline]
    fn combine(&self, a: i64, b: i64) -> i64 {
        self.combine.combine(a, b)
    }
}

impl Debug for Sharded {
    /// Formats the mutator showing shards holding a non-identity value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sharded-{}{{", self.combine.as_str())?;
        for (i, shard) in self.shards.iter().enumerate() {
            let value = shard.get();
            if value != self.combine.initial() {
                write!(f, " [{i}]:{value}")?;
            }
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutators::Unbounded;
    use std::sync::Arc;
    use std::thread;

    fn sharded(shards: usize, combine: Combine) -> Sharded {
        Sharded::new(shards, combine, move |_| Box::new(Unbounded::new(combine)))
    }

    #[test]
    fn test_at_least_one_shard() {
        let s = sharded(0, Combine::Sum);
        assert_eq!(s.len(), 1);
        assert!(!s.is_empty());
    }

    #[test]
    fn test_local_value() {
        let s = sharded(4, Combine::Sum);
        s.put(3);
        assert_eq!(s.local_value(), 3);
        assert_eq!(s.get(), 3);
    }

    #[test]
    fn test_thread_slot_is_stable() {
        assert_eq!(thread_slot(), thread_slot());
    }

    #[test]
    fn test_multiple_threads_max() {
        let s = Arc::new(sharded(4, Combine::Max));
        let mut handles = vec![];

        for i in 0..8 {
            let s = Arc::clone(&s);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    s.put(i * 1000 + j);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(s.get(), 7099);
    }

    #[test]
    fn test_empty_min_reads_identity() {
        let s = sharded(4, Combine::Min);
        assert_eq!(s.get(), i64::MAX);
    }

    #[test]
    fn test_debug() {
        let s = sharded(2, Combine::Sum);
        s.put(5);
        let debug_str = format!("{:?}", s);
        assert!(debug_str.starts_with("sharded-sum{"));
        assert!(debug_str.contains(":5"));
    }
}

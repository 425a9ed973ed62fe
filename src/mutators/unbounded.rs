//! Never-expiring mutator backed by a single atomic.
//!
//! This module provides [`Unbounded`], the exact counterpart of the windowed
//! family: every `put` is a compare-and-swap retry loop, so no contribution is
//! ever lost, at the cost of contention on a single cache line.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::mutators::{Combine, Mutator};

/// A lifetime sum, minimum or maximum.
///
/// The value starts at the merge's identity (`0`, `i64::MAX` or `i64::MIN`).
///
/// # Examples
///
/// ```rust
/// use accumulatori::mutators::{Combine, Mutator, Unbounded};
///
/// let min_latency = Unbounded::new(Combine::Min);
/// min_latency.put(150);
/// min_latency.put(85);
/// min_latency.put(200);
/// assert_eq!(min_latency.get(), 85);
/// ```
pub struct Unbounded {
    combine: Combine,
    value: AtomicI64,
}

impl Unbounded {
    /// Creates a mutator holding the merge's identity.
    pub const fn new(combine: Combine) -> Self {
        Unbounded {
            combine,
            value: AtomicI64::new(combine.initial()),
        }
    }

    /// The merge this mutator aggregates with.
    pub const fn merge(&self) -> Combine {
        self.combine
    }
}

impl Mutator for Unbounded {
    /// Merges `delta` in with a compare-and-swap loop.
    #[inline]
    fn put(&self, delta: i64) {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            let next = self.combine.combine(current, delta);
            if next == current {
                break;
            }
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    #[inline]
    fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    fn combine(&self, a: i64, b: i64) -> i64 {
        self.combine.combine(a, b)
    }
}

impl Default for Unbounded {
    /// Creates a sum starting at zero.
    fn default() -> Self {
        Self::new(Combine::Sum)
    }
}

impl Debug for Unbounded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unbounded-{}{{ {} }}",
            self.combine.as_str(),
            self.value.load(Ordering::Relaxed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new() {
        assert_eq!(Unbounded::new(Combine::Sum).get(), 0);
        assert_eq!(Unbounded::new(Combine::Min).get(), i64::MAX);
        assert_eq!(Unbounded::new(Combine::Max).get(), i64::MIN);
    }

    #[test]
    fn test_const_new() {
        static TOTAL: Unbounded = Unbounded::new(Combine::Sum);
        TOTAL.put(1);
        assert!(TOTAL.get() >= 1);
    }

    #[test]
    fn test_sum_negative_deltas() {
        let sum = Unbounded::default();
        sum.put(10);
        sum.put(-4);
        assert_eq!(sum.get(), 6);
    }

    #[test]
    fn test_min_max() {
        let min = Unbounded::new(Combine::Min);
        let max = Unbounded::new(Combine::Max);
        for v in [50, 30, 70, 20, 60] {
            min.put(v);
            max.put(v);
        }
        assert_eq!(min.get(), 20);
        assert_eq!(max.get(), 70);
    }

    #[test]
    fn test_multiple_threads_sum_is_exact() {
        let counter = Arc::new(Unbounded::new(Combine::Sum));
        let mut handles = vec![];

        for _ in 0..4 {
            let c = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    c.put(1);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.get(), 4000);
    }

    #[test]
    fn test_multiple_threads_min() {
        let counter = Arc::new(Unbounded::new(Combine::Min));
        let mut handles = vec![];

        for i in 0..4 {
            let c = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    c.put((i + 1) * 1000 + j);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.get(), 1000);
    }

    #[test]
    fn test_debug() {
        let counter = Unbounded::new(Combine::Max);
        counter.put(42);
        assert_eq!(format!("{:?}", counter), "unbounded-max{ 42 }");
    }
}

//! Mapping from clock readings to bucket indices.
//!
//! An [`IntervalStrategy`] is a pure function of time: it cuts the timeline
//! into intervals of `resolution` nanoseconds and assigns interval `n` to
//! bucket `n mod buckets`, where `buckets = intervals + buffer_intervals`.
//!
//! ```text
//!   time ──►  |  0  |  1  |  2  | ... | 11  | 12  | 13  | ...
//!   bucket    |  0  |  1  |  2  | ... | 11  |  0  |  1  | ...
//!                                           ▲
//!                                    ring wraps after
//!                                  intervals + buffer
//! ```

use std::time::Duration;

use crate::config::{
    WindowConfig, DEFAULT_BUFFER_INTERVALS, DEFAULT_INTERVALS, DEFAULT_RESOLUTION,
};
use crate::error::{Error, Result};

/// Window shape plus the time-to-bucket mapping.
///
/// # Examples
///
/// ```rust
/// use accumulatori::mutators::IntervalStrategy;
/// use std::time::Duration;
///
/// let strategy = IntervalStrategy::new(Duration::from_millis(100), 10, 2).unwrap();
/// assert_eq!(strategy.buckets(), 12);
/// assert_eq!(strategy.index_for(0), 0);
/// assert_eq!(strategy.index_for(250_000_000), 2);
/// assert_eq!(strategy.index_for(1_200_000_000), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalStrategy {
    resolution: i64,
    intervals: usize,
    buffer_intervals: usize,
}

impl IntervalStrategy {
    /// Creates a strategy.
    ///
    /// Fails if `resolution` is zero (or beyond `i64` nanoseconds) or if
    /// `intervals` is zero.
    pub fn new(resolution: Duration, intervals: usize, buffer_intervals: usize) -> Result<Self> {
        let resolution = i64::try_from(resolution.as_nanos())
            .map_err(|_| Error::InvalidWindow("resolution does not fit in i64 nanoseconds"))?;
        Self::from_nanos(resolution, intervals, buffer_intervals)
    }

    /// Creates a strategy from a resolution in nanoseconds.
    pub fn from_nanos(resolution: i64, intervals: usize, buffer_intervals: usize) -> Result<Self> {
        if resolution <= 0 {
            return Err(Error::InvalidWindow("resolution must be positive"));
        }
        if intervals == 0 {
            return Err(Error::InvalidWindow("at least one interval is required"));
        }
        Ok(IntervalStrategy {
            resolution,
            intervals,
            buffer_intervals,
        })
    }

    /// Nanoseconds per bucket.
    #[inline]
    pub const fn resolution(&self) -> i64 {
        self.resolution
    }

    /// Buckets aggregated by a read.
    #[inline]
    pub const fn intervals(&self) -> usize {
        self.intervals
    }

    /// Trailing buckets a read skips.
    #[inline]
    pub const fn buffer_intervals(&self) -> usize {
        self.buffer_intervals
    }

    /// Size of the bucket ring.
    #[inline]
    pub const fn buckets(&self) -> usize {
        self.intervals + self.buffer_intervals
    }

    /// Nanoseconds covered by the whole ring.
    ///
    /// A bucket last written more than this long ago is stale.
    #[inline]
    pub fn span(&self) -> i64 {
        self.resolution.saturating_mul(self.buckets() as i64)
    }

    /// The interval number containing `now`.
    #[inline]
    pub const fn interval_for(&self, now: i64) -> i64 {
        now.div_euclid(self.resolution)
    }

    /// `floor(now / resolution) mod buckets`.
    #[inline]
    pub const fn index_for(&self, now: i64) -> usize {
        self.interval_for(now).rem_euclid(self.buckets() as i64) as usize
    }
}

impl Default for IntervalStrategy {
    /// The shape of [`WindowConfig::default`].
    fn default() -> Self {
        IntervalStrategy {
            resolution: DEFAULT_RESOLUTION.as_nanos() as i64,
            intervals: DEFAULT_INTERVALS,
            buffer_intervals: DEFAULT_BUFFER_INTERVALS,
        }
    }
}

impl TryFrom<WindowConfig> for IntervalStrategy {
    type Error = Error;

    fn try_from(config: WindowConfig) -> Result<Self> {
        IntervalStrategy::new(config.resolution, config.intervals, config.buffer_intervals)
    }
}

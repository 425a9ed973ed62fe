//! Registrar configuration and the enablement parse rule.
//!
//! [`RegistrarConfig`] is an ordinary value handed to
//! [`Registrar::with_config`](crate::registry::Registrar::with_config); there
//! is no global configuration. With the `serde` feature both config structs
//! can be loaded from any serde format (durations are integer nanoseconds).
//!
//! # Examples
//!
//! ```rust
//! use accumulatori::config::{RegistrarConfig, WindowConfig};
//! use std::time::Duration;
//!
//! let config = RegistrarConfig::default()
//!     .with_root_state(true)
//!     .with_window(WindowConfig::new(Duration::from_millis(100), 10, 2));
//!
//! assert!(config.root_state);
//! assert_eq!(config.window.intervals, 10);
//! ```

use std::time::Duration;

use crate::error::{Error, Result};

/// Default bucket resolution: one second.
pub const DEFAULT_RESOLUTION: Duration = Duration::from_secs(1);

/// Default number of buckets aggregated by a windowed read.
pub const DEFAULT_INTERVALS: usize = 60;

/// Default number of buffer buckets left out of every read.
pub const DEFAULT_BUFFER_INTERVALS: usize = 2;

/// Default shard count for sharded mutator factories.
pub const DEFAULT_SHARDS: usize = 16;

/// Shape of a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowConfig {
    /// Time covered by one bucket.
    #[cfg_attr(feature = "serde", serde(with = "duration_nanos"))]
    pub resolution: Duration,
    /// Number of buckets aggregated by a read.
    pub intervals: usize,
    /// Extra trailing buckets absorbing writer/reader skew.
    pub buffer_intervals: usize,
}

impl WindowConfig {
    /// Creates a window shape.
    pub const fn new(resolution: Duration, intervals: usize, buffer_intervals: usize) -> Self {
        WindowConfig {
            resolution,
            intervals,
            buffer_intervals,
        }
    }

    /// Total span covered by the aggregated buckets.
    pub fn span(&self) -> Duration {
        self.resolution
            .saturating_mul(u32::try_from(self.intervals).unwrap_or(u32::MAX))
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION, DEFAULT_INTERVALS, DEFAULT_BUFFER_INTERVALS)
    }
}

/// Configuration of a [`Registrar`](crate::registry::Registrar).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegistrarConfig {
    /// Initial effective state of the root node.
    pub root_state: bool,
    /// Window shape used by the registrar's factory helpers.
    pub window: WindowConfig,
    /// Shard count used by the registrar's sharded factory helpers.
    pub shards: usize,
}

impl RegistrarConfig {
    /// Sets the root's initial state, returning `self` for method chaining.
    pub fn with_root_state(self, root_state: bool) -> Self {
        Self { root_state, ..self }
    }

    /// Sets the default window shape, returning `self` for method chaining.
    pub fn with_window(self, window: WindowConfig) -> Self {
        Self { window, ..self }
    }

    /// Sets the default shard count, returning `self` for method chaining.
    pub fn with_shards(self, shards: usize) -> Self {
        Self {
            shards: shards.max(1),
            ..self
        }
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        RegistrarConfig {
            root_state: false,
            window: WindowConfig::default(),
            shards: DEFAULT_SHARDS,
        }
    }
}

/// Parses an enablement value.
///
/// Case-insensitive, surrounding whitespace ignored: `on` and `true` enable,
/// `off` and `false` disable. Anything else is an error.
///
/// # Examples
///
/// ```rust
/// use accumulatori::config::parse_state;
///
/// assert_eq!(parse_state("ON").unwrap(), true);
/// assert_eq!(parse_state(" false ").unwrap(), false);
/// assert!(parse_state("yes").is_err());
/// ```
pub fn parse_state(value: &str) -> Result<bool> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("on") || trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("off") || trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::InvalidState {
            value: value.to_string(),
        })
    }
}

#[cfg(feature = "serde")]
mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_accepts_all_spellings() {
        for value in ["on", "On", "TRUE", "true", " on "] {
            assert!(parse_state(value).unwrap(), "{value}");
        }
        for value in ["off", "OFF", "False", "false\n"] {
            assert!(!parse_state(value).unwrap(), "{value}");
        }
    }

    #[test]
    fn test_parse_state_rejects_other_values() {
        for value in ["", "1", "yes", "enabled", "o n"] {
            assert!(matches!(parse_state(value), Err(Error::InvalidState { .. })));
        }
    }

    #[test]
    fn test_default_config() {
        let config = RegistrarConfig::default();
        assert!(!config.root_state);
        assert_eq!(config.window.resolution, Duration::from_secs(1));
        assert_eq!(config.window.intervals, 60);
        assert_eq!(config.window.buffer_intervals, 2);
        assert_eq!(config.shards, DEFAULT_SHARDS);
    }

    #[test]
    fn test_with_shards_is_at_least_one() {
        assert_eq!(RegistrarConfig::default().with_shards(0).shards, 1);
    }

    #[test]
    fn test_window_span() {
        let window = WindowConfig::new(Duration::from_millis(100), 10, 2);
        assert_eq!(window.span(), Duration::from_secs(1));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_deserialize_with_defaults() {
        let json = r#"{"root_state":true,"window":{"resolution":100000000,"intervals":10,"buffer_intervals":1}}"#;
        let config: RegistrarConfig = serde_json::from_str(json).unwrap();
        assert!(config.root_state);
        assert_eq!(config.window.resolution, Duration::from_millis(100));
        assert_eq!(config.shards, DEFAULT_SHARDS);
    }
}

//! Unified error type for the registry.
//!
//! Most public entry points of this crate never fail: an invalid path or a
//! malformed pattern is logged and answered with a no-op sentinel. The
//! `try_*` variants of those entry points surface the reason instead, using
//! the [`Error`] type defined here.
//!
//! # Example
//!
//! ```rust
//! use accumulatori::registry::Registrar;
//! use accumulatori::Error;
//!
//! let registrar = Registrar::new();
//! match registrar.try_node("server..requests") {
//!     Err(Error::InvalidPath { path, .. }) => assert_eq!(path, "server..requests"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use thiserror::Error;

/// Unified error type for registry, glob and configuration operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A dotted node path failed validation.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path, as given by the caller.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// An accumulator or calculator name failed validation.
    #[error("invalid name {name:?}: expected [A-Za-z0-9_]+")]
    InvalidName {
        /// The offending name.
        name: String,
    },

    /// A `node-path:member-name` reference without exactly one colon.
    #[error("invalid member path {path:?}: expected exactly one ':'")]
    InvalidMemberPath {
        /// The offending member path.
        path: String,
    },

    /// A glob pattern that cannot be parsed or compiled.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An enablement value other than `on`, `off`, `true` or `false`.
    #[error("invalid state {value:?}: expected on, off, true or false")]
    InvalidState {
        /// The offending value.
        value: String,
    },

    /// A window configuration that cannot back an interval strategy.
    #[error("invalid window: {0}")]
    InvalidWindow(&'static str),

    /// Error from JSON serialization of a snapshot.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a [`Calculator`](crate::calculators::Calculator).
///
/// A failing calculator never aborts a snapshot: the failure is logged and
/// the calculator simply contributes no entry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculatorError {
    /// An input accumulator is not registered on the node.
    #[error("missing accumulator {0:?}")]
    MissingAccumulator(String),

    /// The denominator of a ratio was zero.
    #[error("division by zero ({numerator} / {denominator})")]
    DivisionByZero {
        /// Name of the numerator accumulator.
        numerator: String,
        /// Name of the denominator accumulator.
        denominator: String,
    },

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

//! Named, switchable wrapper around a mutator.
//!
//! An [`Accumulator`] is the unit application code writes to. Its `on` flag is
//! owned by the registry node it is registered under: while the node's
//! effective state is off, writes through [`Accumulator::mutator`] are
//! dropped; reads always go through.
//!
//! # Examples
//!
//! ```rust
//! use accumulatori::registry::Registrar;
//! use accumulatori::mutators::MutatorFactory;
//!
//! let registrar = Registrar::new();
//! registrar.set_on("http", true);
//!
//! let requests = registrar
//!     .node("http.server")
//!     .accumulator_with("requests", &MutatorFactory::unbounded_sum());
//!
//! requests.mutator().put(1);
//! requests.mutator().put(1);
//! assert_eq!(requests.get(), 2);
//!
//! registrar.set_on("http", false);
//! requests.mutator().put(1);
//! assert_eq!(requests.get(), 2);
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::mutators::{Mutator, Noop};

/// A named accumulator.
pub struct Accumulator {
    name: String,
    on: AtomicBool,
    units: Option<String>,
    metadata: BTreeMap<String, String>,
    mutator: Box<dyn Mutator>,
}

impl Accumulator {
    /// Creates an accumulator, initially off.
    ///
    /// Registering it under a node sets the flag from the node's state.
    pub fn new(name: impl Into<String>, mutator: Box<dyn Mutator>) -> Self {
        Accumulator {
            name: name.into(),
            on: AtomicBool::new(false),
            units: None,
            metadata: BTreeMap::new(),
            mutator,
        }
    }

    /// The sentinel accumulator: off, reads zero, discards writes.
    pub fn noop() -> Self {
        Self::new("", Box::new(Noop))
    }

    /// Sets the units label, returning `self` for method chaining.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        Self {
            units: Some(units.into()),
            ..self
        }
    }

    /// Adds a metadata entry, returning `self` for method chaining.
    ///
    /// An existing key is overwritten.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The accumulator's name, trimmed once registered.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The units label, if any.
    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Free-form metadata for exporters.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Whether writes currently reach the mutator.
    #[inline]
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }

    /// Write handle. Writes are dropped while the accumulator is off.
    #[inline]
    pub fn mutator(&self) -> Gate<'_> {
        Gate {
            on: &self.on,
            inner: &*self.mutator,
        }
    }

    /// Current aggregate of the underlying mutator.
    #[inline]
    pub fn get(&self) -> i64 {
        self.mutator.get()
    }

    /// The underlying mutator, bypassing the on/off gate.
    pub fn raw_mutator(&self) -> &dyn Mutator {
        &*self.mutator
    }

    /// Same accumulator under `name`; used to store the normalized name.
    pub(crate) fn renamed(self, name: String) -> Self {
        Self { name, ..self }
    }

    /// Written only by the owning node.
    pub(crate) fn set_on(&self, on: bool) {
        self.on.store(on, Ordering::Relaxed);
    }
}

impl Debug for Accumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accumulator")
            .field("name", &self.name)
            .field("on", &self.is_on())
            .field("units", &self.units)
            .field("mutator", &self.mutator)
            .finish()
    }
}

/// Write handle returned by [`Accumulator::mutator`].
///
/// Holds no lock; checking the flag is a single relaxed load.
#[derive(Clone, Copy)]
pub struct Gate<'a> {
    on: &'a AtomicBool,
    inner: &'a dyn Mutator,
}

impl Gate<'_> {
    /// Folds `delta` into the mutator if the accumulator is on.
    #[inline]
    pub fn put(&self, delta: i64) {
        if self.on.load(Ordering::Relaxed) {
            self.inner.put(delta);
        }
    }

    /// Current aggregate, regardless of the on/off state.
    #[inline]
    pub fn get(&self) -> i64 {
        self.inner.get()
    }
}

impl Mutator for Gate<'_> {
    #[inline]
    fn put(&self, delta: i64) {
        Gate::put(self, delta)
    }

    #[inline]
    fn get(&self) -> i64 {
        Gate::get(self)
    }

    #[inline]
    fn combine(&self, a: i64, b: i64) -> i64 {
        self.inner.combine(a, b)
    }
}

impl Debug for Gate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gate({}) ", self.on.load(Ordering::Relaxed))?;
        Debug::fmt(self.inner, f)
    }
}

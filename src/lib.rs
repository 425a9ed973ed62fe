//! # Accumulatori - Windowed Accumulators in a Switchable Namespace
//!
//! An in-process instrumentation substrate: application code writes to named
//! accumulators on its hot paths, an exporter reads them periodically. The
//! accumulators live in a dotted namespace whose nodes can be switched on and
//! off at runtime, with the state cascading to every descendant that does not
//! override it.
//!
//! ## The Problem
//!
//! Recording "requests in the last minute" on a path hit millions of times per
//! second rules out locks, and rules out anything that allocates or waits. At
//! the same time operators want to turn whole subsystems' instrumentation on
//! and off without restarting, while new metrics are still being registered
//! concurrently.
//!
//! ## The Solution
//!
//! ### Windowed mutators
//!
//! A windowed mutator keeps a ring of time buckets. A write touches exactly
//! one bucket with plain atomic stores; a read folds the buckets of the last
//! `intervals` resolutions, the current one included. A few buffer buckets
//! ahead of the write position are left out of every read: they are the
//! next ones writers rotate into.
//!
//! ```text
//!        read window (intervals)            buffer
//!   ┌─────┬─────┬─────┬─────┬─────┬─────╥─────┬─────┐
//!   │ t-9 │ t-8 │ ... │ t-2 │ t-1 │  t  ║ t+1 │ t+2 │
//!   └─────┴─────┴─────┴─────┴─────┴──▲──╨─────┴─────┘
//!                                 write
//! ```
//!
//! Writes racing on the first write of an interval may lose a contribution.
//! This is the accepted cost of the design; unbounded mutators use a CAS loop
//! and never lose writes.
//!
//! ### Cascading state
//!
//! Every node has an optional local override and an effective state. Writes
//! check one relaxed atomic flag on the accumulator; flipping a node's state
//! pushes the new flag into every accumulator below it, stopping wherever the
//! effective state does not change.
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`clock`] | monotonic nanosecond time source, real or manual |
//! | [`mutators`] | windowed, unbounded and sharded mutator families |
//! | [`accumulator`] | named, switchable wrapper around a mutator |
//! | [`calculators`] | derived metrics computed at snapshot time |
//! | [`registry`] | namespace tree, registrar and registrar provider |
//! | [`glob`] | `node-patterns:member-patterns` queries |
//! | [`config`] | registrar configuration and the on/off parse rule |
//! | `snapshot` | serializable captures (feature `serde`) |
//!
//! ## Quick Start
//!
//! ```rust
//! use accumulatori::calculators::Rate;
//! use accumulatori::registry::Registrar;
//! use std::time::Duration;
//!
//! let registrar = Registrar::new();
//! registrar.set_on("http", true);
//!
//! let server = registrar.node("http.server");
//! let requests = server.accumulator_with("requests", &registrar.windowed_sum());
//! server.register_calculator("rps", Rate::per_second("requests", Duration::from_secs(60)));
//!
//! // Hot path: lock-free, dropped while "http" is off.
//! requests.mutator().put(1);
//!
//! // Export: every node under "http" with its values.
//! for found in registrar.find("http.**:**") {
//!     for (name, value) in found.snapshot() {
//!         println!("{}:{} = {}", found.path(), name, value);
//!     }
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | `Serialize`/`Deserialize` for configs, values and the `snapshot` module |
//! | `json` | `RegistrySnapshot::to_json` |
//! | `full` | all of the above |
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]: invalid paths, names and patterns and
//! failing calculators at `warn`, structural changes at `debug`, cascade
//! steps at `trace`. Install any subscriber to see them.

pub mod accumulator;
pub mod calculators;
pub mod clock;
pub mod config;
pub mod error;
pub mod glob;
pub mod mutators;
pub mod registry;

#[cfg(feature = "serde")]
pub mod snapshot;

pub use error::{CalculatorError, Error, Result};

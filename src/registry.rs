//! Hierarchical namespace of accumulators with cascading on/off state.
//!
//! # Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Registrar`] | owns a tree, resolves dotted paths, flips states |
//! | [`RegistryNode`] | handle on one node: children, accumulators, calculators |
//! | [`NodeId`] | index of a node in its registrar's node table |
//! | [`RegistrarProvider`] | shared or per-thread registrar selection |
//!
//! Nodes are never removed. Children are owned by their parent's child map;
//! a node reaches its parent through the registrar's node table by
//! [`NodeId`], so the tree holds no reference cycles.
//!
//! # Concurrency
//!
//! Writes through accumulators take no lock. Lookups and snapshots never
//! wait on the structural lock; a child lookup holds one shard read lock of
//! the parent's `DashMap` for a single hash lookup. Node creation,
//! registration and state changes are serialized by one reentrant lock per
//! registrar. Creating a node costs the same regardless of how many nodes or
//! siblings exist: the node table is append-only and never copied.

mod node;
pub mod path;
mod provider;
mod registrar;
mod table;

pub use node::{NodeId, RegistryNode};
pub use provider::RegistrarProvider;
pub use registrar::Registrar;

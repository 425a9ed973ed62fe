//! One element of the dotted namespace.
//!
//! A [`RegistryNode`] is a cheap, clonable handle on a node owned by its
//! [`Registrar`](super::Registrar). Reads (`accumulator`, `snapshot`,
//! `is_on`, ...) never take the structural lock: member maps are
//! copy-on-write `ArcSwap` snapshots and children live in a sharded
//! `DashMap`, so adding a child never copies its siblings. Structural changes
//! (`register_*`, `set_on`, `clear_on`, child creation) are serialized by the
//! registrar's reentrant lock.
//!
//! # Cascading state
//!
//! Each node carries an optional local override and an effective state:
//!
//! ```text
//!   root        local: Some(true)   effective: true
//!   ├── http    local: None         effective: true    (inherited)
//!   │   └── tls local: Some(false)  effective: false
//!   └── db      local: None         effective: true    (inherited)
//! ```
//!
//! Changing a node's local state recomputes its effective state and walks
//! down only while effective states actually change; every accumulator of a
//! visited node gets its `on` flag pushed.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::accumulator::Accumulator;
use crate::calculators::{Accumulators, Calculator, Value, Values};
use crate::error::Result;
use crate::mutators::MutatorFactory;
use crate::registry::path::{join, parse_path, validate_name};
use crate::registry::registrar::Shared;

/// Index of a node in its registrar's node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The root of every registrar.
    pub const ROOT: NodeId = NodeId(0);

    /// Id carried by sentinel nodes; never present in a node table.
    pub const SENTINEL: NodeId = NodeId(usize::MAX);

    /// Position in the node table.
    pub fn index(&self) -> usize {
        self.0
    }
}

const UNSET: u8 = 0;
const OFF: u8 = 1;
const ON: u8 = 2;

fn encode(state: Option<bool>) -> u8 {
    match state {
        None => UNSET,
        Some(false) => OFF,
        Some(true) => ON,
    }
}

fn decode(raw: u8) -> Option<bool> {
    match raw {
        OFF => Some(false),
        ON => Some(true),
        _ => None,
    }
}

pub(crate) type Calculators = BTreeMap<String, Arc<dyn Calculator>>;

/// Storage behind a [`RegistryNode`] handle.
pub(crate) struct NodeData {
    pub(crate) id: NodeId,
    name: String,
    full_name: String,
    parent: Option<NodeId>,
    sentinel: bool,
    children: DashMap<String, Arc<NodeData>>,
    accumulators: ArcSwap<Accumulators>,
    calculators: ArcSwap<Calculators>,
    local_state: AtomicU8,
    effective_state: AtomicBool,
}

impl NodeData {
    pub(crate) fn root(state: bool) -> Self {
        Self::new(NodeId::ROOT, String::new(), String::new(), None, state, false)
    }

    pub(crate) fn sentinel() -> Self {
        Self::new(NodeId::SENTINEL, String::new(), String::new(), None, false, true)
    }

    fn new(
        id: NodeId,
        name: String,
        full_name: String,
        parent: Option<NodeId>,
        state: bool,
        sentinel: bool,
    ) -> Self {
        NodeData {
            id,
            name,
            full_name,
            parent,
            sentinel,
            children: DashMap::new(),
            accumulators: ArcSwap::from_pointee(BTreeMap::new()),
            calculators: ArcSwap::from_pointee(BTreeMap::new()),
            local_state: AtomicU8::new(UNSET),
            effective_state: AtomicBool::new(state),
        }
    }

    #[inline]
    fn effective(&self) -> bool {
        self.effective_state.load(Ordering::Acquire)
    }

    #[inline]
    fn local(&self) -> Option<bool> {
        decode(self.local_state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn child(&self, name: &str) -> Option<Arc<NodeData>> {
        self.children.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Children in no particular order.
    fn child_list(&self) -> Vec<Arc<NodeData>> {
        self.children
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

/// Handle on a node of a registrar's tree.
///
/// # Examples
///
/// ```rust
/// use accumulatori::mutators::MutatorFactory;
/// use accumulatori::registry::Registrar;
///
/// let registrar = Registrar::new();
/// let server = registrar.node("http.server");
///
/// assert_eq!(server.full_name(), "http.server");
/// assert_eq!(server.name(), "server");
/// assert_eq!(server.parent().unwrap().full_name(), "http");
///
/// server.set_on(true);
/// let requests = server.accumulator_with("requests", &MutatorFactory::unbounded_sum());
/// assert!(requests.is_on());
///
/// server.clear_on();
/// assert!(!requests.is_on());
/// ```
#[derive(Clone)]
pub struct RegistryNode {
    shared: Arc<Shared>,
    data: Arc<NodeData>,
}

impl RegistryNode {
    pub(crate) fn from_parts(shared: Arc<Shared>, data: Arc<NodeData>) -> Self {
        RegistryNode { shared, data }
    }

    /// The sentinel node of the same registrar.
    fn sentinel(&self) -> RegistryNode {
        RegistryNode::from_parts(Arc::clone(&self.shared), self.shared.sentinel())
    }

    /// Last segment of the path; empty for the root.
    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// Dot-joined path from the root; empty for the root.
    pub fn full_name(&self) -> &str {
        &self.data.full_name
    }

    /// Position in the registrar's node table.
    pub fn id(&self) -> NodeId {
        self.data.id
    }

    /// `true` for the no-op node handed out in place of invalid paths.
    pub fn is_sentinel(&self) -> bool {
        self.data.sentinel
    }

    /// `true` for the registrar's root.
    pub fn is_root(&self) -> bool {
        !self.data.sentinel && self.data.id == NodeId::ROOT
    }

    /// The parent node, looked up through the registrar's node table.
    pub fn parent(&self) -> Option<RegistryNode> {
        let parent = self.data.parent?;
        self.shared
            .node_data(parent)
            .map(|data| RegistryNode::from_parts(Arc::clone(&self.shared), data))
    }

    /// Effective state: the local override, or the nearest ancestor's.
    #[inline]
    pub fn is_on(&self) -> bool {
        !self.data.sentinel && self.data.effective()
    }

    /// Local override, if any.
    pub fn local_state(&self) -> Option<bool> {
        self.data.local()
    }

    /// Direct child `name`, or the sentinel if there is none.
    pub fn child(&self, name: &str) -> RegistryNode {
        match self.data.child(name) {
            Some(data) => RegistryNode::from_parts(Arc::clone(&self.shared), data),
            None => self.sentinel(),
        }
    }

    /// All direct children, by name.
    pub fn children(&self) -> BTreeMap<String, RegistryNode> {
        self.data
            .child_list()
            .into_iter()
            .map(|data| {
                (
                    data.name.clone(),
                    RegistryNode::from_parts(Arc::clone(&self.shared), data),
                )
            })
            .collect()
    }

    /// Resolves, creating as needed, a path relative to this node.
    ///
    /// Invalid paths are logged and yield the sentinel.
    pub fn node(&self, relative_path: &str) -> RegistryNode {
        match self.try_node(relative_path) {
            Ok(node) => node,
            Err(err) => {
                warn!(node = %self.full_name(), path = %relative_path, error = %err, "invalid node path");
                self.sentinel()
            }
        }
    }

    /// Like [`node`](Self::node), returning the validation error.
    pub fn try_node(&self, relative_path: &str) -> Result<RegistryNode> {
        let segments = parse_path(relative_path)?;
        if self.data.sentinel {
            return Ok(self.sentinel());
        }

        let mut current = Arc::clone(&self.data);
        for segment in segments {
            current = match current.child(segment) {
                Some(child) => child,
                None => self.shared.insert_child(&current, segment),
            };
        }
        Ok(RegistryNode::from_parts(Arc::clone(&self.shared), current))
    }

    /// Accumulators registered on this node, by name.
    pub fn accumulators(&self) -> Accumulators {
        (**self.data.accumulators.load()).clone()
    }

    /// Calculators registered on this node, by name.
    pub fn calculators(&self) -> BTreeMap<String, Arc<dyn Calculator>> {
        (**self.data.calculators.load()).clone()
    }

    /// Accumulator `name`, or the no-op accumulator.
    pub fn accumulator(&self, name: &str) -> Arc<Accumulator> {
        self.data
            .accumulators
            .load()
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.shared.noop_accumulator())
    }

    /// Calculator `name`, or the no-op calculator.
    pub fn calculator(&self, name: &str) -> Arc<dyn Calculator> {
        self.data
            .calculators
            .load()
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.shared.noop_calculator())
    }

    /// Registers `accumulator` under its own name, trimmed.
    ///
    /// If the name is taken the existing accumulator is returned and
    /// `accumulator` is dropped. The winner's `on` flag starts at this
    /// node's current effective state. Invalid names are logged and yield the
    /// no-op accumulator.
    pub fn register_accumulator(&self, accumulator: Accumulator) -> Arc<Accumulator> {
        let name = match validate_name(accumulator.name()) {
            Ok(name) => name.to_string(),
            Err(err) => {
                warn!(node = %self.full_name(), error = %err, "invalid accumulator name");
                return self.shared.noop_accumulator();
            }
        };
        if self.data.sentinel {
            return self.shared.noop_accumulator();
        }
        if let Some(existing) = self.data.accumulators.load().get(&name) {
            return Arc::clone(existing);
        }

        let _guard = self.shared.lock();
        if let Some(existing) = self.data.accumulators.load().get(&name) {
            return Arc::clone(existing);
        }

        let accumulator = Arc::new(accumulator.renamed(name.clone()));
        accumulator.set_on(self.data.effective());

        let mut next = (**self.data.accumulators.load()).clone();
        next.insert(name.clone(), Arc::clone(&accumulator));
        self.data.accumulators.store(Arc::new(next));

        debug!(node = %self.full_name(), accumulator = %name, on = accumulator.is_on(), "registered accumulator");
        accumulator
    }

    /// Returns accumulator `name`, creating it with `factory` if absent.
    ///
    /// The mutator is built with the registrar's clock.
    pub fn accumulator_with(&self, name: &str, factory: &MutatorFactory) -> Arc<Accumulator> {
        if let Some(existing) = self.data.accumulators.load().get(name.trim()) {
            return Arc::clone(existing);
        }
        let mutator = factory.create(self.shared.clock());
        self.register_accumulator(Accumulator::new(name.trim(), mutator))
    }

    /// Registers `calculator` as `name`.
    ///
    /// Same insert-if-absent semantics as
    /// [`register_accumulator`](Self::register_accumulator).
    pub fn register_calculator(
        &self,
        name: &str,
        calculator: impl Calculator + 'static,
    ) -> Arc<dyn Calculator> {
        self.register_calculator_arc(name, Arc::new(calculator))
    }

    /// [`register_calculator`](Self::register_calculator) for a shared calculator.
    pub fn register_calculator_arc(
        &self,
        name: &str,
        calculator: Arc<dyn Calculator>,
    ) -> Arc<dyn Calculator> {
        let name = match validate_name(name) {
            Ok(name) => name.to_string(),
            Err(err) => {
                warn!(node = %self.full_name(), error = %err, "invalid calculator name");
                return self.shared.noop_calculator();
            }
        };
        if self.data.sentinel {
            return self.shared.noop_calculator();
        }
        if let Some(existing) = self.data.calculators.load().get(&name) {
            return Arc::clone(existing);
        }

        let _guard = self.shared.lock();
        if let Some(existing) = self.data.calculators.load().get(&name) {
            return Arc::clone(existing);
        }

        let mut next = (**self.data.calculators.load()).clone();
        next.insert(name.clone(), Arc::clone(&calculator));
        self.data.calculators.store(Arc::new(next));

        debug!(node = %self.full_name(), calculator = %name, "registered calculator");
        calculator
    }

    /// Removes accumulator `name`, returning it.
    ///
    /// Outstanding references keep working; they just stop being reachable
    /// from the tree.
    pub fn unregister_accumulator(&self, name: &str) -> Option<Arc<Accumulator>> {
        if self.data.sentinel {
            return None;
        }
        let _guard = self.shared.lock();
        let mut next = (**self.data.accumulators.load()).clone();
        let removed = next.remove(name)?;
        self.data.accumulators.store(Arc::new(next));
        debug!(node = %self.full_name(), accumulator = %name, "unregistered accumulator");
        Some(removed)
    }

    /// Removes calculator `name`, returning it.
    pub fn unregister_calculator(&self, name: &str) -> Option<Arc<dyn Calculator>> {
        if self.data.sentinel {
            return None;
        }
        let _guard = self.shared.lock();
        let mut next = (**self.data.calculators.load()).clone();
        let removed = next.remove(name)?;
        self.data.calculators.store(Arc::new(next));
        debug!(node = %self.full_name(), calculator = %name, "unregistered calculator");
        Some(removed)
    }

    /// Sets the local override and cascades.
    pub fn set_on(&self, on: bool) {
        self.update_local(Some(on));
    }

    /// Clears the local override: the node inherits from its parent again.
    pub fn clear_on(&self) {
        self.update_local(None);
    }

    fn update_local(&self, state: Option<bool>) {
        if self.data.sentinel {
            return;
        }
        let _guard = self.shared.lock();
        self.data.local_state.store(encode(state), Ordering::Release);
        debug!(node = %self.full_name(), local = ?state, "state changed");
        self.cascade(&self.data);
    }

    /// Recomputes `data`'s effective state and walks down while it changes.
    ///
    /// Caller holds the structural lock.
    fn cascade(&self, data: &Arc<NodeData>) {
        let inherited = match data.parent {
            Some(parent) => self
                .shared
                .node_data(parent)
                .map(|p| p.effective())
                .unwrap_or(false),
            None => self.shared.config().root_state,
        };
        let new_state = data.local().unwrap_or(inherited);
        if new_state == data.effective() {
            return;
        }

        trace!(node = %data.full_name, on = new_state, "cascade");
        data.effective_state.store(new_state, Ordering::Release);
        for accumulator in data.accumulators.load().values() {
            accumulator.set_on(new_state);
        }
        for child in data.child_list() {
            self.cascade(&child);
        }
    }

    /// Reads every accumulator, then runs every calculator over the values.
    ///
    /// A calculator that fails or panics is logged and contributes no entry.
    /// Raw accumulator values are merged in last and win over a calculator
    /// of the same name.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let accumulators = self.accumulators();
        let values: Values = accumulators
            .iter()
            .map(|(name, accumulator)| (name.clone(), accumulator.get()))
            .collect();

        let mut result = BTreeMap::new();
        for (name, calculator) in self.data.calculators.load().iter() {
            match catch_unwind(AssertUnwindSafe(|| {
                calculator.calculate(&values, &accumulators)
            })) {
                Ok(Ok(value)) => {
                    result.insert(name.clone(), value);
                }
                Ok(Err(err)) => {
                    warn!(node = %self.full_name(), calculator = %name, error = %err, "calculator failed");
                }
                Err(_) => {
                    warn!(node = %self.full_name(), calculator = %name, "calculator panicked");
                }
            }
        }

        for (name, value) in values {
            result.insert(name, Value::Int(value));
        }
        result
    }

    /// Visits this node and its descendants depth-first, children in name order.
    pub fn walk(&self, visitor: &mut impl FnMut(&RegistryNode)) {
        visitor(self);
        for child in self.children().values() {
            child.walk(visitor);
        }
    }
}

impl PartialEq for RegistryNode {
    /// Two handles are equal if they point to the same node.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for RegistryNode {}

impl Debug for RegistryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryNode")
            .field("full_name", &self.data.full_name)
            .field("id", &self.data.id)
            .field("local", &self.data.local())
            .field("on", &self.is_on())
            .field("sentinel", &self.data.sentinel)
            .finish()
    }
}

/// Builds a child record for the registrar's table.
pub(crate) fn child_data(parent: &NodeData, id: NodeId, name: &str) -> NodeData {
    NodeData::new(
        id,
        name.to_string(),
        join(&parent.full_name, name),
        Some(parent.id),
        parent.effective(),
        false,
    )
}

/// Publishes `child` in `parent`'s child map. Caller holds the structural lock.
pub(crate) fn attach_child(parent: &NodeData, child: &Arc<NodeData>) {
    parent.children.insert(child.name.clone(), Arc::clone(child));
}

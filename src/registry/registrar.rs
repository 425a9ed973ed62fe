//! The registrar: owner of one node tree.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, warn};

use crate::accumulator::Accumulator;
use crate::calculators::{Calculator, NoopCalculator};
use crate::clock::{Clock, SystemClock};
use crate::config::{parse_state, RegistrarConfig, WindowConfig};
use crate::error::Result;
use crate::glob::{GlobMatch, GlobPattern};
use crate::mutators::{IntervalStrategy, MutatorFactory};
use crate::registry::node::{attach_child, child_data, NodeData, NodeId, RegistryNode};
use crate::registry::path::{parse_path, split_member_path};
use crate::registry::table::NodeTable;

/// State shared by a registrar and every node handle it gives out.
pub(crate) struct Shared {
    config: RegistrarConfig,
    clock: Arc<dyn Clock>,
    strategy: IntervalStrategy,
    lock: ReentrantMutex<()>,
    nodes: NodeTable,
    sentinel: Arc<NodeData>,
    noop_accumulator: Arc<Accumulator>,
    noop_calculator: Arc<dyn Calculator>,
}

impl Shared {
    pub(crate) fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub(crate) fn sentinel(&self) -> Arc<NodeData> {
        Arc::clone(&self.sentinel)
    }

    pub(crate) fn noop_accumulator(&self) -> Arc<Accumulator> {
        Arc::clone(&self.noop_accumulator)
    }

    pub(crate) fn noop_calculator(&self) -> Arc<dyn Calculator> {
        Arc::clone(&self.noop_calculator)
    }

    pub(crate) fn node_data(&self, id: NodeId) -> Option<Arc<NodeData>> {
        self.nodes.get(id)
    }

    fn root(&self) -> Arc<NodeData> {
        // The table is created with the root in slot 0 and only ever grows.
        self.node_data(NodeId::ROOT)
            .unwrap_or_else(|| Arc::clone(&self.sentinel))
    }

    /// Inserts child `name` under `parent` unless another thread got there first.
    pub(crate) fn insert_child(&self, parent: &Arc<NodeData>, name: &str) -> Arc<NodeData> {
        let _guard = self.lock();
        if let Some(existing) = parent.child(name) {
            return existing;
        }

        let child = self.nodes.push_with(|id| child_data(parent, id, name));
        attach_child(parent, &child);

        debug!(id = child.id.0, parent = parent.id.0, name = %name, "created node");
        child
    }
}

/// Owner of a node tree: resolves paths, flips states, answers lookups.
///
/// Cloning a `Registrar` clones a handle; every clone sees the same tree.
/// There is no process-wide instance: create one at startup and hand it to
/// whoever needs it, or use a [`RegistrarProvider`](super::RegistrarProvider).
///
/// # Examples
///
/// ```rust
/// use accumulatori::registry::Registrar;
///
/// let registrar = Registrar::new();
/// registrar.set_on("", true);
///
/// let node = registrar.node("a.b");
/// assert!(node.is_on());
/// assert_eq!(registrar.node("a.b"), node);
///
/// registrar.set_on("", false);
/// assert!(!node.is_on());
///
/// // Invalid paths never create anything.
/// assert!(registrar.node("a..b").is_sentinel());
/// assert_eq!(registrar.node_count(), 3);
/// ```
#[derive(Clone)]
pub struct Registrar {
    shared: Arc<Shared>,
}

impl Registrar {
    /// Creates a registrar with the default configuration and the system clock.
    pub fn new() -> Self {
        Self::with_config(RegistrarConfig::default())
    }

    /// Creates a registrar with `config` and the system clock.
    pub fn with_config(config: RegistrarConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Creates a registrar reading time from `clock`.
    ///
    /// A window shape that cannot back an interval strategy is logged and
    /// replaced by the default one.
    pub fn with_clock(config: RegistrarConfig, clock: Arc<dyn Clock>) -> Self {
        let (config, strategy) = match IntervalStrategy::try_from(config.window) {
            Ok(strategy) => (config, strategy),
            Err(err) => {
                warn!(error = %err, window = ?config.window, "falling back to the default window");
                (
                    config.with_window(WindowConfig::default()),
                    IntervalStrategy::default(),
                )
            }
        };

        let nodes = NodeTable::new();
        nodes.push_with(|_| NodeData::root(config.root_state));
        Registrar {
            shared: Arc::new(Shared {
                strategy,
                clock,
                lock: ReentrantMutex::new(()),
                nodes,
                sentinel: Arc::new(NodeData::sentinel()),
                noop_accumulator: Arc::new(Accumulator::noop()),
                noop_calculator: Arc::new(NoopCalculator),
                config,
            }),
        }
    }

    /// The configuration the registrar was built with.
    pub fn config(&self) -> &RegistrarConfig {
        &self.shared.config
    }

    /// The time source handed to windowed mutators.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.shared.clock()
    }

    /// The interval strategy of the configured window.
    pub fn strategy(&self) -> IntervalStrategy {
        self.shared.strategy
    }

    /// The root node. Its path is the empty string.
    pub fn root_node(&self) -> RegistryNode {
        RegistryNode::from_parts(Arc::clone(&self.shared), self.shared.root())
    }

    /// Number of nodes in the tree, root included.
    pub fn node_count(&self) -> usize {
        self.shared.nodes.len()
    }

    /// The node with id `id`, if it exists.
    pub fn node_by_id(&self, id: NodeId) -> Option<RegistryNode> {
        self.shared
            .node_data(id)
            .map(|data| RegistryNode::from_parts(Arc::clone(&self.shared), data))
    }

    /// Resolves `path`, creating missing nodes.
    ///
    /// Idempotent: the same path always yields the same node. An invalid path
    /// is logged and yields the sentinel node; nothing is created.
    pub fn node(&self, path: &str) -> RegistryNode {
        match self.try_node(path) {
            Ok(node) => node,
            Err(err) => {
                warn!(path = %path, error = %err, "invalid node path");
                self.sentinel()
            }
        }
    }

    /// Like [`node`](Self::node), returning the validation error.
    pub fn try_node(&self, path: &str) -> Result<RegistryNode> {
        self.root_node().try_node(path)
    }

    /// Resolves `path` without creating anything.
    pub fn existing_node(&self, path: &str) -> Option<RegistryNode> {
        let segments = parse_path(path).ok()?;
        let mut current = self.shared.root();
        for segment in segments {
            current = current.child(segment)?;
        }
        Some(RegistryNode::from_parts(Arc::clone(&self.shared), current))
    }

    /// Sets the local state of the node at `path`, creating it if needed.
    ///
    /// A malformed path is logged and ignored.
    pub fn set_on(&self, path: &str, on: bool) {
        if let Err(err) = self.try_set_on(path, on) {
            warn!(path = %path, error = %err, "ignoring state change");
        }
    }

    /// Like [`set_on`](Self::set_on), returning the validation error.
    pub fn try_set_on(&self, path: &str, on: bool) -> Result<()> {
        self.try_node(path)?.set_on(on);
        Ok(())
    }

    /// Clears the local state of the node at `path`.
    ///
    /// A malformed path is logged and ignored.
    pub fn clear_on(&self, path: &str) {
        if let Err(err) = self.try_clear_on(path) {
            warn!(path = %path, error = %err, "ignoring state change");
        }
    }

    /// Like [`clear_on`](Self::clear_on), returning the validation error.
    pub fn try_clear_on(&self, path: &str) -> Result<()> {
        self.try_node(path)?.clear_on();
        Ok(())
    }

    /// Applies `path = on|off|true|false` entries, as read by a config loader.
    ///
    /// Entries whose path or value does not parse are logged and skipped.
    /// Returns how many entries were applied.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use accumulatori::registry::Registrar;
    ///
    /// let registrar = Registrar::new();
    /// let applied = registrar.apply_states([
    ///     ("http", "on"),
    ///     ("http.tls", "OFF"),
    ///     ("db", "maybe"),
    /// ]);
    ///
    /// assert_eq!(applied, 2);
    /// assert!(registrar.node("http.server").is_on());
    /// assert!(!registrar.node("http.tls").is_on());
    /// ```
    pub fn apply_states<I, P, V>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (P, V)>,
        P: AsRef<str>,
        V: AsRef<str>,
    {
        let mut applied = 0;
        for (path, value) in entries {
            let (path, value) = (path.as_ref(), value.as_ref());
            let result = parse_state(value).and_then(|on| self.try_set_on(path, on));
            match result {
                Ok(()) => applied += 1,
                Err(err) => warn!(path = %path, value = %value, error = %err, "skipping state entry"),
            }
        }
        applied
    }

    /// Looks up an accumulator by `node-path:name`, or returns the no-op one.
    ///
    /// Never creates nodes.
    pub fn accumulator(&self, member_path: &str) -> Arc<Accumulator> {
        match self.try_accumulator(member_path) {
            Ok(Some(accumulator)) => accumulator,
            Ok(None) => self.shared.noop_accumulator(),
            Err(err) => {
                warn!(path = %member_path, error = %err, "invalid accumulator path");
                self.shared.noop_accumulator()
            }
        }
    }

    /// Like [`accumulator`](Self::accumulator), distinguishing a malformed
    /// reference from an unknown one.
    pub fn try_accumulator(&self, member_path: &str) -> Result<Option<Arc<Accumulator>>> {
        let (node, name) = split_member_path(member_path)?;
        parse_path(node)?;
        Ok(self
            .existing_node(node)
            .and_then(|node| node.accumulators().get(name.trim()).cloned()))
    }

    /// Looks up a calculator by `node-path:name`, or returns the no-op one.
    ///
    /// Never creates nodes.
    pub fn calculator(&self, member_path: &str) -> Arc<dyn Calculator> {
        match self.try_calculator(member_path) {
            Ok(Some(calculator)) => calculator,
            Ok(None) => self.shared.noop_calculator(),
            Err(err) => {
                warn!(path = %member_path, error = %err, "invalid calculator path");
                self.shared.noop_calculator()
            }
        }
    }

    /// Like [`calculator`](Self::calculator), distinguishing a malformed
    /// reference from an unknown one.
    pub fn try_calculator(&self, member_path: &str) -> Result<Option<Arc<dyn Calculator>>> {
        let (node, name) = split_member_path(member_path)?;
        parse_path(node)?;
        Ok(self
            .existing_node(node)
            .and_then(|node| node.calculators().get(name.trim()).cloned()))
    }

    /// Matches `pattern` against the whole tree, depth-first from the root.
    ///
    /// A malformed pattern is logged and matches nothing.
    pub fn find(&self, pattern: &str) -> Vec<GlobMatch> {
        self.try_find(pattern).unwrap_or_else(|err| {
            warn!(pattern = %pattern, error = %err, "invalid glob pattern");
            Vec::new()
        })
    }

    /// Like [`find`](Self::find), returning the parse error.
    pub fn try_find(&self, pattern: &str) -> Result<Vec<GlobMatch>> {
        let pattern = GlobPattern::parse(pattern)?;
        Ok(pattern.find(&self.root_node()))
    }

    /// Factory for a windowed sum over the configured window.
    pub fn windowed_sum(&self) -> MutatorFactory {
        MutatorFactory::windowed_sum(self.shared.strategy)
    }

    /// Factory for a windowed minimum over the configured window.
    pub fn windowed_min(&self) -> MutatorFactory {
        MutatorFactory::windowed_min(self.shared.strategy)
    }

    /// Factory for a windowed maximum over the configured window.
    pub fn windowed_max(&self) -> MutatorFactory {
        MutatorFactory::windowed_max(self.shared.strategy)
    }

    /// `factory`, sharded with the configured shard count.
    pub fn sharded(&self, factory: MutatorFactory) -> MutatorFactory {
        factory.sharded(self.shared.config.shards)
    }

    fn sentinel(&self) -> RegistryNode {
        RegistryNode::from_parts(Arc::clone(&self.shared), self.shared.sentinel())
    }
}

impl Default for Registrar {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Registrar {
    /// Lists every node that has accumulators or a local state.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes = BTreeMap::new();
        self.root_node().walk(&mut |node| {
            let accumulators = node.accumulators();
            if !accumulators.is_empty() || node.local_state().is_some() {
                nodes.insert(
                    node.full_name().to_string(),
                    (node.is_on(), accumulators.len()),
                );
            }
        });
        f.debug_struct("Registrar")
            .field("config", &self.shared.config)
            .field("node_count", &self.node_count())
            .field("nodes", &nodes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::{FnCalculator, Value};
    use crate::clock::ManualClock;
    use crate::error::Error;
    use std::thread;
    use std::time::{Duration, Instant};

    fn manual() -> (Registrar, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = RegistrarConfig::default()
            .with_window(WindowConfig::new(Duration::from_millis(100), 10, 2));
        (Registrar::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let registrar = Registrar::new();
        let a = registrar.node("a.b.c");
        let b = registrar.node(" a . b . c ");
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_eq!(registrar.node_count(), 4);
    }

    #[test]
    fn test_invalid_paths_create_nothing() {
        let registrar = Registrar::new();
        for path in ["a..b", "a. .b", "a.b-c", "a.", "héllo", "a:b"] {
            assert!(registrar.node(path).is_sentinel(), "{path}");
        }
        assert_eq!(registrar.node_count(), 1);
        assert!(matches!(
            registrar.try_node("a..b"),
            Err(Error::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_empty_path_is_root() {
        let registrar = Registrar::new();
        assert!(registrar.node("").is_root());
        assert!(registrar.node("  ").is_root());
    }

    #[test]
    fn test_root_state_inherited() {
        let registrar = Registrar::new();
        registrar.set_on("", true);
        let node = registrar.node("a.b");
        assert!(node.is_on());

        registrar.set_on("", false);
        assert!(!node.is_on());
    }

    #[test]
    fn test_config_root_state() {
        let registrar = Registrar::with_config(RegistrarConfig::default().with_root_state(true));
        assert!(registrar.node("x.y").is_on());

        registrar.set_on("", false);
        registrar.clear_on("");
        assert!(registrar.node("x.y").is_on());
    }

    #[test]
    fn test_set_on_by_path_creates_node() {
        let registrar = Registrar::new();
        registrar.set_on("http.server", true);
        assert_eq!(registrar.node("http.server").local_state(), Some(true));
        assert!(!registrar.node("http").is_on());
    }

    #[test]
    fn test_set_on_malformed_path_is_ignored() {
        let registrar = Registrar::new();
        registrar.set_on("http..server", true);
        assert_eq!(registrar.node_count(), 1);
        assert!(registrar.try_clear_on("bad path").is_err());
    }

    #[test]
    fn test_existing_node_does_not_create() {
        let registrar = Registrar::new();
        assert!(registrar.existing_node("a.b").is_none());
        registrar.node("a.b");
        assert!(registrar.existing_node("a.b").is_some());
        assert!(registrar.existing_node("a.b.c").is_none());
        assert_eq!(registrar.node_count(), 3);
    }

    #[test]
    fn test_node_by_id_and_parent() {
        let registrar = Registrar::new();
        let leaf = registrar.node("a.b");
        let parent = leaf.parent().unwrap();
        assert_eq!(parent.full_name(), "a");
        assert_eq!(registrar.node_by_id(leaf.id()), Some(leaf));
        assert!(registrar.node_by_id(NodeId(99)).is_none());
    }

    #[test]
    fn test_member_lookup() {
        let registrar = Registrar::new();
        let node = registrar.node("http.server");
        let requests = node.accumulator_with("requests", &MutatorFactory::unbounded_sum());
        node.register_calculator("label", FnCalculator::new(|_, _| Ok(Value::from("up"))));

        assert!(Arc::ptr_eq(
            &registrar.accumulator("http.server:requests"),
            &requests
        ));
        let label = registrar.calculator("http.server:label");
        assert_eq!(
            label.calculate(&BTreeMap::new(), &BTreeMap::new()),
            Ok(Value::from("up"))
        );
    }

    #[test]
    fn test_malformed_member_path_yields_noop() {
        let registrar = Registrar::new();
        registrar
            .node("a")
            .accumulator_with("b", &MutatorFactory::unbounded_sum())
            .raw_mutator()
            .put(7);

        for path in ["a:b:c", "a", "a..x:b", "missing:b", "a:missing"] {
            let acc = registrar.accumulator(path);
            assert_eq!(acc.get(), 0, "{path}");
            assert!(!acc.is_on(), "{path}");
            let calc = registrar.calculator(path);
            assert_eq!(
                calc.calculate(&BTreeMap::new(), &BTreeMap::new()),
                Ok(Value::Int(0))
            );
        }
        assert_eq!(registrar.accumulator("a:b").get(), 7);
        assert!(matches!(
            registrar.try_accumulator("a:b:c"),
            Err(Error::InvalidMemberPath { .. })
        ));
        assert!(registrar.try_accumulator("a:missing").unwrap().is_none());
        assert!(registrar.existing_node("missing").is_none());
    }

    #[test]
    fn test_windowed_helpers_use_registrar_clock() {
        let (registrar, clock) = manual();
        registrar.set_on("", true);
        let node = registrar.node("api");
        let calls = node.accumulator_with("calls", &registrar.windowed_sum());

        for i in 0..10 {
            if i > 0 {
                clock.advance(Duration::from_millis(100));
            }
            calls.mutator().put(1);
        }
        // the tenth write is in the current bucket
        assert_eq!(calls.get(), 10);

        clock.advance(Duration::from_millis(100));
        assert_eq!(calls.get(), 9);

        clock.advance(Duration::from_secs(5));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_invalid_window_falls_back_to_default() {
        let config =
            RegistrarConfig::default().with_window(WindowConfig::new(Duration::ZERO, 10, 2));
        let registrar = Registrar::with_config(config);
        assert_eq!(registrar.config().window, WindowConfig::default());
        assert_eq!(registrar.strategy().intervals(), 60);
    }

    #[test]
    fn test_sharded_helper() {
        let registrar = Registrar::with_config(RegistrarConfig::default().with_shards(4));
        let factory = registrar.sharded(MutatorFactory::unbounded_sum());
        assert_eq!(factory.shards(), Some(4));
    }

    #[test]
    fn test_concurrent_resolution_yields_one_node() {
        let registrar = Registrar::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registrar = registrar.clone();
                thread::spawn(move || registrar.node("shared.deep.path"))
            })
            .collect();

        let nodes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for node in &nodes {
            assert_eq!(node, &nodes[0]);
        }
        assert_eq!(registrar.node_count(), 4);
    }

    #[test]
    fn test_concurrent_writes_while_toggling() {
        let registrar = Registrar::new();
        registrar.set_on("", true);
        let hits = registrar
            .node("hot")
            .accumulator_with("hits", &MutatorFactory::unbounded_sum());

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let hits = Arc::clone(&hits);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        hits.mutator().put(1);
                    }
                })
            })
            .collect();

        for i in 0..50 {
            registrar.set_on("hot", i % 2 == 0);
        }
        for w in writers {
            w.join().unwrap();
        }

        assert!(hits.get() <= 4000);
        assert!(!registrar.node("hot").is_on());
    }

    #[test]
    fn test_cascade_consistent_with_concurrent_creation() {
        let registrar = Registrar::new();
        let toggler = {
            let registrar = registrar.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    registrar.set_on("x", i % 2 == 0);
                }
                registrar.set_on("x", true);
            })
        };

        let creators: Vec<_> = (0..4)
            .map(|t| {
                let registrar = registrar.clone();
                thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            registrar
                                .node(&format!("x.t{t}_{i}.y"))
                                .accumulator_with("hits", &MutatorFactory::unbounded_sum())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let accumulators: Vec<_> = creators
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        toggler.join().unwrap();

        let x = registrar.node("x");
        assert!(x.is_on());
        assert_eq!(accumulators.len(), 200);
        assert!(accumulators.iter().all(|acc| acc.is_on()));

        let mut visited = 0;
        x.walk(&mut |node| {
            visited += 1;
            assert!(node.is_on(), "{}", node.full_name());
            for acc in node.accumulators().values() {
                assert!(acc.is_on(), "{}", node.full_name());
            }
        });
        assert_eq!(visited, 1 + 200 * 2);
    }

    #[test]
    fn test_node_creation_cost_does_not_grow_with_siblings() {
        let registrar = Registrar::new();
        let root = registrar.root_node();
        let batch = |range: std::ops::Range<usize>| {
            let started = Instant::now();
            for i in range {
                root.node(&format!("n{i}"));
            }
            started.elapsed()
        };

        let first = batch(0..2_000);
        let rest = batch(2_000..20_000);
        assert_eq!(registrar.node_count(), 20_001);

        // nine times the nodes; copying the sibling map per insert is ~80x
        assert!(
            rest < first * 30 + Duration::from_millis(250),
            "first {first:?}, rest {rest:?}"
        );
        assert_eq!(registrar.node("n19999").id(), NodeId(20_000));
        assert_eq!(
            registrar.node_by_id(NodeId(1_000)).map(|n| n.full_name().to_string()),
            Some("n999".to_string())
        );
        assert!(registrar.node_by_id(NodeId(20_001)).is_none());
    }

    #[test]
    fn test_debug_lists_active_nodes() {
        let registrar = Registrar::new();
        registrar.set_on("http", true);
        registrar.node("quiet");
        let debug_str = format!("{:?}", registrar);
        assert!(debug_str.contains("Registrar"));
        assert!(debug_str.contains("http"));
        assert!(!debug_str.contains("quiet"));
    }
}

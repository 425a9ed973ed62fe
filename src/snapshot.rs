//! Serializable point-in-time captures of a registry tree.
//!
//! # Feature Flag
//!
//! This module requires the `serde` feature; [`RegistrySnapshot::to_json`]
//! additionally requires `json`:
//!
//! ```toml
//! [dependencies]
//! accumulatori = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use accumulatori::mutators::MutatorFactory;
//! use accumulatori::registry::Registrar;
//! use accumulatori::snapshot::RegistrySnapshot;
//!
//! let registrar = Registrar::new();
//! registrar.set_on("http", true);
//! registrar
//!     .node("http.server")
//!     .accumulator_with("requests", &MutatorFactory::unbounded_sum())
//!     .mutator()
//!     .put(42);
//!
//! let snapshot = RegistrySnapshot::collect(&registrar.root_node());
//! let server = snapshot.get("http.server").unwrap();
//! assert!(server.on);
//! assert_eq!(server.values["requests"].as_i64(), Some(42));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::calculators::Value;
use crate::glob::GlobMatch;
use crate::registry::RegistryNode;

/// One node's values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSnapshot {
    /// Full dotted path; empty for the root.
    pub path: String,
    /// Effective state when the snapshot was taken.
    pub on: bool,
    /// Accumulator values and calculator outputs by name.
    pub values: BTreeMap<String, Value>,
}

impl NodeSnapshot {
    /// Captures `node`'s full snapshot.
    pub fn from_node(node: &RegistryNode) -> Self {
        NodeSnapshot {
            path: node.full_name().to_string(),
            on: node.is_on(),
            values: node.snapshot(),
        }
    }

    /// Captures the members selected by a glob match.
    pub fn from_match(found: &GlobMatch) -> Self {
        NodeSnapshot {
            path: found.path().to_string(),
            on: found.node().is_on(),
            values: found.snapshot(),
        }
    }
}

/// A collection of node snapshots, typically one export cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrySnapshot {
    /// Optional timestamp in milliseconds since Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    /// The node snapshots, depth-first in name order.
    pub nodes: Vec<NodeSnapshot>,
}

impl RegistrySnapshot {
    /// Creates a snapshot from already captured nodes.
    pub fn new(nodes: Vec<NodeSnapshot>) -> Self {
        Self {
            timestamp_ms: None,
            nodes,
        }
    }

    /// Captures `root` and every descendant.
    ///
    /// Nodes without accumulators or calculators are skipped.
    pub fn collect(root: &RegistryNode) -> Self {
        let mut nodes = Vec::new();
        root.walk(&mut |node| {
            if !node.accumulators().is_empty() || !node.calculators().is_empty() {
                nodes.push(NodeSnapshot::from_node(node));
            }
        });
        Self::new(nodes)
    }

    /// Captures the result of a glob query.
    pub fn from_matches(matches: &[GlobMatch]) -> Self {
        Self::new(matches.iter().map(NodeSnapshot::from_match).collect())
    }

    /// Sets the timestamp, returning `self` for method chaining.
    pub fn with_timestamp(self, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            ..self
        }
    }

    /// Finds a node by path.
    pub fn get(&self, path: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.path == path)
    }

    /// Serializes the snapshot to JSON.
    #[cfg(feature = "json")]
    pub fn to_json(&self, pretty: bool) -> crate::Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::Summary;
    use crate::mutators::MutatorFactory;
    use crate::registry::Registrar;

    fn populated() -> Registrar {
        let registrar = Registrar::new();
        registrar.set_on("", true);
        let server = registrar.node("http.server");
        server
            .accumulator_with("requests", &MutatorFactory::unbounded_sum())
            .mutator()
            .put(10);
        server
            .accumulator_with("errors", &MutatorFactory::unbounded_sum())
            .mutator()
            .put(1);
        server.register_calculator(
            "totals",
            Summary::new().with("ok", "requests").with("ko", "errors"),
        );
        registrar.node("idle");
        registrar
    }

    #[test]
    fn test_collect_skips_empty_nodes() {
        let snapshot = RegistrySnapshot::collect(&populated().root_node());
        assert_eq!(snapshot.nodes.len(), 1);
        assert!(snapshot.get("idle").is_none());

        let server = snapshot.get("http.server").unwrap();
        assert_eq!(server.values["requests"], Value::Int(10));
        assert_eq!(server.values["totals"].property("ko"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_from_matches() {
        let registrar = populated();
        let snapshot = RegistrySnapshot::from_matches(&registrar.find("http.*:errors"));
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].values.len(), 1);
        assert_eq!(snapshot.nodes[0].values["errors"], Value::Int(1));
    }

    #[test]
    fn test_with_timestamp() {
        let snapshot = RegistrySnapshot::new(Vec::new()).with_timestamp(1234567890);
        assert_eq!(snapshot.timestamp_ms, Some(1234567890));
    }

    #[test]
    fn test_serialize_node_snapshot() {
        let snapshot = NodeSnapshot {
            path: "db".to_string(),
            on: true,
            values: BTreeMap::from([
                ("queries".to_string(), Value::Int(3)),
                ("ratio".to_string(), Value::Float(0.5)),
            ]),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(
            json,
            r#"{"path":"db","on":true,"values":{"queries":3,"ratio":0.5}}"#
        );
    }

    #[test]
    fn test_deserialize_registry_snapshot() {
        let json = r#"{"timestamp_ms":1,"nodes":[{"path":"a","on":false,"values":{"n":2,"s":"up","c":{"x":1}}}]}"#;
        let snapshot: RegistrySnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.timestamp_ms, Some(1));
        let node = snapshot.get("a").unwrap();
        assert_eq!(node.values["n"], Value::Int(2));
        assert_eq!(node.values["s"], Value::from("up"));
        assert_eq!(node.values["c"].property("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_timestamp_omitted_when_absent() {
        let json = serde_json::to_string(&RegistrySnapshot::new(Vec::new())).unwrap();
        assert_eq!(json, r#"{"nodes":[]}"#);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_to_json() {
        let snapshot = RegistrySnapshot::collect(&populated().root_node()).with_timestamp(7);
        let compact = snapshot.to_json(false).unwrap();
        assert!(compact.starts_with(r#"{"timestamp_ms":7,"nodes":[{"path":"http.server""#));
        let pretty = snapshot.to_json(true).unwrap();
        assert!(pretty.contains('\n'));
    }
}

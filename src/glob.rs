//! Glob queries over the registry tree.
//!
//! A pattern has two comma-separated pattern lists joined by one colon:
//!
//! ```text
//!   http.*,db.**  :  requests,latency.*
//!   └── node side ─┘  └── member side ──┘
//! ```
//!
//! | Token | Matches |
//! |-------|---------|
//! | `*`   | zero or more characters within one segment |
//! | `?`   | exactly one character within one segment |
//! | `**`  | zero or more whole segments |
//!
//! A node is included when its full path matches any node-side alternative.
//! Its members are then filtered by the member side: every accumulator name
//! is a candidate, and every calculator contributes
//! `<calculator>.<property>` per declared property (or its bare name when it
//! declares none).
//!
//! An empty side, as in `":**"`, matches only the empty name: the root node.
//!
//! # Examples
//!
//! ```rust
//! use accumulatori::glob::GlobPattern;
//!
//! let pattern = GlobPattern::parse("foo.**:*").unwrap();
//! assert!(pattern.matches_node("foo.bar"));
//! assert!(pattern.matches_node("foo.bar.baz"));
//! assert!(!pattern.matches_node("foo"));
//! assert!(!pattern.matches_node("blah.foo"));
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use regex::Regex;

use crate::accumulator::Accumulator;
use crate::calculators::{Accumulators, Calculator, Value};
use crate::error::{Error, Result};
use crate::registry::RegistryNode;

/// A compiled `node-patterns:member-patterns` query.
#[derive(Clone)]
pub struct GlobPattern {
    source: String,
    nodes: Regex,
    members: Regex,
}

impl GlobPattern {
    /// Parses and compiles `pattern`.
    ///
    /// Fails unless the pattern has exactly one colon and every alternative
    /// uses only `[A-Za-z0-9_.*?]` once trimmed.
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut sides = pattern.split(':');
        let (nodes, members) = match (sides.next(), sides.next(), sides.next()) {
            (Some(nodes), Some(members), None) => (nodes, members),
            _ => return Err(invalid(pattern, "expected exactly one ':'")),
        };

        Ok(GlobPattern {
            source: pattern.to_string(),
            nodes: compile_side(pattern, nodes)?,
            members: compile_side(pattern, members)?,
        })
    }

    /// The pattern as given.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether a node's full path matches the node side.
    #[inline]
    pub fn matches_node(&self, full_name: &str) -> bool {
        self.nodes.is_match(full_name)
    }

    /// Whether a member candidate matches the member side.
    #[inline]
    pub fn matches_member(&self, candidate: &str) -> bool {
        self.members.is_match(candidate)
    }

    /// Matches one node, ignoring its descendants.
    ///
    /// Returns `None` if the node's path does not match. A matching node
    /// whose members all fail the member side still yields a (memberless)
    /// match.
    pub fn evaluate(&self, node: &RegistryNode) -> Option<GlobMatch> {
        if node.is_sentinel() || !self.matches_node(node.full_name()) {
            return None;
        }

        let accumulators: Accumulators = node
            .accumulators()
            .into_iter()
            .filter(|(name, _)| self.matches_member(name))
            .collect();

        let calculators = node
            .calculators()
            .into_iter()
            .filter_map(|(name, calculator)| {
                let declared = calculator.properties();
                if declared.is_empty() {
                    return self
                        .matches_member(&name)
                        .then(|| (name, MatchedCalculator::new(calculator, Vec::new())));
                }
                let properties: Vec<String> = declared
                    .into_iter()
                    .filter(|property| self.matches_member(&format!("{name}.{property}")))
                    .collect();
                (!properties.is_empty())
                    .then(|| (name, MatchedCalculator::new(calculator, properties)))
            })
            .collect();

        Some(GlobMatch {
            node: node.clone(),
            accumulators,
            calculators,
        })
    }

    /// Matches `root` and all its descendants, depth-first in name order.
    pub fn find(&self, root: &RegistryNode) -> Vec<GlobMatch> {
        let mut matches = Vec::new();
        root.walk(&mut |node| {
            if let Some(found) = self.evaluate(node) {
                matches.push(found);
            }
        });
        matches
    }
}

impl Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobPattern")
            .field("source", &self.source)
            .field("nodes", &self.nodes.as_str())
            .field("members", &self.members.as_str())
            .finish()
    }
}

fn invalid(pattern: &str, reason: impl Into<String>) -> Error {
    Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

/// Compiles one comma-separated side into a single anchored regex.
fn compile_side(pattern: &str, side: &str) -> Result<Regex> {
    let alternatives: Vec<&str> = side.split(',').map(str::trim).collect();
    if alternatives.len() > 1 && alternatives.iter().any(|alt| alt.is_empty()) {
        return Err(invalid(pattern, "empty alternative"));
    }

    let mut translated = Vec::with_capacity(alternatives.len());
    for alternative in alternatives {
        translated.push(translate(pattern, alternative)?);
    }

    let source = format!("^(?:{})$", translated.join("|"));
    Regex::new(&source).map_err(|err| invalid(pattern, err.to_string()))
}

/// Translates one glob alternative into regex syntax.
fn translate(pattern: &str, glob: &str) -> Result<String> {
    let bytes = glob.as_bytes();
    let mut out = String::with_capacity(glob.len() * 2);
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'*' if bytes.get(i + 1) == Some(&b'*') => {
                let at_segment_start = i == 0 || bytes[i - 1] == b'.';
                if at_segment_start && bytes.get(i + 2) == Some(&b'.') {
                    // Leading or interior `**.` may match no segment at all.
                    out.push_str(r"(?:.*\.)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            b'*' => {
                out.push_str("[^.]*");
                i += 1;
            }
            b'?' => {
                out.push_str("[^.]");
                i += 1;
            }
            b'.' => {
                out.push_str(r"\.");
                i += 1;
            }
            b if b.is_ascii_alphanumeric() || b == b'_' => {
                out.push(b as char);
                i += 1;
            }
            _ => {
                return Err(invalid(
                    pattern,
                    format!("{glob:?} may only contain [A-Za-z0-9_.*?]"),
                ))
            }
        }
    }
    Ok(out)
}

/// A calculator selected by the member side, with the properties that matched.
#[derive(Clone)]
pub struct MatchedCalculator {
    calculator: Arc<dyn Calculator>,
    properties: Vec<String>,
}

impl MatchedCalculator {
    fn new(calculator: Arc<dyn Calculator>, properties: Vec<String>) -> Self {
        MatchedCalculator {
            calculator,
            properties,
        }
    }

    /// The calculator.
    pub fn calculator(&self) -> &Arc<dyn Calculator> {
        &self.calculator
    }

    /// Matched properties; empty when the calculator matched by bare name.
    pub fn properties(&self) -> &[String] {
        &self.properties
    }
}

impl Debug for MatchedCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchedCalculator")
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// One node selected by a [`GlobPattern`], with its filtered members.
#[derive(Debug, Clone)]
pub struct GlobMatch {
    node: RegistryNode,
    accumulators: Accumulators,
    calculators: BTreeMap<String, MatchedCalculator>,
}

impl GlobMatch {
    /// The matched node.
    pub fn node(&self) -> &RegistryNode {
        &self.node
    }

    /// Full path of the matched node.
    pub fn path(&self) -> &str {
        self.node.full_name()
    }

    /// Accumulators whose names matched the member side.
    pub fn accumulators(&self) -> &BTreeMap<String, Arc<Accumulator>> {
        &self.accumulators
    }

    /// Calculators with at least one matching candidate.
    pub fn calculators(&self) -> &BTreeMap<String, MatchedCalculator> {
        &self.calculators
    }

    /// All children of the node, unfiltered.
    pub fn children(&self) -> BTreeMap<String, RegistryNode> {
        self.node.children()
    }

    /// The node's snapshot restricted to the matched members.
    ///
    /// Composite calculator outputs keep only the matched properties.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.node
            .snapshot()
            .into_iter()
            .filter_map(|(name, value)| {
                if self.accumulators.contains_key(&name) {
                    return Some((name, value));
                }
                let matched = self.calculators.get(&name)?;
                match value {
                    Value::Composite(properties) if !matched.properties.is_empty() => {
                        let kept = properties
                            .into_iter()
                            .filter(|(property, _)| matched.properties.contains(property))
                            .collect();
                        Some((name, Value::Composite(kept)))
                    }
                    other => Some((name, other)),
                }
            })
            .collect()
    }
}

//! `Graph`: the accumulated traversal result (spec.md §3, §4.5).
//!
//! Nodes and edges live in `Vec`s, referenced by index, with a secondary
//! `HashMap` keyed on `(Class, id)` for dedup lookups — the same
//! index-plus-backing-store split the teacher uses for its query cache
//! (`src/execution/cache.rs`'s `HashMap`-keyed entries), generalized from
//! a fixed-capacity cache to a result structure that grows as the Engine
//! merges new Objects in.

use std::collections::{HashMap, HashSet};

use crate::constraint::Constraint;
use crate::error::RuleError;
use crate::object::{Class, ObjectRef};

/// One resolved Object, deduplicated by `(Class, id())` (spec.md §3, §8
/// invariant 3).
#[derive(Debug, Clone)]
pub struct Node {
    pub object: ObjectRef,
    /// Minimum traversal depth at which this node was first reached.
    /// Monotonic with traversal depth (spec.md §8 invariant 4): deeper
    /// re-discoveries never lower it.
    pub depth: usize,
}

/// A directed correlation: `rule` applied to the Object at `from`
/// produced a query that resolved to (among others) the Object at `to`.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub rule: String,
}

/// A non-fatal failure recorded during traversal (spec.md §7): the
/// Engine keeps going, but the caller can inspect what went wrong.
#[derive(Debug, Clone)]
pub struct RuleFailure {
    pub rule: String,
    pub object_id: Option<String>,
    pub error: RuleError,
}

/// Aggregate counts useful for observability (spec.md §4.5's
/// Non-goals exclude a metrics/exporter surface, but a plain summary is
/// cheap and the ambient-stack rule still applies to basic counters).
#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub error_count: usize,
    pub nodes_per_class: HashMap<Class, usize>,
}

/// The accumulated result of one `Engine` traversal.
///
/// Insertion is idempotent on `(Class, id())` (spec.md §8 invariant 3):
/// re-inserting an already-known Object returns its existing index and
/// does not create a duplicate node. Edges are idempotent too, on
/// `(rule, from, to)` (spec.md §4.5): re-adding the same correlation is
/// a no-op rather than a second parallel edge.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    errors: Vec<RuleFailure>,
    index: HashMap<(Class, String), usize>,
    edge_index: HashSet<(usize, usize, String)>,
    cancelled: bool,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Insert `object` at `depth`, returning its node index. If the
    /// object is already present (same class + id), its existing index
    /// is returned and its recorded depth is left unchanged — lowered
    /// only if the new depth is smaller, preserving "first-reached"
    /// monotonicity (spec.md §8 invariant 4).
    pub fn insert(&mut self, object: ObjectRef, depth: usize) -> usize {
        let key = (object.class(), object.id());
        if let Some(&index) = self.index.get(&key) {
            if depth < self.nodes[index].depth {
                self.nodes[index].depth = depth;
            }
            return index;
        }
        let index = self.nodes.len();
        self.nodes.push(Node { object, depth });
        self.index.insert(key, index);
        index
    }

    /// Record a correlation edge, creating or reusing the record for this
    /// exact `(rule, from, to)` tuple (spec.md §4.5): re-adding an edge
    /// already present is a no-op, so a Store call that returns the same
    /// object twice can't duplicate the edge into it. Distinct rules (or
    /// distinct endpoints) between the same two nodes are still kept.
    pub fn add_edge(&mut self, from: usize, to: usize, rule: impl Into<String>) {
        let rule = rule.into();
        if !self.edge_index.insert((from, to, rule.clone())) {
            return;
        }
        self.edges.push(Edge { from, to, rule });
    }

    pub fn record_error(&mut self, failure: RuleFailure) {
        self.errors.push(failure);
    }

    /// Mark this Graph as the partial result of a traversal that was
    /// cancelled mid-flight rather than one that ran to completion
    /// (spec.md §8 scenario S6): set once `Engine::traverse` observes the
    /// caller's `CancellationToken` fired after merging at least one
    /// level.
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Whether this Graph is a partial result cut short by cancellation.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn errors(&self) -> &[RuleFailure] {
        &self.errors
    }

    pub fn contains(&self, class: Class, id: &str) -> bool {
        self.index.contains_key(&(class, id.to_string()))
    }

    pub fn node_index(&self, class: Class, id: &str) -> Option<usize> {
        self.index.get(&(class, id.to_string())).copied()
    }

    /// Whether the Graph is within `constraint`'s total/per-class limits
    /// (spec.md §4.4): used by the Engine to decide when to stop
    /// dispatching new queries.
    pub fn within_limits(&self, constraint: &Constraint) -> bool {
        if let Some(total) = constraint.total_limit {
            if self.nodes.len() >= total {
                return false;
            }
        }
        true
    }

    pub fn class_count(&self, class: Class) -> usize {
        self.nodes.iter().filter(|n| n.object.class() == class).count()
    }

    pub fn stats(&self) -> GraphStats {
        let mut nodes_per_class = HashMap::new();
        for node in &self.nodes {
            *nodes_per_class.entry(node.object.class()).or_insert(0) += 1;
        }
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            error_count: self.errors.len(),
            nodes_per_class,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::k8s;
    use crate::domain::mock::MockObject;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[test]
    fn insert_dedups_by_class_and_id() {
        let mut graph = Graph::new();
        let a = Arc::new(MockObject::new(k8s::POD, "p1", BTreeMap::new()));
        let b = Arc::new(MockObject::new(k8s::POD, "p1", BTreeMap::new()));
        let i1 = graph.insert(a, 0);
        let i2 = graph.insert(b, 1);
        assert_eq!(i1, i2);
        assert_eq!(graph.nodes().len(), 1);
    }

    #[test]
    fn insert_keeps_minimum_depth() {
        let mut graph = Graph::new();
        let a = Arc::new(MockObject::new(k8s::POD, "p1", BTreeMap::new()));
        graph.insert(a.clone(), 2);
        graph.insert(a, 0);
        assert_eq!(graph.nodes()[0].depth, 0);
    }

    #[test]
    fn within_limits_respects_total_limit() {
        let mut graph = Graph::new();
        let a = Arc::new(MockObject::new(k8s::POD, "p1", BTreeMap::new()));
        graph.insert(a, 0);
        let constraint = Constraint::default().with_total_limit(1);
        assert!(!graph.within_limits(&constraint));
    }

    #[test]
    fn add_edge_is_idempotent_on_rule_from_to() {
        let mut graph = Graph::new();
        graph.add_edge(0, 1, "rule_a");
        graph.add_edge(0, 1, "rule_a");
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn add_edge_keeps_distinct_rules_between_same_nodes() {
        let mut graph = Graph::new();
        graph.add_edge(0, 1, "rule_a");
        graph.add_edge(0, 1, "rule_b");
        assert_eq!(graph.edges().len(), 2);
    }
}

//! Table-level graph for visualization
//!
//! Rendering works on the unfiltered facts so external tables still show
//! up as leaf nodes. Ownership lookups are best-effort: an ambiguous owner
//! degrades to the plain short name instead of failing.

use std::collections::{BTreeMap, BTreeSet};

use bqrun_core::{short_name, DependencyFact, OriginId, TableId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::resolver::{OwnerIndex, ResolveError};

/// What is known about a table's producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Created by exactly one origin
    Produced,

    /// Claimed by several origins
    Ambiguous,

    /// Pre-existing, no origin creates it
    External,
}

/// A table node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Fully-qualified table name
    pub id: TableId,

    /// Display label
    pub label: String,

    /// Creating origin, when unambiguous
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OriginId>,

    pub kind: NodeKind,
}

/// A read edge: `from` is read while building `to`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: TableId,
    pub to: TableId,
}

/// Node/edge list handed to a graph-drawing backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Build the table graph from unfiltered facts
pub fn render(facts: &[DependencyFact], owners: &OwnerIndex) -> RenderedGraph {
    let mut tables: BTreeSet<&str> = BTreeSet::new();
    let mut edges: BTreeSet<GraphEdge> = BTreeSet::new();

    for fact in facts {
        tables.extend(fact.targets().iter().map(String::as_str));
        tables.extend(fact.sources().iter().map(String::as_str));

        for source in fact.sources() {
            for target in fact.targets() {
                edges.insert(GraphEdge {
                    from: source.clone(),
                    to: target.clone(),
                });
            }
        }
    }

    let nodes = tables
        .into_iter()
        .map(|table| node(table, owners))
        .collect();

    RenderedGraph {
        nodes,
        edges: edges.into_iter().collect(),
    }
}

fn node(table: &str, owners: &OwnerIndex) -> GraphNode {
    let short = short_name(table);

    let (label, owner, kind) = match owners.resolve(table) {
        Ok(origin) => (
            format!("{}\n({})", short, origin),
            Some(origin.to_string()),
            NodeKind::Produced,
        ),
        Err(ResolveError::MultipleOwners { origins, .. }) => {
            warn!(table, ?origins, "table has multiple owners, rendering without origin");
            (short.to_string(), None, NodeKind::Ambiguous)
        }
        Err(_) => (short.to_string(), None, NodeKind::External),
    };

    GraphNode {
        id: table.to_string(),
        label,
        owner,
        kind,
    }
}

impl RenderedGraph {
    /// Look up a node by table name
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges touching a table
    pub fn degree(&self, id: &str) -> usize {
        self.edges
            .iter()
            .filter(|e| e.from == id || e.to == id)
            .count()
    }

    /// Graphviz DOT text
    ///
    /// Tables of the same origin are grouped into a cluster; external
    /// tables are drawn dashed.
    pub fn to_dot(&self) -> String {
        let mut clusters: BTreeMap<&str, Vec<&GraphNode>> = BTreeMap::new();
        let mut loose: Vec<&GraphNode> = Vec::new();

        for node in &self.nodes {
            match &node.owner {
                Some(owner) => clusters.entry(owner.as_str()).or_default().push(node),
                None => loose.push(node),
            }
        }

        let mut dot = String::from("digraph bqrun {\n  rankdir=LR;\n  node [shape=box];\n");

        for (i, (origin, nodes)) in clusters.iter().enumerate() {
            dot.push_str(&format!("  subgraph cluster_{} {{\n", i));
            dot.push_str(&format!("    label=\"{}\";\n", escape(origin)));
            for node in nodes {
                dot.push_str(&format!("    {}\n", node_line(node)));
            }
            dot.push_str("  }\n");
        }

        for node in loose {
            dot.push_str(&format!("  {}\n", node_line(node)));
        }

        for edge in &self.edges {
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                escape(&edge.from),
                escape(&edge.to)
            ));
        }

        dot.push_str("}\n");
        dot
    }

    /// JSON node/edge list
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn node_line(node: &GraphNode) -> String {
    let style = match node.kind {
        NodeKind::Produced => "",
        NodeKind::Ambiguous => ", color=red",
        NodeKind::External => ", style=dashed",
    };
    format!(
        "\"{}\" [label=\"{}\"{}];",
        escape(&node.id),
        escape(&node.label),
        style
    )
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: [&str; 0] = [];

    #[test]
    fn external_table_is_a_leaf_node() {
        let facts = vec![DependencyFact::new(["p.d.t1"], ["x"], "f1")];
        let graph = render(&facts, &OwnerIndex::from_facts(&facts));

        let x = graph.node("x").unwrap();
        assert_eq!(x.kind, NodeKind::External);
        assert_eq!(x.label, "x");
        assert_eq!(x.owner, None);

        let t1 = graph.node("p.d.t1").unwrap();
        assert_eq!(t1.label, "t1\n(f1)");
        assert_eq!(t1.owner.as_deref(), Some("f1"));

        assert_eq!(
            graph.edges,
            vec![GraphEdge {
                from: "x".into(),
                to: "p.d.t1".into()
            }]
        );
    }

    #[test]
    fn pure_reads_appear_without_edges() {
        let facts = vec![DependencyFact::new(NONE, ["p.d.raw"], "report.sql")];
        let graph = render(&facts, &OwnerIndex::from_facts(&facts));

        assert!(graph.node("p.d.raw").is_some());
        assert_eq!(graph.degree("p.d.raw"), 0);
    }

    #[test]
    fn multiple_owners_degrade_to_short_name() {
        let facts = vec![
            DependencyFact::new(["p.d.t1"], NONE, "1.sql"),
            DependencyFact::new(["p.d.t1"], NONE, "2.sql"),
        ];
        let graph = render(&facts, &OwnerIndex::from_facts(&facts));

        let t1 = graph.node("p.d.t1").unwrap();
        assert_eq!(t1.label, "t1");
        assert_eq!(t1.kind, NodeKind::Ambiguous);
    }

    #[test]
    fn every_source_target_pair_is_an_edge() {
        let facts = vec![DependencyFact::new(["a", "b"], ["a", "x"], "1.sql")];
        let graph = render(&facts, &OwnerIndex::from_facts(&facts));

        let edges: Vec<(&str, &str)> = graph
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect();
        // a script re-reading its own output keeps its self loop
        assert_eq!(edges, [("a", "a"), ("a", "b"), ("x", "a"), ("x", "b")]);
    }

    #[test]
    fn dot_output_escapes_labels() {
        let facts = vec![DependencyFact::new(["p.d.t1"], ["x"], "1.sql")];
        let dot = render(&facts, &OwnerIndex::from_facts(&facts)).to_dot();

        assert!(dot.starts_with("digraph bqrun {"));
        assert!(dot.contains("label=\"1.sql\";"));
        assert!(dot.contains("\"p.d.t1\" [label=\"t1\\n(1.sql)\"];"));
        assert!(dot.contains("\"x\" [label=\"x\", style=dashed];"));
        assert!(dot.contains("\"x\" -> \"p.d.t1\";"));
    }
}

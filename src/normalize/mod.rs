//! # Result Normalizer
//!
//! Turns raw rows into the canonical `{nodes, edges, metadata}` shape.
//!
//! Rows may carry graph elements in any column: bare nodes and
//! relationships, paths, or lists of those. Columns are walked in query
//! order and every element is kept once, by identity, across the whole
//! result set. Metadata is computed from the deduplicated collections.

use std::collections::BTreeMap;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::execution::Row;
use crate::filter::FilterSpec;
use crate::model::*;
use crate::query::Page;
use crate::Result;

/// Type reported for vertices without any label.
pub const UNKNOWN_TYPE: &str = "Unknown";

const OWNERSHIP_TYPE: &str = "OWNS";
const STATUS_KEY: &str = "mandate_status";

// ============================================================================
// Canonical shapes
// ============================================================================

/// A vertex as handed to callers: identity, labels in store order, a
/// `type` taken from the first label, and its properties inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub labels: Vec<String>,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(flatten)]
    pub properties: PropertyMap,
}

impl From<&Node> for GraphNode {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.to_string(),
            labels: node.labels.to_vec(),
            node_type: node.primary_label().unwrap_or(UNKNOWN_TYPE).to_string(),
            properties: node.properties.clone(),
        }
    }
}

/// A relation as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(flatten)]
    pub properties: PropertyMap,
}

impl From<&Relationship> for GraphEdge {
    fn from(rel: &Relationship) -> Self {
        Self {
            id: rel.id.to_string(),
            source: rel.src.to_string(),
            target: rel.dst.to_string(),
            edge_type: rel.rel_type.clone(),
            properties: rel.properties.clone(),
        }
    }
}

/// Aggregates over a normalized result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_type_counts: BTreeMap<String, usize>,
    pub edge_type_counts: BTreeMap<String, usize>,
    /// Status distribution over ownership relations only.
    pub mandate_status_counts: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_filters: Option<FilterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<Page>,
}

/// Normalized nodes and edges plus metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: Metadata,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Record the request the result answers.
    pub fn with_request(mut self, filters: &FilterSpec, page: Page) -> Self {
        self.metadata.applied_filters = Some(filters.clone());
        self.metadata.query_params = Some(page);
        self
    }
}

/// A recommendation candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    pub node: GraphNode,
    pub score: f64,
}

// ============================================================================
// Normalization
// ============================================================================

#[derive(Default)]
struct Collector {
    node_ids: HashSet<NodeId>,
    rel_ids: HashSet<RelId>,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl Collector {
    fn visit(&mut self, value: &Value) {
        match value {
            Value::Node(n) => {
                if self.node_ids.insert(n.id) {
                    self.nodes.push(GraphNode::from(n.as_ref()));
                }
            }
            Value::Relationship(r) => self.visit_rel(r),
            Value::Path(p) => {
                for n in &p.nodes {
                    if self.node_ids.insert(n.id) {
                        self.nodes.push(GraphNode::from(n));
                    }
                }
                for r in &p.relationships {
                    self.visit_rel(r);
                }
            }
            Value::List(items) => items.iter().for_each(|v| self.visit(v)),
            _ => {}
        }
    }

    fn visit_rel(&mut self, rel: &Relationship) {
        if self.rel_ids.insert(rel.id) {
            self.edges.push(GraphEdge::from(rel));
        }
    }
}

/// Normalize rows into a deduplicated result with metadata.
pub fn normalize(rows: &[Row]) -> QueryResult {
    let mut collector = Collector::default();
    for value in rows.iter().flat_map(Row::values) {
        collector.visit(value);
    }

    let metadata = metadata(&collector.nodes, &collector.edges);
    QueryResult {
        nodes: collector.nodes,
        edges: collector.edges,
        metadata,
    }
}

/// Compute metadata over already deduplicated collections.
pub fn metadata(nodes: &[GraphNode], edges: &[GraphEdge]) -> Metadata {
    let mut meta = Metadata {
        total_nodes: nodes.len(),
        total_edges: edges.len(),
        ..Metadata::default()
    };
    for node in nodes {
        *meta.node_type_counts.entry(node.node_type.clone()).or_default() += 1;
    }
    for edge in edges {
        *meta.edge_type_counts.entry(edge.edge_type.clone()).or_default() += 1;
        if edge.edge_type == OWNERSHIP_TYPE {
            if let Some(status) = edge.properties.get(STATUS_KEY).and_then(Value::to_cypher_string) {
                *meta.mandate_status_counts.entry(status).or_default() += 1;
            }
        }
    }
    meta
}

/// Read `node`/`score` rows into ranked candidates, keeping row order.
pub fn normalize_scored(rows: &[Row]) -> Result<Vec<ScoredNode>> {
    rows.iter()
        .map(|row| {
            let node: Node = row.get("node")?;
            Ok(ScoredNode {
                node: GraphNode::from(&node),
                score: row.get("score")?,
            })
        })
        .collect()
}

//! # Traversal Operations
//!
//! Network expansion, path search, recommendations, the consultant
//! influence network and single-node detail. Each one validates its
//! parameters, assembles one query, runs it through the session and
//! normalizes the rows.

use std::collections::BTreeMap;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::compiler::CompiledFilter;
use crate::execution::Row;
use crate::model::{Node, NodeId, Relationship, Value};
use crate::normalize::{self, GraphEdge, GraphNode, QueryResult, ScoredNode};
use crate::query::{
    assemble, Page, RecommendationKind, TraversalPattern, DEFAULT_RECOMMENDATION_LIMIT,
};
use crate::session::GraphSession;
use crate::storage::GraphStore;
use crate::{Error, Result};

// ============================================================================
// Network expansion
// ============================================================================

/// Everything within `depth` hops of `seeds`, paged by identity.
pub async fn expand_network<S: GraphStore>(
    session: &GraphSession<'_, S>,
    seeds: &[NodeId],
    depth: u32,
    page: Page,
) -> Result<QueryResult> {
    if seeds.is_empty() {
        return Err(Error::InvalidParameter("expansion needs at least one seed".into()));
    }
    let query = assemble(
        TraversalPattern::BoundedExpansion { seeds: seeds.to_vec(), depth },
        CompiledFilter::unfiltered(),
        page,
    )?;
    let rows = session.execute(&query).await?;
    Ok(normalize::normalize(&rows))
}

// ============================================================================
// Path search
// ============================================================================

/// One path found between a source and a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundPath {
    /// Vertex identities from source to target.
    pub nodes: Vec<String>,
    /// Relation identities along the path.
    pub relationships: Vec<String>,
    pub weight: f64,
}

impl FoundPath {
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

/// Paths plus their vertices and relations, normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSearchResult {
    pub paths: Vec<FoundPath>,
    #[serde(flatten)]
    pub graph: QueryResult,
}

/// Weighted shortest paths from any of `sources` to any of `targets`.
///
/// Repeated identities count once, and identities present in both sets are
/// dropped from the targets. If either set ends up empty there is nothing
/// to search and no query runs.
pub async fn find_paths<S: GraphStore>(
    session: &GraphSession<'_, S>,
    sources: &[NodeId],
    targets: &[NodeId],
    max_depth: u32,
) -> Result<PathSearchResult> {
    let sources = distinct(sources);
    let targets: Vec<NodeId> = distinct(targets).into_iter().filter(|t| !sources.contains(t)).collect();
    let pattern = TraversalPattern::PathSearch {
        sources,
        targets,
        max_depth,
    };
    pattern.validate()?;

    if let TraversalPattern::PathSearch { sources, targets, .. } = &pattern {
        if sources.is_empty() || targets.is_empty() {
            return Ok(PathSearchResult::default());
        }
    }

    let query = assemble(pattern, CompiledFilter::unfiltered(), Page::default())?;
    let rows = session.execute(&query).await?;

    let mut paths = Vec::with_capacity(rows.len());
    for row in &rows {
        let nodes: Vec<Node> = row.get("path_nodes")?;
        let rels: Vec<Relationship> = row.get("path_relationships")?;
        paths.push(FoundPath {
            nodes: nodes.iter().map(|n| n.id.to_string()).collect(),
            relationships: rels.iter().map(|r| r.id.to_string()).collect(),
            weight: row.get("weight")?,
        });
    }
    Ok(PathSearchResult { paths, graph: normalize::normalize(&rows) })
}

/// First occurrence of each identity, in input order.
fn distinct(ids: &[NodeId]) -> Vec<NodeId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

// ============================================================================
// Recommendations
// ============================================================================

/// Scored candidates for `seed`, best first. A missing seed or one with
/// nothing in common with anything yields an empty list.
pub async fn recommend<S: GraphStore>(
    session: &GraphSession<'_, S>,
    seed: NodeId,
    kind: RecommendationKind,
    limit: Option<usize>,
) -> Result<Vec<ScoredNode>> {
    let query = assemble(
        TraversalPattern::Recommendation {
            seed,
            kind,
            limit: limit.unwrap_or(DEFAULT_RECOMMENDATION_LIMIT),
        },
        CompiledFilter::unfiltered(),
        Page::default(),
    )?;
    let rows = session.execute(&query).await?;
    normalize::normalize_scored(&rows)
}

// ============================================================================
// Influence network
// ============================================================================

/// Reach of one consultant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultantMetrics {
    pub companies_influenced: usize,
    pub products_influenced: usize,
    pub field_consultants_managed: usize,
    /// Relations in the consultant's network that touch the consultant.
    pub total_relationships: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfluenceNetwork {
    #[serde(flatten)]
    pub graph: QueryResult,
    /// Keyed by consultant identity.
    pub consultant_metrics: BTreeMap<String, ConsultantMetrics>,
}

/// Consultants, the field consultants they employ, what those cover, what
/// covered companies own, and what the consultants rate.
pub async fn influence_network<S: GraphStore>(
    session: &GraphSession<'_, S>,
    consultants: &[NodeId],
) -> Result<InfluenceNetwork> {
    if consultants.is_empty() {
        return Err(Error::InvalidParameter("influence network needs at least one consultant".into()));
    }
    let query = assemble(
        TraversalPattern::InfluenceNetwork { consultants: consultants.to_vec() },
        CompiledFilter::unfiltered(),
        Page::default(),
    )?;
    let rows = session.execute(&query).await?;

    let mut consultant_metrics = BTreeMap::new();
    for row in &rows {
        let (id, metrics) = consultant_metrics_for(row)?;
        consultant_metrics.insert(id, metrics);
    }
    Ok(InfluenceNetwork { graph: normalize::normalize(&rows), consultant_metrics })
}

fn consultant_metrics_for(row: &Row) -> Result<(String, ConsultantMetrics)> {
    let consultant: Node = row.get("consultant")?;
    let reached = normalize::normalize(&[Row::new()
        .with("connected_nodes", row.get::<Value>("connected_nodes")?)
        .with("relationships", row.get::<Value>("relationships")?)]);

    let count = |label: &str| reached.nodes.iter().filter(|n| n.node_type == label).count();
    let id = consultant.id.to_string();
    let metrics = ConsultantMetrics {
        companies_influenced: count("COMPANY"),
        products_influenced: count("PRODUCT"),
        field_consultants_managed: count("FIELD_CONSULTANT"),
        total_relationships: reached
            .edges
            .iter()
            .filter(|e| e.source == id || e.target == id)
            .count(),
    };
    Ok((id, metrics))
}

// ============================================================================
// Node detail
// ============================================================================

/// One vertex with its incident relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDetail {
    pub node: GraphNode,
    pub relationships: Vec<GraphEdge>,
    pub connected_nodes_count: usize,
}

/// Detail for `node`, or `None` when the store has no such vertex.
pub async fn node_detail<S: GraphStore>(
    session: &GraphSession<'_, S>,
    node: NodeId,
) -> Result<Option<NodeDetail>> {
    let query = assemble(
        TraversalPattern::NodeDetail { node },
        CompiledFilter::unfiltered(),
        Page::default(),
    )?;
    let rows = session.execute(&query).await?;
    let Some(row) = rows.first() else {
        return Ok(None);
    };

    let n: Node = row.get("n")?;
    let rels: Vec<Relationship> = row.get("relationships")?;
    let connected: Vec<Node> = row.get("connected_nodes")?;
    Ok(Some(NodeDetail {
        node: GraphNode::from(&n),
        relationships: rels.iter().map(GraphEdge::from).collect(),
        connected_nodes_count: connected.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{property_map, PropertyMap};
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_path_search_drops_shared_identities_before_running() {
        let store = MemoryStore::new();
        let a = store.create_node(&["COMPANY"], PropertyMap::new());
        store.fail_when(|_| Some(Error::StorageError("store must not be reached".into())));
        let session = GraphSession::new(&store, None);

        let result = find_paths(&session, &[a], &[a], 3).await.unwrap();
        assert!(result.paths.is_empty());
        assert!(result.graph.is_empty());
    }

    #[tokio::test]
    async fn test_depth_checked_before_store_call() {
        let store = MemoryStore::new();
        store.set_available(false);
        let session = GraphSession::new(&store, None);

        let err = expand_network(&session, &[NodeId(0)], 6, Page::default()).await.unwrap_err();
        assert!(err.is_invalid_parameter());
        let err = find_paths(&session, &[NodeId(0)], &[NodeId(0)], 7).await.unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[tokio::test]
    async fn test_node_detail() {
        let store = MemoryStore::new();
        let company = store.create_node(&["COMPANY"], property_map([("name", "Acme")]));
        let product = store.create_node(&["PRODUCT"], PropertyMap::new());
        store.create_relationship(company, product, "OWNS", PropertyMap::new()).unwrap();
        let session = GraphSession::new(&store, None);

        let detail = node_detail(&session, company).await.unwrap().unwrap();
        assert_eq!(detail.node.node_type, "COMPANY");
        assert_eq!(detail.relationships.len(), 1);
        assert_eq!(detail.relationships[0].target, product.to_string());
        assert_eq!(detail.connected_nodes_count, 1);

        assert!(node_detail(&session, NodeId(99)).await.unwrap().is_none());
    }

    #[test]
    fn test_distinct_keeps_first_occurrence_order() {
        assert_eq!(
            distinct(&[NodeId(3), NodeId(1), NodeId(3), NodeId(2), NodeId(1)]),
            vec![NodeId(3), NodeId(1), NodeId(2)]
        );
    }
}

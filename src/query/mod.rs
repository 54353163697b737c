//! # Query Assembler
//!
//! Combines compiled predicates with one of the fixed traversal patterns
//! into an [`ExecutableQuery`]: Cypher text, a parameter map, and the
//! structured [`QueryPlan`] the text was rendered from.
//!
//! ```text
//! FilterSpec ─compile()─▶ CompiledFilter ─assemble(pattern, page)─▶ ExecutableQuery
//!                                                                    ├─ text   (cypher::render)
//!                                                                    ├─ params (bindings + pattern params)
//!                                                                    └─ plan   (evaluated by non-Cypher stores)
//! ```

pub mod cypher;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cascade::OptionDimension;
use crate::compiler::CompiledFilter;
use crate::filter::Neighborhood;
use crate::model::{NodeId, PropertyMap, Value};
use crate::{Error, Result};

// ============================================================================
// Limits
// ============================================================================

pub const DEFAULT_LIMIT: usize = 1000;
pub const MAX_LIMIT: usize = 10_000;

pub const MAX_EXPANSION_DEPTH: u32 = 5;
pub const MAX_PATH_DEPTH: u32 = 6;

pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 10;
pub const MAX_RECOMMENDATION_LIMIT: usize = 50;

// ============================================================================
// Page
// ============================================================================

/// Pagination window. Applies to filtered fetch and bounded expansion,
/// ordered by entity identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    /// Missing limit defaults to [`DEFAULT_LIMIT`]; the limit is clamped
    /// to `1..=MAX_LIMIT`.
    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

// ============================================================================
// Recommendation kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Same-label vertices scored by shared properties and common neighbors.
    SimilarEntities,
    /// Two-hop vertices with no direct relation to the seed.
    PotentialConnections,
    /// Vertices whose label, region or channel the seed's neighborhood lacks.
    ExpansionOpportunities,
}

impl RecommendationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationKind::SimilarEntities => "similar_nodes",
            RecommendationKind::PotentialConnections => "potential_connections",
            RecommendationKind::ExpansionOpportunities => "expansion_opportunities",
        }
    }
}

impl fmt::Display for RecommendationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "similar_nodes" | "similar_entities" => Ok(RecommendationKind::SimilarEntities),
            "potential_connections" => Ok(RecommendationKind::PotentialConnections),
            "expansion_opportunities" => Ok(RecommendationKind::ExpansionOpportunities),
            other => Err(Error::InvalidParameter(format!(
                "unknown recommendation type '{other}'"
            ))),
        }
    }
}

// ============================================================================
// Traversal patterns
// ============================================================================

/// The fixed query shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum TraversalPattern {
    /// Subjects matching the filter, optionally with their neighborhood.
    /// Relation predicates switch the match to `(n)-[r]-(m)`.
    FilteredFetch { neighborhood: Neighborhood },
    /// Distinct values of one option dimension across the subject set and
    /// its one-hop neighborhood.
    CascadingOptions { dimension: OptionDimension },
    /// Everything reachable from `seeds` within `depth` hops, BFS, each
    /// vertex visited once.
    BoundedExpansion { seeds: Vec<NodeId>, depth: u32 },
    /// Weighted shortest paths from any source to any target.
    PathSearch {
        sources: Vec<NodeId>,
        targets: Vec<NodeId>,
        max_depth: u32,
    },
    /// Scored candidates for one seed.
    Recommendation {
        seed: NodeId,
        kind: RecommendationKind,
        limit: usize,
    },
    /// Consultant → field consultant → covered companies/products → owned
    /// products, plus the consultant's rated products.
    InfluenceNetwork { consultants: Vec<NodeId> },
    /// One vertex with its incident relations and neighbors.
    NodeDetail { node: NodeId },
}

impl TraversalPattern {
    pub fn name(&self) -> &'static str {
        match self {
            TraversalPattern::FilteredFetch { .. } => "filtered_fetch",
            TraversalPattern::CascadingOptions { .. } => "cascading_options",
            TraversalPattern::BoundedExpansion { .. } => "bounded_expansion",
            TraversalPattern::PathSearch { .. } => "path_search",
            TraversalPattern::Recommendation { .. } => "recommendation",
            TraversalPattern::InfluenceNetwork { .. } => "influence_network",
            TraversalPattern::NodeDetail { .. } => "node_detail",
        }
    }

    /// Only the filtered fetch can bind a relation variable for predicates.
    pub fn binds_relation(&self) -> bool {
        matches!(self, TraversalPattern::FilteredFetch { .. })
    }

    /// Whether `limit`/`offset` apply.
    pub fn is_paged(&self) -> bool {
        matches!(
            self,
            TraversalPattern::FilteredFetch { .. } | TraversalPattern::BoundedExpansion { .. }
        )
    }

    /// Whether the subject predicates apply at all.
    pub fn accepts_filters(&self) -> bool {
        matches!(
            self,
            TraversalPattern::FilteredFetch { .. } | TraversalPattern::CascadingOptions { .. }
        )
    }

    /// Check pattern parameters without touching a store.
    pub fn validate(&self) -> Result<()> {
        match self {
            TraversalPattern::BoundedExpansion { depth, .. } => {
                check_depth("depth", *depth, MAX_EXPANSION_DEPTH)
            }
            TraversalPattern::PathSearch { sources, targets, max_depth } => {
                check_depth("max_depth", *max_depth, MAX_PATH_DEPTH)?;
                if let Some(shared) = sources.iter().find(|s| targets.contains(s)) {
                    return Err(Error::InvalidParameter(format!(
                        "node {shared} is both a path source and a path target"
                    )));
                }
                Ok(())
            }
            TraversalPattern::Recommendation { limit, .. } => {
                if (1..=MAX_RECOMMENDATION_LIMIT).contains(limit) {
                    Ok(())
                } else {
                    Err(Error::InvalidParameter(format!(
                        "recommendation limit must be within 1..={MAX_RECOMMENDATION_LIMIT}, got {limit}"
                    )))
                }
            }
            _ => Ok(()),
        }
    }

    fn params(&self, page: Page, params: &mut PropertyMap) {
        if self.is_paged() {
            params.insert("limit".into(), Value::from(page.limit));
            params.insert("offset".into(), Value::from(page.offset));
        }
        match self {
            TraversalPattern::BoundedExpansion { seeds, depth } => {
                params.insert("seed_ids".into(), id_list(seeds));
                params.insert("depth".into(), Value::from(*depth as i64));
            }
            TraversalPattern::PathSearch { sources, targets, max_depth } => {
                params.insert("source_ids".into(), id_list(sources));
                params.insert("target_ids".into(), id_list(targets));
                params.insert("max_depth".into(), Value::from(*max_depth as i64));
            }
            TraversalPattern::Recommendation { seed, limit, .. } => {
                params.insert("seed_id".into(), Value::from(seed.0));
                params.insert("limit".into(), Value::from(*limit));
            }
            TraversalPattern::InfluenceNetwork { consultants } => {
                params.insert("consultant_ids".into(), id_list(consultants));
            }
            TraversalPattern::NodeDetail { node } => {
                params.insert("node_id".into(), Value::from(node.0));
            }
            TraversalPattern::FilteredFetch { .. } | TraversalPattern::CascadingOptions { .. } => {}
        }
    }
}

fn check_depth(name: &str, depth: u32, max: u32) -> Result<()> {
    if (1..=max).contains(&depth) {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!("{name} must be within 1..={max}, got {depth}")))
    }
}

fn id_list(ids: &[NodeId]) -> Value {
    Value::List(ids.iter().map(|id| Value::from(id.0)).collect())
}

// ============================================================================
// Executable query
// ============================================================================

/// Structured form of an assembled query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub pattern: TraversalPattern,
    pub filter: CompiledFilter,
    pub page: Page,
}

/// One query ready for a store: text plus bindings, with the plan kept
/// alongside for stores that evaluate plans directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableQuery {
    pub text: String,
    pub params: PropertyMap,
    pub plan: QueryPlan,
}

impl ExecutableQuery {
    pub fn pattern_name(&self) -> &'static str {
        self.plan.pattern.name()
    }
}

/// Assemble `pattern` with compiled predicates and a page.
///
/// Rejects relation predicates on patterns without a relation binding,
/// subject predicates on patterns that take none, and out-of-range
/// pattern parameters, all before any store is contacted.
pub fn assemble(pattern: TraversalPattern, filter: CompiledFilter, page: Page) -> Result<ExecutableQuery> {
    pattern.validate()?;

    if let Some(first) = filter.relation.first() {
        if !pattern.binds_relation() {
            let dimension = match first {
                crate::compiler::Predicate::RelPropertyIn { key, .. }
                | crate::compiler::Predicate::RelBound { key, .. } => *key,
                _ => "relation",
            };
            return Err(Error::IncompatibleFilter { dimension, pattern: pattern.name() });
        }
    }
    if !filter.vertex.is_empty() && !pattern.accepts_filters() {
        return Err(Error::InvalidParameter(format!(
            "pattern '{}' does not take subject filters",
            pattern.name()
        )));
    }

    let mut params = filter.bindings.clone();
    pattern.params(page, &mut params);

    let plan = QueryPlan { pattern, filter, page };
    let text = cypher::render(&plan);

    Ok(ExecutableQuery { text, params, plan })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::filter::{EntityType, FilterSpec};

    #[test]
    fn test_page_defaults_and_clamps() {
        assert_eq!(Page::default(), Page { limit: 1000, offset: 0 });
        assert_eq!(Page::new(Some(50_000), Some(20)), Page { limit: 10_000, offset: 20 });
        assert_eq!(Page::new(Some(0), None).limit, 1);
    }

    #[test]
    fn test_recommendation_kind_parsing() {
        assert_eq!("similar_nodes".parse::<RecommendationKind>().unwrap(), RecommendationKind::SimilarEntities);
        assert_eq!(
            "expansion_opportunities".parse::<RecommendationKind>().unwrap(),
            RecommendationKind::ExpansionOpportunities
        );
        assert!("closest_friends".parse::<RecommendationKind>().unwrap_err().is_invalid_parameter());
    }

    #[test]
    fn test_depth_bounds() {
        for depth in [0, 6] {
            let err = assemble(
                TraversalPattern::BoundedExpansion { seeds: vec![NodeId(1)], depth },
                CompiledFilter::unfiltered(),
                Page::default(),
            )
            .unwrap_err();
            assert!(err.is_invalid_parameter());
        }
        let err = assemble(
            TraversalPattern::PathSearch { sources: vec![NodeId(1)], targets: vec![NodeId(2)], max_depth: 7 },
            CompiledFilter::unfiltered(),
            Page::default(),
        )
        .unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn test_relation_predicates_need_relation_binding() {
        let spec = FilterSpec { rating_changes: vec!["Upgrade".into()], ..FilterSpec::default() };
        let compiled = compile(&spec, "n", Some("r")).unwrap();
        let err = assemble(
            TraversalPattern::CascadingOptions { dimension: OptionDimension::Channels },
            compiled,
            Page::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::IncompatibleFilter { dimension: "rating_change", pattern: "cascading_options" }
        ));
    }

    #[test]
    fn test_paging_params_only_on_paged_patterns() {
        let fetch = assemble(
            TraversalPattern::FilteredFetch { neighborhood: Neighborhood::Subject },
            CompiledFilter::unfiltered(),
            Page::new(Some(50), Some(100)),
        )
        .unwrap();
        assert_eq!(fetch.params.get("limit"), Some(&Value::Int(50)));
        assert_eq!(fetch.params.get("offset"), Some(&Value::Int(100)));

        let detail = assemble(
            TraversalPattern::NodeDetail { node: NodeId(3) },
            CompiledFilter::unfiltered(),
            Page::default(),
        )
        .unwrap();
        assert!(!detail.params.contains_key("offset"));
        assert_eq!(detail.params.get("node_id"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_bindings_flow_into_params() {
        let spec = FilterSpec { entity_types: vec![EntityType::Product], ..FilterSpec::default() };
        let query = assemble(
            TraversalPattern::FilteredFetch { neighborhood: Neighborhood::Subject },
            compile(&spec, "n", Some("r")).unwrap(),
            Page::default(),
        )
        .unwrap();
        assert_eq!(query.params.get("entity_types"), Some(&Value::from(vec!["PRODUCT"])));
        assert_eq!(query.pattern_name(), "filtered_fetch");
    }
}

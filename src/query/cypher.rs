//! Cypher renderer.
//!
//! The one place query text is produced. Everything user-controlled is a
//! `$param`; identifiers spliced into the text come from closed enums
//! (labels, property keys) or fixed aliases.

use std::fmt::Write;

use super::{QueryPlan, RecommendationKind, TraversalPattern};
use crate::cascade::{OptionDimension, OptionSource};
use crate::compiler::{Bound, Predicate};
use crate::filter::Neighborhood;

/// Render a plan into Cypher text.
pub fn render(plan: &QueryPlan) -> String {
    let filter = &plan.filter;
    match &plan.pattern {
        TraversalPattern::FilteredFetch { neighborhood } => {
            if filter.has_relation_predicates() {
                filtered_fetch_relational(&filter.vertex, &filter.relation)
            } else {
                filtered_fetch(&filter.vertex, *neighborhood)
            }
        }
        TraversalPattern::CascadingOptions { dimension } => cascading(&filter.vertex, *dimension),
        TraversalPattern::BoundedExpansion { .. } => EXPANSION.to_string(),
        TraversalPattern::PathSearch { .. } => PATH_SEARCH.to_string(),
        TraversalPattern::Recommendation { kind, .. } => recommendation(*kind),
        TraversalPattern::InfluenceNetwork { .. } => INFLUENCE_NETWORK.to_string(),
        TraversalPattern::NodeDetail { .. } => NODE_DETAIL.to_string(),
    }
}

// ============================================================================
// Predicates
// ============================================================================

/// Render one predicate fragment.
pub fn predicate(p: &Predicate) -> String {
    match p {
        Predicate::PropertyIn { alias, keys, param } => {
            let per_key: Vec<String> = keys
                .iter()
                .map(|k| {
                    let prop = format!("{alias}.{}", escape_key(k));
                    format!(
                        "{prop} IN ${param} OR any(x IN {} WHERE x IN ${param})",
                        list_shape(&prop)
                    )
                })
                .collect();
            format!("({})", per_key.join(" OR "))
        }
        Predicate::LabelIn { alias, param } => {
            format!("any(label IN labels({alias}) WHERE label IN ${param})")
        }
        Predicate::Identifier { alias, label, param } => format!(
            "({alias}:{} AND ({alias}.name IN ${param} OR toString(id({alias})) IN ${param}))",
            label.label()
        ),
        Predicate::RelPropertyIn { alias, key, param } => {
            format!("{alias}.{} IN ${param}", escape_key(key))
        }
        Predicate::RelBound { alias, key, bound, param, numeric_cast } => {
            let prop = format!("{alias}.{}", escape_key(key));
            let lhs = if *numeric_cast { format!("toFloat({prop})") } else { prop };
            let op = match bound {
                Bound::Min => ">=",
                Bound::Max => "<=",
            };
            format!("{lhs} {op} ${param}")
        }
    }
}

/// `WHERE a AND b ...`, or nothing when there are no predicates.
fn where_clause<'a>(preds: impl IntoIterator<Item = &'a Predicate>) -> String {
    let parts: Vec<String> = preds.into_iter().map(predicate).collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("\nWHERE {}", parts.join("\n  AND "))
    }
}

/// A property viewed as a list: arrays as-is, scalars wrapped, nulls empty.
fn list_shape(prop: &str) -> String {
    format!(
        "CASE WHEN {prop} IS NULL THEN [] WHEN valueType({prop}) STARTS WITH 'LIST' THEN {prop} ELSE [{prop}] END"
    )
}

/// Backtick-quote keys that aren't plain identifiers.
fn escape_key(key: &str) -> String {
    let plain = key.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        key.to_string()
    } else {
        format!("`{}`", key.replace('`', "``"))
    }
}

// ============================================================================
// Filtered fetch
// ============================================================================

fn filtered_fetch(vertex: &[Predicate], neighborhood: Neighborhood) -> String {
    let mut q = format!("MATCH (n){}", where_clause(vertex));
    q.push_str("\nWITH n ORDER BY id(n) SKIP $offset LIMIT $limit");
    match neighborhood {
        Neighborhood::Subject => {
            q.push_str("\nRETURN n, [] AS relationships, [] AS connected_nodes");
        }
        Neighborhood::OneHop => {
            q.push_str(
                "\nOPTIONAL MATCH (n)-[r1]-(m1)\
                 \nRETURN n, collect(DISTINCT r1) AS relationships, collect(DISTINCT m1) AS connected_nodes\
                 \nORDER BY id(n)",
            );
        }
        Neighborhood::TwoHop => {
            q.push_str(
                "\nOPTIONAL MATCH (n)-[r1]-(m1)\
                 \nOPTIONAL MATCH (m1)-[r2]-(m2)\
                 \nRETURN n,\
                 \n       collect(DISTINCT r1) + collect(DISTINCT r2) AS relationships,\
                 \n       collect(DISTINCT m1) + collect(DISTINCT m2) AS connected_nodes\
                 \nORDER BY id(n)",
            );
        }
    }
    q
}

/// Relation predicates bind `r` explicitly, so only subjects taking part
/// in at least one matching relation qualify.
fn filtered_fetch_relational(vertex: &[Predicate], relation: &[Predicate]) -> String {
    format!(
        "MATCH (n)-[r]-(m){}\
         \nWITH n, collect(DISTINCT r) AS relationships, collect(DISTINCT m) AS connected_nodes\
         \nORDER BY id(n) SKIP $offset LIMIT $limit\
         \nRETURN n, relationships, connected_nodes",
        where_clause(vertex.iter().chain(relation))
    )
}

// ============================================================================
// Cascading options
// ============================================================================

fn cascading(vertex: &[Predicate], dimension: OptionDimension) -> String {
    let mut q = format!("MATCH (n){}", where_clause(vertex));

    match dimension.source() {
        OptionSource::Property(dim) => {
            q.push_str(SCOPE);
            let keys: Vec<String> = dim.property_keys().iter().map(|k| format!("'{k}'")).collect();
            let _ = write!(
                q,
                "\nUNWIND [k IN [{}] | x[k]] AS raw\
                 \nUNWIND {} AS value\
                 \nWITH value WHERE value IS NOT NULL AND toString(value) <> ''\
                 \nRETURN DISTINCT toString(value) AS value\
                 \nORDER BY value",
                keys.join(", "),
                list_shape("raw"),
            );
        }
        OptionSource::Entity(ty) => {
            q.push_str(SCOPE);
            let _ = write!(
                q,
                "\nWITH x WHERE x:{}\
                 \nRETURN toString(id(x)) AS id, toString(x.name) AS name\
                 \nORDER BY name, id",
                ty.label()
            );
        }
        OptionSource::Rating(key) => {
            let _ = write!(
                q,
                "\nMATCH (n)-[r:RATES]-()\
                 \nWITH DISTINCT r\
                 \nUNWIND {} AS value\
                 \nWITH value WHERE value IS NOT NULL AND toString(value) <> ''\
                 \nRETURN DISTINCT toString(value) AS value\
                 \nORDER BY value",
                list_shape(&format!("r.{}", escape_key(key)))
            );
        }
    }
    q
}

/// Subject set unioned with its one-hop neighborhood, one row per vertex.
const SCOPE: &str = "
OPTIONAL MATCH (n)--(m)
WITH collect(DISTINCT n) + collect(DISTINCT m) AS scope
UNWIND scope AS x
WITH DISTINCT x";

// ============================================================================
// Traversals
// ============================================================================

const EXPANSION: &str = "MATCH (seed) WHERE id(seed) IN $seed_ids
CALL apoc.path.expandConfig(seed, {minLevel: 0, maxLevel: $depth, bfs: true, uniqueness: 'NODE_GLOBAL'})
YIELD path
WITH collect(DISTINCT last(nodes(path))) AS reached, collect(path) AS paths
WITH reached, reduce(acc = [], p IN paths | acc + relationships(p)) AS rels
UNWIND reached AS n
WITH n, rels ORDER BY id(n) SKIP $offset LIMIT $limit
RETURN n, [rel IN rels WHERE startNode(rel) = n] AS relationships, [] AS connected_nodes";

const PATH_SEARCH: &str = "MATCH (source) WHERE id(source) IN $source_ids
MATCH (target) WHERE id(target) IN $target_ids AND id(source) <> id(target)
CALL apoc.algo.dijkstra(source, target, '', 'weight', 1.0)
YIELD path, weight
WITH path, weight WHERE length(path) <= $max_depth
RETURN nodes(path) AS path_nodes, relationships(path) AS path_relationships, weight
ORDER BY weight, length(path)";

const INFLUENCE_NETWORK: &str = "MATCH (c:CONSULTANT) WHERE id(c) IN $consultant_ids
OPTIONAL MATCH (c)-[e:EMPLOYS]->(fc:FIELD_CONSULTANT)
OPTIONAL MATCH (fc)-[cov:COVERS]->(covered) WHERE covered:COMPANY OR covered:PRODUCT
OPTIONAL MATCH (covered)-[own:OWNS]->(owned:PRODUCT)
OPTIONAL MATCH (c)-[rat:RATES]->(rated:PRODUCT)
RETURN c AS consultant,
       collect(DISTINCT fc) + collect(DISTINCT covered) + collect(DISTINCT owned) + collect(DISTINCT rated) AS connected_nodes,
       collect(DISTINCT e) + collect(DISTINCT cov) + collect(DISTINCT own) + collect(DISTINCT rat) AS relationships
ORDER BY id(c)";

const NODE_DETAIL: &str = "MATCH (n) WHERE id(n) = $node_id
OPTIONAL MATCH (n)-[r]-(m)
RETURN n, collect(r) AS relationships, collect(m) AS connected_nodes";

fn recommendation(kind: RecommendationKind) -> String {
    let body = match kind {
        RecommendationKind::SimilarEntities => {
            "MATCH (candidate)
WHERE id(candidate) <> id(seed) AND any(label IN labels(candidate) WHERE label IN labels(seed))
WITH seed, candidate, [k IN keys(seed) WHERE NOT valueType(seed[k]) STARTS WITH 'LIST'] AS seed_keys
WITH seed, candidate, seed_keys, size([k IN seed_keys WHERE candidate[k] = seed[k]]) AS shared
OPTIONAL MATCH (seed)--(common)--(candidate)
WITH candidate, seed_keys, shared, count(DISTINCT common) AS common_neighbors
WITH candidate,
     CASE WHEN size(seed_keys) = 0 THEN 0.0 ELSE toFloat(shared) / size(seed_keys) END + common_neighbors AS score
WHERE score > 0"
        }
        RecommendationKind::PotentialConnections => {
            "MATCH (seed)--(via)--(candidate)
WHERE id(candidate) <> id(seed) AND NOT (seed)--(candidate)
WITH candidate, toFloat(count(DISTINCT via)) AS score"
        }
        RecommendationKind::ExpansionOpportunities => {
            "OPTIONAL MATCH (seed)--(neighbor)
WITH seed, collect(DISTINCT neighbor) AS neighbors
WITH seed,
     [x IN neighbors | head(labels(x))] AS known_labels,
     reduce(acc = [], x IN neighbors | acc + CASE WHEN x.region IS NULL THEN [] WHEN valueType(x.region) STARTS WITH 'LIST' THEN x.region ELSE [x.region] END) AS known_regions,
     reduce(acc = [], x IN neighbors | acc + CASE WHEN x.channel IS NULL THEN [] WHEN valueType(x.channel) STARTS WITH 'LIST' THEN x.channel ELSE [x.channel] END) AS known_channels
MATCH (candidate) WHERE id(candidate) <> id(seed)
WITH candidate, known_labels, known_regions, known_channels,
     CASE WHEN candidate.region IS NULL THEN [] WHEN valueType(candidate.region) STARTS WITH 'LIST' THEN candidate.region ELSE [candidate.region] END AS regions,
     CASE WHEN candidate.channel IS NULL THEN [] WHEN valueType(candidate.channel) STARTS WITH 'LIST' THEN candidate.channel ELSE [candidate.channel] END AS channels
WITH candidate,
     head(labels(candidate)) IS NOT NULL AND NOT head(labels(candidate)) IN known_labels AS novel_label,
     size(regions) > 0 AND none(v IN regions WHERE v IN known_regions) AS novel_region,
     size(channels) > 0 AND none(v IN channels WHERE v IN known_channels) AS novel_channel
WHERE novel_label OR novel_region OR novel_channel
WITH candidate, CASE WHEN novel_label THEN 3.0 WHEN novel_region THEN 2.0 ELSE 1.0 END AS score"
        }
    };
    format!(
        "MATCH (seed) WHERE id(seed) = $seed_id\n{body}\
         \nRETURN candidate AS node, score\
         \nORDER BY score DESC, id(candidate) ASC\
         \nLIMIT $limit"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::filter::{EntityType, FilterSpec, NumericRange};
    use crate::model::NodeId;
    use crate::query::{assemble, Page};
    use proptest::prelude::*;

    fn fetch(spec: &FilterSpec, neighborhood: Neighborhood) -> String {
        assemble(
            TraversalPattern::FilteredFetch { neighborhood },
            compile(spec, "n", Some("r")).unwrap(),
            Page::default(),
        )
        .unwrap()
        .text
    }

    #[test]
    fn test_property_predicate_checks_both_shapes() {
        let p = Predicate::PropertyIn { alias: "n".into(), keys: &["asset_class"], param: "asset_classes".into() };
        let text = predicate(&p);
        assert!(text.contains("n.asset_class IN $asset_classes"));
        assert!(text.contains("valueType(n.asset_class) STARTS WITH 'LIST'"));
    }

    #[test]
    fn test_multi_key_property_predicate() {
        let spec = FilterSpec { influence_levels: vec!["High".into()], ..FilterSpec::default() };
        let text = fetch(&spec, Neighborhood::Subject);
        for key in ["level_of_influence", "influence_level", "levelOfInfluence", "influence"] {
            assert!(text.contains(&format!("n.{key} IN $level_of_influence")), "{key} missing");
        }
    }

    #[test]
    fn test_unfiltered_fetch_has_no_where() {
        let text = fetch(&FilterSpec::new(), Neighborhood::Subject);
        assert!(!text.contains("WHERE"));
        assert!(text.contains("ORDER BY id(n) SKIP $offset LIMIT $limit"));
    }

    #[test]
    fn test_relation_predicates_switch_match_pattern() {
        let spec = FilterSpec {
            entity_types: vec![EntityType::Product],
            rating_range: Some(NumericRange::new(Some(2.0), Some(4.0))),
            ..FilterSpec::default()
        };
        let text = fetch(&spec, Neighborhood::Subject);
        assert!(text.starts_with("MATCH (n)-[r]-(m)"));
        assert!(text.contains("toFloat(r.rankvalue) >= $rating_min"));
        assert!(text.contains("toFloat(r.rankvalue) <= $rating_max"));
    }

    #[test]
    fn test_cascading_entity_and_rating_queries() {
        let entity = assemble(
            TraversalPattern::CascadingOptions { dimension: OptionDimension::Companies },
            compile(&FilterSpec::new(), "n", None).unwrap(),
            Page::default(),
        )
        .unwrap();
        assert!(entity.text.contains("WHERE x:COMPANY"));
        assert!(entity.text.contains("toString(x.name) AS name"));

        let rating = assemble(
            TraversalPattern::CascadingOptions { dimension: OptionDimension::RankGroups },
            compile(&FilterSpec::new(), "n", None).unwrap(),
            Page::default(),
        )
        .unwrap();
        assert!(rating.text.contains("[r:RATES]"));
        assert!(rating.text.contains("r.rankgroup"));
    }

    #[test]
    fn test_traversal_templates_are_parameterized() {
        let q = assemble(
            TraversalPattern::BoundedExpansion { seeds: vec![NodeId(4)], depth: 2 },
            Default::default(),
            Page::default(),
        )
        .unwrap();
        assert!(q.text.contains("uniqueness: 'NODE_GLOBAL'"));
        assert!(q.text.contains("maxLevel: $depth"));

        let q = assemble(
            TraversalPattern::Recommendation {
                seed: NodeId(4),
                kind: RecommendationKind::PotentialConnections,
                limit: 10,
            },
            Default::default(),
            Page::default(),
        )
        .unwrap();
        assert!(q.text.contains("NOT (seed)--(candidate)"));
        assert!(q.text.ends_with("LIMIT $limit"));
    }

    #[test]
    fn test_escape_key() {
        assert_eq!(escape_key("asset_class"), "asset_class");
        assert_eq!(escape_key("rank value"), "`rank value`");
    }

    proptest! {
        #[test]
        fn prop_user_values_never_reach_query_text(
            value in "~[a-zA-Z0-9 '\"`;)(}{-]{5,24}",
        ) {
            let spec = FilterSpec {
                regions: vec![value.clone()],
                companies: vec![value.clone()],
                rating_changes: vec![value.clone()],
                ..FilterSpec::default()
            };
            let query = assemble(
                TraversalPattern::FilteredFetch { neighborhood: Neighborhood::OneHop },
                compile(&spec, "n", Some("r")).unwrap(),
                Page::default(),
            ).unwrap();
            prop_assert!(!query.text.contains(&value));
            prop_assert!(query.params.values().any(|v| v.matches_any(&[value.as_str().into()])));
        }
    }
}

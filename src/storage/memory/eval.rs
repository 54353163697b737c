//! Plan evaluation for the in-memory store.
//!
//! One function per traversal pattern, each producing the same columns,
//! row order and collection semantics as the Cypher the plan renders to.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use hashbrown::{HashMap, HashSet};

use super::GraphData;
use crate::cascade::OptionSource;
use crate::compiler::{Bound, CompiledFilter, Predicate};
use crate::execution::Row;
use crate::filter::Neighborhood;
use crate::model::*;
use crate::query::{Page, QueryPlan, RecommendationKind, TraversalPattern};
use crate::{Error, Result};

pub(super) fn evaluate(g: &GraphData, plan: &QueryPlan) -> Result<Vec<Row>> {
    match &plan.pattern {
        TraversalPattern::FilteredFetch { neighborhood } => {
            if plan.filter.has_relation_predicates() {
                filtered_fetch_relational(g, &plan.filter, plan.page)
            } else {
                filtered_fetch(g, &plan.filter, *neighborhood, plan.page)
            }
        }
        TraversalPattern::CascadingOptions { dimension } => {
            cascading(g, &plan.filter, dimension.source())
        }
        TraversalPattern::BoundedExpansion { seeds, depth } => {
            Ok(expansion(g, seeds, *depth as usize, plan.page))
        }
        TraversalPattern::PathSearch { sources, targets, max_depth } => {
            Ok(path_search(g, sources, targets, *max_depth as usize))
        }
        TraversalPattern::Recommendation { seed, kind, limit } => {
            Ok(recommendation(g, *seed, *kind, *limit))
        }
        TraversalPattern::InfluenceNetwork { consultants } => Ok(influence_network(g, consultants)),
        TraversalPattern::NodeDetail { node } => Ok(node_detail(g, *node)),
    }
}

// ============================================================================
// Predicates
// ============================================================================

fn binding<'a>(filter: &'a CompiledFilter, param: &str) -> Result<&'a [Value]> {
    filter
        .bindings
        .get(param)
        .map(Value::elements)
        .ok_or_else(|| Error::QueryCompilation(format!("unbound parameter ${param}")))
}

fn contains(accepted: &[Value], value: &Value) -> bool {
    accepted.iter().any(|a| value.equivalent(a))
}

fn vertex_matches(node: &Node, filter: &CompiledFilter) -> Result<bool> {
    for p in &filter.vertex {
        let accepted = binding(filter, p.param())?;
        let ok = match p {
            Predicate::PropertyIn { keys, .. } => keys
                .iter()
                .any(|k| node.get(k).is_some_and(|v| v.matches_any(accepted))),
            Predicate::LabelIn { .. } => node
                .labels
                .iter()
                .any(|l| contains(accepted, &Value::from(l.as_str()))),
            Predicate::Identifier { label, .. } => {
                node.has_label(label.label())
                    && (node.get("name").is_some_and(|n| contains(accepted, n))
                        || contains(accepted, &Value::from(node.id.to_string())))
            }
            Predicate::RelPropertyIn { .. } | Predicate::RelBound { .. } => {
                return Err(Error::QueryCompilation(
                    "relation predicate in vertex position".into(),
                ));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn relation_matches(rel: &Relationship, filter: &CompiledFilter) -> Result<bool> {
    for p in &filter.relation {
        let ok = match p {
            Predicate::RelPropertyIn { key, param, .. } => {
                let accepted = binding(filter, param)?;
                rel.get(key).is_some_and(|v| contains(accepted, v))
            }
            Predicate::RelBound { key, bound, param, numeric_cast, .. } => {
                let limit = filter
                    .bindings
                    .get(param.as_str())
                    .ok_or_else(|| Error::QueryCompilation(format!("unbound parameter ${param}")))?;
                let stored = match rel.get(key) {
                    Some(v) if *numeric_cast => v.to_float().map(Value::Float),
                    Some(v) => Some(v.clone()),
                    None => None,
                };
                let cmp = stored.and_then(|v| v.neo4j_cmp(limit));
                match bound {
                    Bound::Min => matches!(cmp, Some(Ordering::Greater | Ordering::Equal)),
                    Bound::Max => matches!(cmp, Some(Ordering::Less | Ordering::Equal)),
                }
            }
            _ => {
                return Err(Error::QueryCompilation(
                    "vertex predicate in relation position".into(),
                ));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn subjects<'g>(g: &'g GraphData, filter: &CompiledFilter) -> Result<Vec<&'g Node>> {
    let mut out = Vec::new();
    for node in g.nodes() {
        if vertex_matches(node, filter)? {
            out.push(node);
        }
    }
    Ok(out)
}

// ============================================================================
// Collection helpers
// ============================================================================

/// `collect(DISTINCT x)` over nodes, first-seen order.
#[derive(Default)]
struct NodeList {
    seen: HashSet<NodeId>,
    items: Vec<Value>,
}

impl NodeList {
    fn push(&mut self, node: &Node) {
        if self.seen.insert(node.id) {
            self.items.push(Value::from(node.clone()));
        }
    }
}

/// `collect(DISTINCT r)` over relationships, first-seen order.
#[derive(Default)]
struct RelList {
    seen: HashSet<RelId>,
    items: Vec<Value>,
}

impl RelList {
    fn push(&mut self, rel: &Relationship) {
        if self.seen.insert(rel.id) {
            self.items.push(Value::from(rel.clone()));
        }
    }
}

fn concat(lists: impl IntoIterator<Item = Vec<Value>>) -> Value {
    Value::List(lists.into_iter().flatten().collect())
}

fn page<T>(items: Vec<T>, page: Page) -> impl Iterator<Item = T> {
    items.into_iter().skip(page.offset).take(page.limit)
}

// ============================================================================
// Filtered fetch
// ============================================================================

fn filtered_fetch(
    g: &GraphData,
    filter: &CompiledFilter,
    neighborhood: Neighborhood,
    window: Page,
) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for n in page(subjects(g, filter)?, window) {
        let (relationships, connected) = match neighborhood {
            Neighborhood::Subject => (Value::List(vec![]), Value::List(vec![])),
            Neighborhood::OneHop => {
                let (mut r1, mut m1) = (RelList::default(), NodeList::default());
                for rel in g.incident(n.id) {
                    r1.push(rel);
                    push_other(g, rel, n.id, &mut m1);
                }
                (Value::List(r1.items), Value::List(m1.items))
            }
            Neighborhood::TwoHop => {
                let (mut r1, mut m1) = (RelList::default(), NodeList::default());
                let (mut r2, mut m2) = (RelList::default(), NodeList::default());
                let mut first_ring = Vec::new();
                for rel in g.incident(n.id) {
                    r1.push(rel);
                    push_other(g, rel, n.id, &mut m1);
                    first_ring.extend(rel.other_node(n.id));
                }
                for mid in first_ring {
                    for rel in g.incident(mid) {
                        r2.push(rel);
                        push_other(g, rel, mid, &mut m2);
                    }
                }
                (concat([r1.items, r2.items]), concat([m1.items, m2.items]))
            }
        };
        rows.push(
            Row::new()
                .with("n", n.clone())
                .with("relationships", relationships)
                .with("connected_nodes", connected),
        );
    }
    Ok(rows)
}

fn push_other(g: &GraphData, rel: &Relationship, from: NodeId, into: &mut NodeList) {
    if let Some(other) = rel.other_node(from).and_then(|id| g.node(id)) {
        into.push(other);
    }
}

fn filtered_fetch_relational(g: &GraphData, filter: &CompiledFilter, window: Page) -> Result<Vec<Row>> {
    let mut grouped = Vec::new();
    for n in subjects(g, filter)? {
        let (mut rels, mut others) = (RelList::default(), NodeList::default());
        for rel in g.incident(n.id) {
            if relation_matches(rel, filter)? {
                rels.push(rel);
                push_other(g, rel, n.id, &mut others);
            }
        }
        if !rels.items.is_empty() {
            grouped.push((n, rels.items, others.items));
        }
    }

    Ok(page(grouped, window)
        .map(|(n, rels, others)| {
            Row::new()
                .with("n", n.clone())
                .with("relationships", Value::List(rels))
                .with("connected_nodes", Value::List(others))
        })
        .collect())
}

// ============================================================================
// Cascading options
// ============================================================================

fn cascading(g: &GraphData, filter: &CompiledFilter, source: OptionSource) -> Result<Vec<Row>> {
    let subjects = subjects(g, filter)?;

    if let OptionSource::Rating(key) = source {
        let mut rated: BTreeMap<RelId, &Relationship> = BTreeMap::new();
        for n in &subjects {
            for rel in g.incident(n.id).filter(|r| r.rel_type == "RATES") {
                rated.insert(rel.id, rel);
            }
        }
        let values = rated.values().filter_map(|r| r.get(key));
        return Ok(value_rows(values));
    }

    // Subject set unioned with its one-hop neighborhood
    let mut scope: BTreeSet<NodeId> = BTreeSet::new();
    for n in &subjects {
        scope.insert(n.id);
        scope.extend(g.neighbors(n.id));
    }
    let scope = scope.into_iter().filter_map(|id| g.node(id));

    match source {
        OptionSource::Property(dim) => {
            let keys = dim.property_keys();
            let values: Vec<&Value> = scope
                .flat_map(|x| keys.iter().filter_map(move |k| x.get(k)))
                .collect();
            Ok(value_rows(values))
        }
        OptionSource::Entity(ty) => {
            let mut entities: Vec<&Node> = scope.filter(|x| x.has_label(ty.label())).collect();
            entities.sort_by(|a, b| {
                let name = |n: &Node| n.get("name").and_then(Value::to_cypher_string);
                match (name(a), name(b)) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
                .then(a.id.cmp(&b.id))
            });
            Ok(entities
                .into_iter()
                .map(|x| {
                    Row::new()
                        .with("id", x.id.to_string())
                        .with(
                            "name",
                            Value::from(x.get("name").and_then(Value::to_cypher_string)),
                        )
                })
                .collect())
        }
        OptionSource::Rating(_) => Ok(Vec::new()),
    }
}

/// Distinct, non-empty stringified values with list-valued properties
/// unwound, sorted.
fn value_rows<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<Row> {
    let distinct: BTreeSet<String> = values
        .into_iter()
        .flat_map(Value::elements)
        .filter_map(Value::to_cypher_string)
        .filter(|s| !s.is_empty())
        .collect();
    distinct.into_iter().map(|v| Row::new().with("value", v)).collect()
}

// ============================================================================
// Bounded expansion
// ============================================================================

/// BFS from each seed, every vertex visited once per seed. Results are
/// the union over seeds, paged by identity.
fn expansion(g: &GraphData, seeds: &[NodeId], depth: usize, window: Page) -> Vec<Row> {
    let mut reached: BTreeSet<NodeId> = BTreeSet::new();
    let mut tree: BTreeMap<RelId, &Relationship> = BTreeMap::new();

    for &seed in seeds {
        if g.node(seed).is_none() {
            continue;
        }
        let mut visited: HashSet<NodeId> = HashSet::from_iter([seed]);
        let mut frontier = vec![seed];
        reached.insert(seed);

        for _ in 0..depth {
            let mut next = Vec::new();
            for &id in &frontier {
                for rel in g.incident(id) {
                    let Some(other) = rel.other_node(id) else { continue };
                    if visited.insert(other) {
                        tree.insert(rel.id, rel);
                        reached.insert(other);
                        next.push(other);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
    }

    let ids: Vec<NodeId> = reached.into_iter().collect();
    page(ids, window)
        .filter_map(|id| g.node(id))
        .map(|n| {
            let rels: Vec<Value> = tree
                .values()
                .filter(|r| r.src == n.id)
                .map(|r| Value::from((*r).clone()))
                .collect();
            Row::new()
                .with("n", n.clone())
                .with("relationships", Value::List(rels))
                .with("connected_nodes", Value::List(vec![]))
        })
        .collect()
}

// ============================================================================
// Path search
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct State {
    cost: f64,
    node: NodeId,
}

impl Eq for State {}

impl Ord for State {
    // Reversed for a min-heap; ties go to the lower identity.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn weight(rel: &Relationship) -> f64 {
    rel.get("weight").and_then(Value::to_float).unwrap_or(1.0).max(0.0)
}

/// Weighted shortest path, relations traversed in both directions.
fn dijkstra(g: &GraphData, source: NodeId, target: NodeId) -> Option<(Path, f64)> {
    let mut dist: HashMap<NodeId, f64> = HashMap::new();
    let mut prev: HashMap<NodeId, (NodeId, RelId)> = HashMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(source, 0.0);
    heap.push(State { cost: 0.0, node: source });

    while let Some(State { cost, node }) = heap.pop() {
        if node == target {
            break;
        }
        if dist.get(&node).is_some_and(|&d| cost > d) {
            continue;
        }
        for rel in g.incident(node) {
            let Some(next) = rel.other_node(node) else { continue };
            let candidate = cost + weight(rel);
            if dist.get(&next).is_none_or(|&d| candidate < d) {
                dist.insert(next, candidate);
                prev.insert(next, (node, rel.id));
                heap.push(State { cost: candidate, node: next });
            }
        }
    }

    let total = *dist.get(&target)?;
    let mut nodes = vec![g.node(target)?.clone()];
    let mut rels = Vec::new();
    let mut at = target;
    while at != source {
        let (from, rel) = *prev.get(&at)?;
        rels.push(g.relationships.get(&rel)?.clone());
        nodes.push(g.node(from)?.clone());
        at = from;
    }
    nodes.reverse();
    rels.reverse();
    Some((Path { nodes, relationships: rels }, total))
}

fn path_search(g: &GraphData, sources: &[NodeId], targets: &[NodeId], max_depth: usize) -> Vec<Row> {
    let mut found = Vec::new();
    // `id(x) IN $ids` matches each vertex once
    let mut seen_sources = HashSet::new();
    for &source in sources.iter().filter(|s| seen_sources.insert(**s)) {
        let mut seen_targets = HashSet::new();
        for &target in targets.iter().filter(|t| seen_targets.insert(**t)) {
            if source == target || g.node(source).is_none() || g.node(target).is_none() {
                continue;
            }
            if let Some((path, total)) = dijkstra(g, source, target) {
                if path.len() <= max_depth {
                    found.push((path, total));
                }
            }
        }
    }
    found.sort_by(|(a, wa), (b, wb)| wa.total_cmp(wb).then(a.len().cmp(&b.len())));

    found
        .into_iter()
        .map(|(path, total)| {
            Row::new()
                .with("path_nodes", path.nodes)
                .with("path_relationships", path.relationships)
                .with("weight", total)
        })
        .collect()
}

// ============================================================================
// Recommendations
// ============================================================================

fn recommendation(g: &GraphData, seed: NodeId, kind: RecommendationKind, limit: usize) -> Vec<Row> {
    let Some(seed) = g.node(seed) else {
        return Vec::new();
    };
    let mut scored: Vec<(&Node, f64)> = match kind {
        RecommendationKind::SimilarEntities => similar(g, seed),
        RecommendationKind::PotentialConnections => potential_connections(g, seed),
        RecommendationKind::ExpansionOpportunities => expansion_opportunities(g, seed),
    };
    scored.sort_by(|(a, sa), (b, sb)| sb.total_cmp(sa).then(a.id.cmp(&b.id)));
    scored
        .into_iter()
        .take(limit)
        .map(|(node, score)| Row::new().with("node", node.clone()).with("score", score))
        .collect()
}

fn similar<'g>(g: &'g GraphData, seed: &Node) -> Vec<(&'g Node, f64)> {
    let seed_props: Vec<(&String, &Value)> =
        seed.properties.iter().filter(|(_, v)| !v.is_list()).collect();
    let seed_neighbors: HashSet<NodeId> = g.neighbors(seed.id).into_iter().collect();

    g.nodes()
        .filter(|c| c.id != seed.id && c.labels.iter().any(|l| seed.has_label(l)))
        .filter_map(|c| {
            let shared = seed_props
                .iter()
                .filter(|(k, v)| c.get(k).is_some_and(|cv| cv.equivalent(v)))
                .count();
            let fraction = if seed_props.is_empty() {
                0.0
            } else {
                shared as f64 / seed_props.len() as f64
            };
            let common = g
                .neighbors(c.id)
                .into_iter()
                .filter(|id| *id != seed.id && seed_neighbors.contains(id))
                .count();
            let score = fraction + common as f64;
            (score > 0.0).then_some((c, score))
        })
        .collect()
}

fn potential_connections<'g>(g: &'g GraphData, seed: &Node) -> Vec<(&'g Node, f64)> {
    let direct: HashSet<NodeId> = g.neighbors(seed.id).into_iter().collect();
    let mut via: BTreeMap<NodeId, HashSet<NodeId>> = BTreeMap::new();

    for &mid in &direct {
        for candidate in g.neighbors(mid) {
            if candidate != seed.id && !direct.contains(&candidate) {
                via.entry(candidate).or_default().insert(mid);
            }
        }
    }

    via.into_iter()
        .filter_map(|(id, mids)| g.node(id).map(|n| (n, mids.len() as f64)))
        .collect()
}

fn expansion_opportunities<'g>(g: &'g GraphData, seed: &Node) -> Vec<(&'g Node, f64)> {
    let neighbors: Vec<&Node> = g.neighbors(seed.id).into_iter().filter_map(|id| g.node(id)).collect();
    let known_labels: HashSet<&str> = neighbors.iter().filter_map(|n| n.primary_label()).collect();
    let known = |key: &str| -> Vec<Value> {
        neighbors
            .iter()
            .filter_map(|n| n.get(key))
            .flat_map(|v| v.elements().iter().cloned())
            .collect()
    };
    let known_regions = known("region");
    let known_channels = known("channel");

    let novel = |node: &Node, key: &str, known: &[Value]| {
        let values = node.get(key).map(Value::elements).unwrap_or_default();
        !values.is_empty() && values.iter().all(|v| !contains(known, v))
    };

    g.nodes()
        .filter(|c| c.id != seed.id)
        .filter_map(|c| {
            let score = if c.primary_label().is_some_and(|l| !known_labels.contains(l)) {
                3.0
            } else if novel(c, "region", &known_regions) {
                2.0
            } else if novel(c, "channel", &known_channels) {
                1.0
            } else {
                return None;
            };
            Some((c, score))
        })
        .collect()
}

// ============================================================================
// Influence network & node detail
// ============================================================================

fn outgoing<'g>(
    g: &'g GraphData,
    from: NodeId,
    rel_type: &'static str,
    target_labels: &'static [&'static str],
) -> impl Iterator<Item = (&'g Relationship, &'g Node)> {
    g.incident(from)
        .filter(move |r| r.src == from && r.rel_type == rel_type)
        .filter_map(move |r| g.node(r.dst).map(|n| (r, n)))
        .filter(move |(_, n)| target_labels.iter().any(|l| n.has_label(l)))
}

fn influence_network(g: &GraphData, consultants: &[NodeId]) -> Vec<Row> {
    let ids: BTreeSet<NodeId> = consultants.iter().copied().collect();
    let mut rows = Vec::new();

    for c in ids.into_iter().filter_map(|id| g.node(id)) {
        if !c.has_label("CONSULTANT") {
            continue;
        }
        let (mut fcs, mut covered, mut owned, mut rated) =
            (NodeList::default(), NodeList::default(), NodeList::default(), NodeList::default());
        let (mut employs, mut covers, mut owns, mut rates) =
            (RelList::default(), RelList::default(), RelList::default(), RelList::default());

        for (e, fc) in outgoing(g, c.id, "EMPLOYS", &["FIELD_CONSULTANT"]) {
            employs.push(e);
            fcs.push(fc);
            for (cov, target) in outgoing(g, fc.id, "COVERS", &["COMPANY", "PRODUCT"]) {
                covers.push(cov);
                covered.push(target);
                for (own, product) in outgoing(g, target.id, "OWNS", &["PRODUCT"]) {
                    owns.push(own);
                    owned.push(product);
                }
            }
        }
        for (rat, product) in outgoing(g, c.id, "RATES", &["PRODUCT"]) {
            rates.push(rat);
            rated.push(product);
        }

        rows.push(
            Row::new()
                .with("consultant", c.clone())
                .with("connected_nodes", concat([fcs.items, covered.items, owned.items, rated.items]))
                .with("relationships", concat([employs.items, covers.items, owns.items, rates.items])),
        );
    }
    rows
}

fn node_detail(g: &GraphData, id: NodeId) -> Vec<Row> {
    let Some(n) = g.node(id) else {
        return Vec::new();
    };
    let (mut rels, mut others) = (Vec::new(), Vec::new());
    for rel in g.incident(id) {
        rels.push(Value::from(rel.clone()));
        if let Some(other) = rel.other_node(id).and_then(|o| g.node(o)) {
            others.push(Value::from(other.clone()));
        }
    }
    vec![Row::new()
        .with("n", n.clone())
        .with("relationships", Value::List(rels))
        .with("connected_nodes", Value::List(others))]
}

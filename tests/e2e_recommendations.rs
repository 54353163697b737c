//! End-to-end tests for the three recommendation kinds.

mod common;

use common::{advisory_network, Fixture};
use graphfilter::{NodeId, RecommendationKind, ScoredNode};
use pretty_assertions::assert_eq;

fn ranked(results: &[ScoredNode]) -> Vec<(String, f64)> {
    results.iter().map(|r| (r.node.id.clone(), r.score)).collect()
}

#[tokio::test]
async fn test_similar_entities_share_label_and_neighbors() {
    let f = advisory_network();
    let results = f
        .engine
        .recommend(f.global_equity, RecommendationKind::SimilarEntities, None)
        .await
        .unwrap();

    // Core Bond shares Acme and Alice as neighbors; nothing else overlaps
    assert_eq!(ranked(&results), vec![(Fixture::id(f.core_bond), 2.0)]);
    assert_eq!(results[0].node.node_type, "PRODUCT");
}

#[tokio::test]
async fn test_potential_connections_count_intermediaries() {
    let f = advisory_network();
    let results = f
        .engine
        .recommend(f.fiona, RecommendationKind::PotentialConnections, None)
        .await
        .unwrap();

    // Both products are reachable through Alice and through Acme; ties by identity
    assert_eq!(
        ranked(&results),
        vec![(Fixture::id(f.global_equity), 2.0), (Fixture::id(f.core_bond), 2.0)]
    );
}

#[tokio::test]
async fn test_expansion_opportunities_rank_new_types_first() {
    let f = advisory_network();
    let results = f
        .engine
        .recommend(f.fiona, RecommendationKind::ExpansionOpportunities, None)
        .await
        .unwrap();

    let top = &results[0];
    assert_eq!(top.node.id, Fixture::id(f.frank));
    assert_eq!(top.score, 3.0);

    // Bob and Globex are known types in a new region
    let bob = results.iter().find(|r| r.node.id == Fixture::id(f.bob)).unwrap();
    assert_eq!(bob.score, 2.0);
    // Alice and Acme add nothing new
    assert!(results.iter().all(|r| r.node.id != Fixture::id(f.alice)));
    assert!(results.iter().all(|r| r.node.id != Fixture::id(f.acme)));
    assert_eq!(results.len(), 7);
}

#[tokio::test]
async fn test_scores_are_non_increasing_and_limited() {
    let f = advisory_network();
    let results = f
        .engine
        .recommend(f.fiona, RecommendationKind::ExpansionOpportunities, Some(3))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_isolated_seed_has_no_similar_or_connected_candidates() {
    let f = advisory_network();
    for kind in [RecommendationKind::SimilarEntities, RecommendationKind::PotentialConnections] {
        let results = f.engine.recommend(f.orphan, kind, None).await.unwrap();
        assert!(results.is_empty(), "{kind} should be empty");
    }
}

#[tokio::test]
async fn test_missing_seed_is_empty() {
    let f = advisory_network();
    let results = f
        .engine
        .recommend(NodeId(999), RecommendationKind::PotentialConnections, None)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_limit_outside_range_is_rejected() {
    let f = advisory_network();
    f.store().set_available(false);

    for limit in [0, 51] {
        let err = f
            .engine
            .recommend(f.fiona, RecommendationKind::SimilarEntities, Some(limit))
            .await
            .unwrap_err();
        assert!(err.is_invalid_parameter(), "limit {limit}: {err}");
    }
}

#[tokio::test]
async fn test_kind_names() {
    assert_eq!("similar_nodes".parse::<RecommendationKind>().unwrap(), RecommendationKind::SimilarEntities);
    assert_eq!(
        "potential_connections".parse::<RecommendationKind>().unwrap(),
        RecommendationKind::PotentialConnections
    );
    assert!("trending".parse::<RecommendationKind>().unwrap_err().is_invalid_parameter());
}

//! Retrieval Engine behavioral tests (spec.md §4.7, §8): seeded ranking,
//! dependency-graph expansion, and score monotonicity across hops.

use std::collections::{HashMap, HashSet};

use cic_core::node::{CodeNode, NodeType};
use cic_search::retrieval::{build_hierarchical_context, retrieve, RetrievalCandidate};
use cic_search::VectorStore;
use parking_lot::Mutex;

fn node(id: &str, name: &str, embedding: Vec<f32>, deps: &[&str]) -> CodeNode {
    let mut n = CodeNode::block(
        "a.py",
        name,
        format!("content for {id}"),
        NodeType::Function,
        0.6,
        deps.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
    );
    n.id = id.to_string();
    n.embedding = embedding;
    n
}

#[test]
fn seed_only_retrieval_ranks_by_score() {
    let mut store = VectorStore::new(2);
    store
        .add(vec![node("a", "a", vec![1.0, 0.0], &[]), node("b", "b", vec![0.0, 1.0], &[])])
        .unwrap();
    let store = Mutex::new(store);

    let results = retrieve(&store, &[1.0, 0.0], 5, false);
    assert_eq!(results[0].node.id, "a");
    assert_eq!(results[0].hop_distance, 0);
}

#[test]
fn graph_expansion_follows_dependency_tokens() {
    let mut store = VectorStore::new(2);
    store
        .add(vec![
            node("seed", "seed", vec![1.0, 0.0], &["helper"]),
            node("helper_node", "helper", vec![0.0, 1.0], &[]),
        ])
        .unwrap();
    let store = Mutex::new(store);

    let results = retrieve(&store, &[1.0, 0.0], 5, true);
    let ids: Vec<_> = results.iter().map(|c| c.node.id.clone()).collect();
    assert!(ids.contains(&"helper_node".to_string()));
    let helper = results.iter().find(|c| c.node.id == "helper_node").unwrap();
    assert_eq!(helper.hop_distance, 1);
}

#[test]
fn score_monotonically_decreases_with_hop_distance() {
    let mut store = VectorStore::new(2);
    store
        .add(vec![
            node("seed", "seed", vec![1.0, 0.0], &["mid"]),
            node("mid_node", "mid", vec![0.9, 0.1], &["leaf"]),
            node("leaf_node", "leaf", vec![0.1, 0.9], &[]),
        ])
        .unwrap();
    let store = Mutex::new(store);

    let results = retrieve(&store, &[1.0, 0.0], 10, true);
    let by_hop: HashMap<u32, f64> = results.iter().map(|c| (c.hop_distance, c.graph_score)).collect();
    if let (Some(&h0), Some(&h1)) = (by_hop.get(&0), by_hop.get(&1)) {
        assert!(h0 >= h1);
    }
}

#[test]
fn hierarchical_context_stops_before_exceeding_budget() {
    let candidates = vec![
        RetrievalCandidate { node: node("a", "a", vec![], &[]), hop_distance: 0, graph_score: 1.0, final_score: 1.0 },
        RetrievalCandidate { node: node("b", "b", vec![], &[]), hop_distance: 0, graph_score: 0.5, final_score: 0.5 },
    ];
    let out = build_hierarchical_context(&candidates, 50);
    assert!(out.len() <= 200);
    assert!(out.contains("NODE: a"));
}

#[test]
fn hierarchical_context_skips_duplicate_files() {
    let candidates = vec![
        RetrievalCandidate { node: node("a", "a", vec![], &[]), hop_distance: 0, graph_score: 1.0, final_score: 1.0 },
        RetrievalCandidate { node: node("b", "b", vec![], &[]), hop_distance: 0, graph_score: 0.9, final_score: 0.9 },
    ];
    let out = build_hierarchical_context(&candidates, 10_000);
    assert_eq!(out.matches("FILE: a.py").count(), 1);
}

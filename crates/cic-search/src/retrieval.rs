//! Retrieval Engine (C8)
//!
//! Seeds from an ANN search, expands over the dependency graph by breadth-
//! first search, and scores candidates by a blend of graph distance decay
//! and structural weight (spec.md §4.7).

use std::collections::HashMap;

use cic_core::node::CodeNode;
use parking_lot::Mutex;

use crate::vector_store::VectorStore;

const SEED_COUNT: usize = 200;
const MAX_HOPS: u32 = 3;
const ALPHA: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub node: CodeNode,
    pub hop_distance: u32,
    pub graph_score: f64,
    pub final_score: f64,
}

/// Index from short import-token name to node ids sharing that name,
/// used to resolve a candidate's `dependencies` tokens during BFS expansion.
fn build_name_index(nodes: &[CodeNode]) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    for node in nodes {
        index.entry(node.name.clone()).or_default().push(node.id.clone());
    }
    index
}

pub fn retrieve(
    store: &Mutex<VectorStore>,
    query_embedding: &[f32],
    max_nodes: usize,
    use_graph: bool,
) -> Vec<RetrievalCandidate> {
    let seeds = {
        let mut store = store.lock();
        store.search(query_embedding, SEED_COUNT).unwrap_or_default()
    };
    if seeds.is_empty() {
        return Vec::new();
    }

    // visited preserves insertion order for deterministic tie-breaking.
    let mut visited: Vec<(String, RetrievalCandidate)> = Vec::new();
    let mut visited_ids: std::collections::HashSet<String> = std::collections::HashSet::new();

    for (node, score) in seeds {
        if visited_ids.insert(node.id.clone()) {
            visited.push((
                node.id.clone(),
                RetrievalCandidate {
                    node,
                    hop_distance: 0,
                    graph_score: score as f64,
                    final_score: 0.0,
                },
            ));
        }
    }

    if use_graph {
        let all_nodes = store.lock().all().to_vec();
        let name_index = build_name_index(&all_nodes);
        let by_id: HashMap<String, CodeNode> = all_nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        let internal_cap = (max_nodes * 4).max(SEED_COUNT);
        let mut frontier: Vec<usize> = (0..visited.len()).collect();

        for _ in 0..MAX_HOPS {
            if visited.len() >= internal_cap || frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();
            for &parent_idx in &frontier {
                let (parent_hop, parent_score, deps) = {
                    let (_, parent) = &visited[parent_idx];
                    (parent.hop_distance, parent.graph_score, parent.node.dependencies.clone())
                };
                for dep in &deps {
                    let Some(candidate_ids) = name_index.get(dep) else { continue };
                    for candidate_id in candidate_ids {
                        if visited_ids.contains(candidate_id) {
                            continue;
                        }
                        let Some(node) = by_id.get(candidate_id) else { continue };
                        let new_hop = parent_hop + 1;
                        let graph_score = parent_score * (-ALPHA * f64::from(new_hop)).exp();
                        visited_ids.insert(candidate_id.clone());
                        let idx = visited.len();
                        visited.push((
                            candidate_id.clone(),
                            RetrievalCandidate { node: node.clone(), hop_distance: new_hop, graph_score, final_score: 0.0 },
                        ));
                        next_frontier.push(idx);
                        if visited.len() >= internal_cap {
                            break;
                        }
                    }
                    if visited.len() >= internal_cap {
                        break;
                    }
                }
                if visited.len() >= internal_cap {
                    break;
                }
            }
            frontier = next_frontier;
        }
    }

    let mut candidates: Vec<RetrievalCandidate> = visited
        .into_iter()
        .map(|(_, mut candidate)| {
            candidate.final_score = candidate.graph_score * (0.8 + 0.2 * candidate.node.structural_weight());
            candidate
        })
        .collect();

    // Stable sort preserves insertion order among ties (determinism, spec.md §4.7).
    candidates.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(max_nodes);
    candidates
}

/// Build the hierarchical context string from sorted `candidates`: one whole
/// block per candidate, at most one whole-file entry per file, halting
/// before exceeding `max_chars`.
pub fn build_hierarchical_context(candidates: &[RetrievalCandidate], max_chars: usize) -> String {
    let mut out = String::new();
    let mut file_seen = std::collections::HashSet::new();

    for candidate in candidates {
        if file_seen.contains(&candidate.node.file_path) {
            continue;
        }
        let rule = "─".repeat(40);
        let block = format!(
            "# FILE: {} | NODE: {} (Type: {})\n{}\n{}\n{}\n",
            candidate.node.file_path,
            candidate.node.name,
            candidate.node.node_type.as_str(),
            rule,
            candidate.node.content,
            rule,
        );
        if out.len() + block.len() > max_chars {
            break;
        }
        out.push_str(&block);
        file_seen.insert(candidate.node.file_path.clone());
    }

    out
}


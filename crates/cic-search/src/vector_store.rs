//! Vector Store (C7)
//!
//! An HNSW approximate-nearest-neighbor index (`hora::HNSWIndex`, M=32,
//! efConstruction=40, efSearch=16) paired with a side map of full
//! [`CodeNode`] records, so exact cosine re-ranking and `get_by_id`/
//! `get_by_name` lookups don't depend on what the ANN index itself returns.
//!
//! Persisted as `vector_store/hnsw.index` (the `hora` binary dump) and
//! `vector_store/metadata.json` (the node records) under a project's storage
//! directory — see DESIGN.md for why this departs from the teacher's
//! `qdrant-client` dependency.

use std::collections::HashMap;
use std::path::Path;

use cic_core::node::CodeNode;
use hora::core::ann_index::ANNIndex;
use hora::core::ann_index::SerializableIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

const HNSW_M: usize = 32;
const HNSW_EF_CONSTRUCTION: usize = 40;
const HNSW_EF_SEARCH: usize = 16;

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct StoreMetadata {
    nodes: Vec<CodeNode>,
}

/// Wraps an embedded HNSW index plus the node records it indexes.
pub struct VectorStore {
    dimension: usize,
    index: HNSWIndex<f32, usize>,
    nodes: Vec<CodeNode>,
    by_id: HashMap<String, usize>,
    built: bool,
}

impl VectorStore {
    pub fn new(dimension: usize) -> Self {
        let params = HNSWParams::<f32>::default()
            .max_item(1_000_000)
            .n_neighbor(HNSW_M)
            .n_neighbor0(HNSW_M * 2)
            .ef_build(HNSW_EF_CONSTRUCTION)
            .ef_search(HNSW_EF_SEARCH)
            .has_deletion(false);
        Self {
            dimension,
            index: HNSWIndex::new(dimension, &params),
            nodes: Vec::new(),
            by_id: HashMap::new(),
            built: false,
        }
    }

    /// Append `nodes`, skipping ones with empty (pending) embeddings.
    /// L2-normalizes each embedding in place before indexing.
    pub fn add(&mut self, nodes: Vec<CodeNode>) -> Result<()> {
        for mut node in nodes {
            if node.embedding.is_empty() {
                continue;
            }
            if node.embedding.len() != self.dimension {
                return Err(SearchError::DimensionMismatch {
                    expected: self.dimension,
                    actual: node.embedding.len(),
                });
            }
            l2_normalize(&mut node.embedding);
            let internal_id = self.nodes.len();
            self.index
                .add(&node.embedding, internal_id)
                .map_err(|e| SearchError::Index(e.to_string()))?;
            self.by_id.insert(node.id.clone(), internal_id);
            self.nodes.push(node);
        }
        self.built = false;
        Ok(())
    }

    fn ensure_built(&mut self) -> Result<()> {
        if !self.built && !self.nodes.is_empty() {
            self.index
                .build(Metric::CosineSimilarity)
                .map_err(|e| SearchError::Index(e.to_string()))?;
            self.built = true;
        }
        Ok(())
    }

    /// Search for the `k` nearest nodes to `query`, normalizing the query
    /// in place and re-scoring candidates by exact cosine similarity.
    pub fn search(&mut self, query: &[f32], k: usize) -> Result<Vec<(CodeNode, f32)>> {
        if self.nodes.is_empty() || query.len() != self.dimension {
            return Ok(Vec::new());
        }
        self.ensure_built()?;

        let mut normalized = query.to_vec();
        l2_normalize(&mut normalized);

        let candidate_ids = self.index.search(&normalized, (k * 2).max(k));
        let mut scored: Vec<(CodeNode, f32)> = candidate_ids
            .into_iter()
            .filter_map(|id| self.nodes.get(id).cloned().map(|n| {
                let score = cosine(&normalized, &n.embedding);
                (n, score)
            }))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&CodeNode> {
        self.by_id.get(id).and_then(|idx| self.nodes.get(*idx))
    }

    /// First node whose `name` matches, in insertion order.
    pub fn get_by_name(&self, name: &str) -> Option<&CodeNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn all(&self) -> &[CodeNode] {
        &self.nodes
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Persist the ANN index and node metadata under `dir`.
    pub fn save(&mut self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.ensure_built()?;
        let index_path = dir.join("hnsw.index");
        self.index
            .dump(index_path.to_string_lossy().as_ref())
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let metadata = StoreMetadata { nodes: self.nodes.clone() };
        let raw = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(dir.join("metadata.json"), raw)?;
        Ok(())
    }

    /// Load a previously-saved store from `dir`. Rebuilds `by_id` from the
    /// restored node list; the ANN graph structure itself comes from the
    /// `hora` binary dump.
    pub fn load(dir: &Path, dimension: usize) -> Result<Self> {
        let index_path = dir.join("hnsw.index");
        let index = HNSWIndex::<f32, usize>::load(index_path.to_string_lossy().as_ref())
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let raw = std::fs::read_to_string(dir.join("metadata.json"))?;
        let metadata: StoreMetadata = serde_json::from_str(&raw)?;

        let mut by_id = HashMap::new();
        for (idx, node) in metadata.nodes.iter().enumerate() {
            by_id.insert(node.id.clone(), idx);
        }

        Ok(Self {
            dimension,
            index,
            nodes: metadata.nodes,
            by_id,
            built: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cic_core::node::NodeType;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn node(id: &str, embedding: Vec<f32>) -> CodeNode {
        let mut n = CodeNode::block("a.py", id, "content", NodeType::Function, 0.6, HashSet::new());
        n.id = id.to_string();
        n.embedding = embedding;
        n
    }

    #[test]
    fn add_skips_empty_embeddings() {
        let mut store = VectorStore::new(3);
        store.add(vec![node("empty", vec![])]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn add_normalizes_and_search_returns_closest_first() {
        let mut store = VectorStore::new(3);
        store
            .add(vec![
                node("a", vec![1.0, 0.0, 0.0]),
                node("b", vec![0.0, 1.0, 0.0]),
                node("c", vec![0.9, 0.1, 0.0]),
            ])
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, "a");
    }

    #[test]
    fn save_then_load_round_trips_nodes() {
        let dir = tempdir().unwrap();
        let mut store = VectorStore::new(3);
        store
            .add(vec![node("a", vec![1.0, 0.0, 0.0]), node("b", vec![0.0, 1.0, 0.0])])
            .unwrap();
        store.save(dir.path()).unwrap();

        let loaded = VectorStore::load(dir.path(), 3).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.get_by_id("a").is_some());
    }

    #[test]
    fn get_by_name_finds_first_match() {
        let mut store = VectorStore::new(3);
        store.add(vec![node("a", vec![1.0, 0.0, 0.0])]).unwrap();
        assert!(store.get_by_name("a").is_some());
        assert!(store.get_by_name("missing").is_none());
    }
}

//! Experience Vault (C13)
//!
//! A small parallel store of past agent sessions, recalled by cosine
//! similarity to enrich future context packs. Expected to stay small enough
//! that a linear scan beats the bookkeeping of a full ANN index — unlike the
//! Vector Store (C7), this is not `hora`-backed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const RECALL_LIMIT: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub prompt: String,
    pub solution: String,
    pub embedding: Vec<f32>,
    /// +1 for a successful session, -1 for a failed one.
    pub outcome: i8,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[derive(Default)]
pub struct ExperienceVault {
    records: Mutex<Vec<Experience>>,
}

impl ExperienceVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: String, solution: String, embedding: Vec<f32>, success: bool) {
        self.records.lock().push(Experience {
            prompt,
            solution,
            embedding,
            outcome: if success { 1 } else { -1 },
        });
    }

    /// Up to [`RECALL_LIMIT`] brief strings for the closest past sessions.
    pub fn recall(&self, query_embedding: &[f32]) -> Vec<String> {
        let records = self.records.lock();
        let mut scored: Vec<(&Experience, f32)> =
            records.iter().map(|e| (e, cosine(query_embedding, &e.embedding))).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(RECALL_LIMIT)
            .map(|(e, _)| {
                let label = if e.outcome > 0 { "SUCCESSFUL STRATEGY" } else { "FAILED ATTEMPT" };
                format!("[{label}] Context: {}\nResult: {}", e.prompt, e.solution)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recall_returns_closest_first_labeled_by_outcome() {
        let vault = ExperienceVault::new();
        vault.add("fix null deref".into(), "added a guard clause".into(), vec![1.0, 0.0], true);
        vault.add("fix null deref attempt 2".into(), "tried X, broke tests".into(), vec![0.9, 0.1], false);
        vault.add("unrelated".into(), "unrelated fix".into(), vec![0.0, 1.0], true);

        let recalled = vault.recall(&[1.0, 0.0]);
        assert!(recalled[0].starts_with("[SUCCESSFUL STRATEGY]"));
        assert!(recalled.len() <= 3);
    }

    #[test]
    fn empty_vault_recalls_nothing() {
        let vault = ExperienceVault::new();
        assert!(vault.recall(&[1.0, 0.0]).is_empty());
    }
}

//! The embedding seam between the Sync Engine and the Model Gateway.
//!
//! `cic-core` never depends on `cic-search`: the Sync Engine asks for
//! embeddings through this trait, and `cic-search`'s Model Gateway
//! implements it. This mirrors the Design Notes' guidance (spec.md §9) to
//! model heterogeneous collaborators as a narrow trait rather than a
//! concrete dependency.

use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone)]
pub struct EmbedError(pub String);

impl fmt::Display for EmbedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for EmbedError {}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. A batch-level failure is reported as a
    /// single `Err`; the Sync Engine logs it and skips embeddings for that
    /// batch rather than aborting the whole sync (spec.md §7).
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// No-op embedder for tests: returns empty (pending) vectors.
#[cfg(any(test, feature = "test-util"))]
pub struct NullEmbedder;

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl Embedder for NullEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|_| Vec::new()).collect())
    }
}

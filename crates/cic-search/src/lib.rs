//! Model gateway, embedding cache, HNSW vector store, retrieval engine, and
//! experience vault.

pub mod cache;
pub mod error;
pub mod experience;
pub mod gateway;
pub mod key_pool;
pub mod retrieval;
pub mod vector_store;

pub use cache::EmbeddingCache;
pub use error::{Result, SearchError};
pub use experience::{Experience, ExperienceVault};
pub use gateway::{GatewayConfig, GenerateResult, LatencyObserver, ModelGateway, VisionResult};
pub use key_pool::{KeyPool, KeysFile};
pub use retrieval::{build_hierarchical_context, retrieve, RetrievalCandidate};
pub use vector_store::VectorStore;

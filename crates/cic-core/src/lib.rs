//! Code-node model, heuristic parser, path filtering, and the Sync Engine.
//!
//! This crate never depends on `cic-search`: the [`embed::Embedder`] trait is
//! the seam the Model Gateway implements on the other side.

pub mod embed;
pub mod error;
pub mod filter;
pub mod manifest;
pub mod node;
pub mod parser;
pub mod sync;
pub mod tree;
pub mod xray;

pub use embed::{EmbedError, Embedder};
pub use error::{CoreError, Result};
pub use filter::PathFilter;
pub use manifest::{fingerprint, Manifest};
pub use node::{CodeNode, NodeType, DEFAULT_EMBEDDING_DIM};
pub use parser::parse_file;
pub use sync::{perform_sync, sync_single_file, SyncConfig, SyncOutcome};
pub use tree::render_tree;
pub use xray::{xray, XrayLanguage, XraySymbol};

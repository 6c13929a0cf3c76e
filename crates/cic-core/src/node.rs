//! Code-Node data model
//!
//! A [`CodeNode`] is the atomic unit indexed by the Sync Engine and retrieved
//! by the search pipeline. It represents either an entire file or a single
//! declaration block (class, function, method, ...) extracted from one.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Default embedding dimension used when a project does not override it.
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Coarse classification of a [`CodeNode`].
///
/// The parser is intentionally imprecise about this: `Unknown` is a valid,
/// expected outcome for blocks whose declaration header didn't match any of
/// the recognized keywords closely enough to classify further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    File,
    CodeBlock,
    Class,
    Function,
    Method,
    Unknown,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::CodeBlock => "code_block",
            NodeType::Class => "class",
            NodeType::Function => "function",
            NodeType::Method => "method",
            NodeType::Unknown => "unknown",
        }
    }
}

/// The atomic indexed unit: a whole file, or a declaration block within one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeNode {
    /// Stable id, typically `<relative_path>::<symbol>`, or just
    /// `<relative_path>` for whole-file nodes. Unique within a project.
    pub id: String,
    pub name: String,
    pub content: String,
    pub docstring: Option<String>,
    /// Forward-slash, workspace-relative path.
    pub file_path: String,
    pub node_type: NodeType,
    /// Short import-token names this node depends on (not resolved paths).
    pub dependencies: HashSet<String>,
    /// Fixed-dimension embedding vector, or empty while pending.
    pub embedding: Vec<f32>,
    /// Always contains at least a `"structural"` weight in `[0, 1]`.
    pub weights: HashMap<String, f64>,
    pub ai_summary: Option<String>,
    pub ai_quality_score: Option<f64>,
}

impl CodeNode {
    /// Build a whole-file node: `type = "file"`, `weights.structural = 1.0`.
    pub fn file(file_path: impl Into<String>, content: impl Into<String>, dependencies: HashSet<String>) -> Self {
        let file_path = file_path.into();
        let mut weights = HashMap::new();
        weights.insert("structural".to_string(), 1.0);
        Self {
            id: file_path.clone(),
            name: file_path.clone(),
            content: content.into(),
            docstring: None,
            file_path,
            node_type: NodeType::File,
            dependencies,
            embedding: Vec::new(),
            weights,
            ai_summary: None,
            ai_quality_score: None,
        }
    }

    /// Build a declaration-block node inheriting the file's import set.
    pub fn block(
        file_path: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        node_type: NodeType,
        structural_weight: f64,
        dependencies: HashSet<String>,
    ) -> Self {
        let file_path = file_path.into();
        let name = name.into();
        let mut weights = HashMap::new();
        weights.insert("structural".to_string(), structural_weight.clamp(0.0, 1.0));
        Self {
            id: format!("{file_path}::{name}"),
            name,
            content: content.into(),
            docstring: None,
            file_path,
            node_type,
            dependencies,
            embedding: Vec::new(),
            weights,
            ai_summary: None,
            ai_quality_score: None,
        }
    }

    /// Structural weight in `[0, 1]`, defaulting to 0 if unset.
    pub fn structural_weight(&self) -> f64 {
        self.weights.get("structural").copied().unwrap_or(0.0)
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

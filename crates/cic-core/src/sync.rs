//! Sync Engine (C6)
//!
//! Filtered tree walk, hash diff against the prior manifest, batched
//! embedding, and the side outputs (`tree.txt`, `_full_context.txt`,
//! `converted_files/`) described in spec.md §4.5.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::embed::Embedder;
use crate::error::{CoreError, Result};
use crate::filter::PathFilter;
use crate::manifest::{fingerprint, Manifest};
use crate::node::CodeNode;
use crate::parser::parse_file;
use crate::tree::render_tree;

/// Batch size for `embed_batch` calls during a full sync (spec.md §4.5).
pub const EMBED_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub project_id: String,
    pub source_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub ignored_paths: Vec<String>,
    pub included_paths: Vec<String>,
}

impl SyncConfig {
    fn filter(&self) -> PathFilter {
        PathFilter::new(
            self.allowed_extensions.clone(),
            self.ignored_paths.clone(),
            self.included_paths.clone(),
        )
    }
}

#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub nodes: Vec<CodeNode>,
    pub updated_count: usize,
    pub deleted_count: usize,
    pub logs: Vec<String>,
}

/// Walk `cfg.source_dir`, applying filter rules and skipping `cfg.storage_dir`
/// even if it lies underneath the source tree. Returns relative,
/// forward-slash paths of every collected file.
fn collect_files(cfg: &SyncConfig) -> Result<Vec<String>> {
    if !cfg.source_dir.exists() {
        return Err(CoreError::SourceNotFound(cfg.source_dir.clone()));
    }
    let filter = cfg.filter();
    let storage_dir = fs::canonicalize(&cfg.storage_dir).unwrap_or_else(|_| cfg.storage_dir.clone());

    let mut collected = Vec::new();
    let walker = WalkDir::new(&cfg.source_dir).into_iter().filter_entry(|entry| {
        if entry.path() == cfg.source_dir {
            return true;
        }
        if let Ok(canon) = fs::canonicalize(entry.path()) {
            if canon == storage_dir || canon.starts_with(&storage_dir) {
                return false;
            }
        }
        let Ok(rel) = entry.path().strip_prefix(&cfg.source_dir) else {
            return false;
        };
        let rel = to_forward_slash(rel);
        if entry.file_type().is_dir() {
            filter.enters_dir(&rel)
        } else {
            true
        }
    });

    for entry in walker {
        let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = to_forward_slash(entry.path().strip_prefix(&cfg.source_dir).unwrap());
        if filter.collects_file(&rel) {
            collected.push(rel);
        }
    }
    collected.sort();
    Ok(collected)
}

fn to_forward_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Run a full sync for one project. See spec.md §4.5 for the diff protocol.
pub async fn perform_sync(
    cfg: &SyncConfig,
    previous_nodes_by_path: &HashMap<String, Vec<CodeNode>>,
    embedder: &dyn Embedder,
) -> Result<SyncOutcome> {
    let mut logs = Vec::new();
    let collected = collect_files(cfg)?;
    let old_manifest = Manifest::load(&cfg.storage_dir);
    let mut new_manifest = Manifest::new();

    let mut nodes = Vec::new();
    let mut pending: Vec<(usize, String)> = Vec::new(); // (node index, text to embed)
    let mut updated_count = 0usize;

    for rel in &collected {
        let abs = cfg.source_dir.join(rel);
        let metadata = match fs::metadata(&abs) {
            Ok(m) => m,
            Err(err) => {
                logs.push(format!("skip {rel}: {err}"));
                continue;
            }
        };
        let fp = fingerprint(&metadata);
        new_manifest.set(rel.clone(), fp.clone());

        let unchanged = old_manifest.get(rel).map(|prior| prior == &fp).unwrap_or(false);
        if unchanged {
            if let Some(prior_nodes) = previous_nodes_by_path.get(rel) {
                nodes.extend(prior_nodes.iter().cloned());
                continue;
            }
            logs.push(format!("{rel}: manifest unchanged but metadata missing, re-parsing"));
        }

        let content = match fs::read_to_string(&abs) {
            Ok(c) => c,
            Err(err) => {
                logs.push(format!("skip {rel}: unreadable ({err})"));
                continue;
            }
        };
        let file_nodes = parse_file(rel, &content);
        for node in file_nodes {
            let idx = nodes.len();
            pending.push((idx, node.content.clone()));
            nodes.push(node);
        }
        updated_count += 1;

        mirror_file(&cfg.storage_dir, rel, &content)?;
    }

    let deleted: Vec<String> = old_manifest
        .paths()
        .filter(|p| !new_manifest.entries.contains_key(*p))
        .cloned()
        .collect();
    let deleted_count = deleted.len();
    if deleted_count > 0 {
        info!(project_id = %cfg.project_id, count = deleted_count, "sync removed files");
    }

    embed_pending(&mut nodes, pending, embedder).await;

    write_tree_and_context(cfg, &collected)?;
    new_manifest.save(&cfg.storage_dir)?;

    Ok(SyncOutcome {
        nodes,
        updated_count,
        deleted_count,
        logs,
    })
}

/// Embed `pending` nodes in slices of [`EMBED_BATCH_SIZE`], writing results
/// back into `nodes`. A batch-level embedding failure is logged and that
/// batch's nodes are left with empty (pending) embeddings — the rest of the
/// sync proceeds (spec.md §7).
async fn embed_pending(nodes: &mut [CodeNode], pending: Vec<(usize, String)>, embedder: &dyn Embedder) {
    for chunk in pending.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
        match embedder.embed_batch(texts).await {
            Ok(vectors) => {
                for ((idx, _), vector) in chunk.iter().zip(vectors.into_iter()) {
                    nodes[*idx].embedding = vector;
                }
            }
            Err(err) => {
                warn!(error = %err, batch_len = chunk.len(), "embedding batch failed, leaving nodes pending");
            }
        }
    }
}

fn mirror_file(storage_dir: &Path, relative_path: &str, content: &str) -> Result<()> {
    let mirror_path = storage_dir.join("converted_files").join(format!("{relative_path}.txt"));
    if let Some(parent) = mirror_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(mirror_path, content)?;
    Ok(())
}

fn write_tree_and_context(cfg: &SyncConfig, collected: &[String]) -> Result<()> {
    fs::create_dir_all(&cfg.storage_dir)?;
    fs::write(cfg.storage_dir.join("tree.txt"), render_tree(collected))?;

    let mut full_context = String::new();
    for rel in collected {
        let abs = cfg.source_dir.join(rel);
        if let Ok(content) = fs::read_to_string(&abs) {
            full_context.push_str(&format!("--- FILE: {rel} ---\n"));
            full_context.push_str(&content);
            full_context.push('\n');
        }
    }
    fs::write(cfg.storage_dir.join("_full_context.txt"), full_context)?;
    Ok(())
}

/// Incremental single-file sync: parse, embed, and return the file's fresh
/// nodes for the caller to upsert into the live Vector Store. Refreshes the
/// file's mirror and manifest entry; does not touch `tree.txt` or
/// `_full_context.txt` (those are full-sync side outputs).
pub async fn sync_single_file(
    cfg: &SyncConfig,
    relative_path: &str,
    embedder: &dyn Embedder,
) -> Result<Vec<CodeNode>> {
    let abs = cfg.source_dir.join(relative_path);
    let content = fs::read_to_string(&abs)?;
    let metadata = fs::metadata(&abs)?;

    let mut nodes = parse_file(relative_path, &content);
    let texts: Vec<String> = nodes.iter().map(|n| n.content.clone()).collect();
    match embedder.embed_batch(texts).await {
        Ok(vectors) => {
            for (node, vector) in nodes.iter_mut().zip(vectors.into_iter()) {
                node.embedding = vector;
            }
        }
        Err(err) => {
            warn!(error = %err, path = relative_path, "single-file embedding failed, leaving nodes pending");
        }
    }

    mirror_file(&cfg.storage_dir, relative_path, &content)?;

    let mut manifest = Manifest::load(&cfg.storage_dir);
    manifest.set(relative_path.to_string(), fingerprint(&metadata));
    manifest.save(&cfg.storage_dir)?;

    Ok(nodes)
}

/// Build a by-file-path index of prior nodes, used to feed
/// `previous_nodes_by_path` into [`perform_sync`].
pub fn index_by_file_path(nodes: &[CodeNode]) -> HashMap<String, Vec<CodeNode>> {
    let mut map: HashMap<String, Vec<CodeNode>> = HashMap::new();
    for node in nodes {
        map.entry(node.file_path.clone()).or_default().push(node.clone());
    }
    map
}

/// Deduplicated set of dependency tokens referenced anywhere in `nodes`,
/// useful for callers building name indexes.
pub fn all_dependency_tokens(nodes: &[CodeNode]) -> HashSet<String> {
    nodes.iter().flat_map(|n| n.dependencies.iter().cloned()).collect()
}


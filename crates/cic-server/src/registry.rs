//! Per-project registry: registration config, live Vector Store, and
//! Experience Vault, keyed by `project_id`.
//!
//! Grounded on the teacher's `WorkspaceRegistry` (cached backend-per-name
//! map guarded by a lock), generalized from a single `RwLock<HashMap>` to a
//! `DashMap` so registering one project never blocks a read of another's
//! (spec.md §5's per-project exclusivity is a separate, finer-grained lock
//! kept alongside the project entries here).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cic_config::ProjectConfig;
use cic_core::node::{CodeNode, DEFAULT_EMBEDDING_DIM};
use cic_search::{ExperienceVault, VectorStore};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::error::ApiError;

/// Live, in-memory state for one registered project.
pub struct ProjectEntry {
    pub config: ProjectConfig,
    pub store: Arc<Mutex<VectorStore>>,
    pub experiences: Arc<ExperienceVault>,
}

/// Registry of all projects the server knows about.
///
/// Holds one [`ProjectEntry`] per registered `project_id`, plus a parallel
/// table of per-project sync locks (spec.md §5: at most one `perform_sync`
/// in flight per project at a time).
pub struct ProjectRegistry {
    entries: DashMap<String, Arc<ProjectEntry>>,
    sync_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self { entries: DashMap::new(), sync_locks: DashMap::new() }
    }

    /// Register (or re-register) a project: persist its `config.json`,
    /// load an existing Vector Store from its storage directory if one
    /// exists, otherwise start with an empty one.
    pub fn register(&self, project_id: &str, config: ProjectConfig) -> Result<(), ApiError> {
        config.save(&config.storage_path)?;

        let vector_dir = config.storage_path.join("vector_store");
        let store = VectorStore::load(&vector_dir, DEFAULT_EMBEDDING_DIM).unwrap_or_else(|err| {
            warn!(project_id, error = %err, "no usable vector store on disk, starting empty");
            VectorStore::new(DEFAULT_EMBEDDING_DIM)
        });

        let entry = Arc::new(ProjectEntry {
            config,
            store: Arc::new(Mutex::new(store)),
            experiences: Arc::new(ExperienceVault::new()),
        });
        self.entries.insert(project_id.to_string(), entry);
        info!(project_id, "registered project");
        Ok(())
    }

    pub fn get(&self, project_id: &str) -> Option<Arc<ProjectEntry>> {
        self.entries.get(project_id).map(|e| e.clone())
    }

    pub fn require(&self, project_id: &str) -> Result<Arc<ProjectEntry>, ApiError> {
        self.get(project_id).ok_or_else(|| ApiError::ProjectNotFound(project_id.to_string()))
    }

    /// Replace a project's in-memory Vector Store wholesale — used after a
    /// full sync, which reconstructs the node set from scratch.
    pub fn replace_store(&self, project_id: &str, store: VectorStore) {
        if let Some(entry) = self.entries.get(project_id) {
            *entry.store.lock() = store;
        }
    }

    /// The async lock guarding this project's sync exclusivity, created on
    /// first use.
    pub fn sync_lock(&self, project_id: &str) -> Arc<AsyncMutex<()>> {
        self.sync_locks.entry(project_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    pub fn project_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// True if `candidate` (relative to a project's local root) resolves inside
/// that project's own storage directory — used by `/sync/file` to reject
/// syncing the tool's own mirrored output (spec.md §6).
pub fn path_enters_storage_dir(local_root: &Path, storage_dir: &Path, relative_path: &str) -> bool {
    let joined = local_root.join(relative_path);
    let canon_joined = joined.canonicalize().unwrap_or(joined);
    let canon_storage = storage_dir.canonicalize().unwrap_or_else(|_| storage_dir.to_path_buf());
    canon_joined.starts_with(&canon_storage)
}

/// By-file-path index of a project's currently indexed nodes, for feeding
/// into `cic_core::sync::perform_sync`'s diff.
pub fn previous_nodes_by_path(store: &Mutex<VectorStore>) -> std::collections::HashMap<String, Vec<CodeNode>> {
    cic_core::sync::index_by_file_path(store.lock().all())
}

pub fn default_storage_path(data_dir: &Path, project_id: &str) -> PathBuf {
    data_dir.join(project_id)
}

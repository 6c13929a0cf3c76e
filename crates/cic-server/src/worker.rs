//! Background sync worker pool (spec.md §5): a bounded `JoinSet`-backed pool
//! draining an mpsc queue of full and single-file sync jobs, one at a time
//! per project via the registry's sync-lock table.

use std::sync::Arc;

use cic_core::embed::Embedder;
use cic_core::sync::{self, SyncConfig};
use cic_search::VectorStore;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::registry::ProjectRegistry;

const DEFAULT_WORKER_COUNT: usize = 4;

#[derive(Debug, Clone)]
pub enum SyncJob {
    Full { project_id: String },
    File { project_id: String, relative_path: String },
}

#[derive(Clone)]
pub struct SyncWorkerPool {
    sender: mpsc::Sender<SyncJob>,
}

impl SyncWorkerPool {
    /// Spawn `worker_count` tasks (default [`DEFAULT_WORKER_COUNT`]) pulling
    /// from a shared job queue; returns immediately, handing back a sender
    /// half the HTTP handlers use to schedule work without waiting on it.
    pub fn spawn(registry: Arc<ProjectRegistry>, embedder: Arc<dyn Embedder>, worker_count: Option<usize>) -> Self {
        let worker_count = worker_count.unwrap_or(DEFAULT_WORKER_COUNT).max(1);
        let (sender, receiver) = mpsc::channel(256);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let mut set = JoinSet::new();
        for id in 0..worker_count {
            let registry = registry.clone();
            let embedder = embedder.clone();
            let receiver = receiver.clone();
            set.spawn(async move {
                loop {
                    let job = { receiver.lock().await.recv().await };
                    let Some(job) = job else { break };
                    run_job(&registry, embedder.as_ref(), job).await;
                }
                id
            });
        }
        // Detach: the pool lives for the server's lifetime, workers exit
        // only when every sender (including this one once dropped) closes.
        tokio::spawn(async move {
            while set.join_next().await.is_some() {}
        });

        Self { sender }
    }

    /// Enqueue `job`; never blocks the HTTP handler on the sync itself
    /// (spec.md §6: `/sync/run` and `/sync/file` respond immediately).
    pub async fn schedule(&self, job: SyncJob) {
        if self.sender.send(job).await.is_err() {
            error!("sync worker pool queue closed, job dropped");
        }
    }
}

async fn run_job(registry: &ProjectRegistry, embedder: &dyn Embedder, job: SyncJob) {
    match job {
        SyncJob::Full { project_id } => run_full_sync(registry, embedder, &project_id).await,
        SyncJob::File { project_id, relative_path } => {
            run_file_sync(registry, embedder, &project_id, &relative_path).await
        }
    }
}

async fn run_full_sync(registry: &ProjectRegistry, embedder: &dyn Embedder, project_id: &str) {
    let Some(entry) = registry.get(project_id) else {
        error!(project_id, "full sync scheduled for unregistered project");
        return;
    };
    let lock = registry.sync_lock(project_id);
    let _guard = lock.lock().await;

    let cfg = SyncConfig {
        project_id: project_id.to_string(),
        source_dir: entry.config.local_path.clone(),
        storage_dir: entry.config.storage_path.clone(),
        allowed_extensions: entry.config.allowed_extensions.clone(),
        ignored_paths: entry.config.ignored_paths.clone(),
        included_paths: entry.config.included_paths.clone(),
    };
    let previous = crate::registry::previous_nodes_by_path(&entry.store);

    match sync::perform_sync(&cfg, &previous, embedder).await {
        Ok(outcome) => {
            info!(
                project_id,
                updated = outcome.updated_count,
                deleted = outcome.deleted_count,
                "full sync complete"
            );
            let mut store = VectorStore::new(entry.store.lock().dimension());
            if let Err(err) = store.add(outcome.nodes) {
                error!(project_id, error = %err, "failed to rebuild vector store after sync");
                return;
            }
            let vector_dir = entry.config.storage_path.join("vector_store");
            if let Err(err) = store.save(&vector_dir) {
                error!(project_id, error = %err, "failed to persist vector store");
            }
            registry.replace_store(project_id, store);
        }
        Err(err) => error!(project_id, error = %err, "full sync failed"),
    }
}

async fn run_file_sync(registry: &ProjectRegistry, embedder: &dyn Embedder, project_id: &str, relative_path: &str) {
    let Some(entry) = registry.get(project_id) else {
        error!(project_id, "file sync scheduled for unregistered project");
        return;
    };
    let lock = registry.sync_lock(project_id);
    let _guard = lock.lock().await;

    let cfg = SyncConfig {
        project_id: project_id.to_string(),
        source_dir: entry.config.local_path.clone(),
        storage_dir: entry.config.storage_path.clone(),
        allowed_extensions: entry.config.allowed_extensions.clone(),
        ignored_paths: entry.config.ignored_paths.clone(),
        included_paths: entry.config.included_paths.clone(),
    };

    match sync::sync_single_file(&cfg, relative_path, embedder).await {
        Ok(nodes) => {
            let mut store = entry.store.lock();
            if let Err(err) = store.add(nodes) {
                error!(project_id, relative_path, error = %err, "failed to add synced nodes to vector store");
                return;
            }
            let vector_dir = entry.config.storage_path.join("vector_store");
            if let Err(err) = store.save(&vector_dir) {
                error!(project_id, error = %err, "failed to persist vector store after file sync");
            }
        }
        Err(err) => error!(project_id, relative_path, error = %err, "file sync failed"),
    }
}

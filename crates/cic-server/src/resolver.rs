//! Implementations of `cic-agent`'s two narrow seam traits against the
//! project registry: [`ProjectResolver`] (a `project_id -> ProjectConfig`
//! lookup used by the filesystem tools) and [`ContextProvider`] (builds the
//! [`ContextSnapshot`] an agent mission starts from, per spec.md §4.10/§4.7).

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use cic_agent::context::ContextSnapshot;
use cic_agent::executor::ContextProvider;
use cic_agent::tools::ProjectResolver;
use cic_config::ProjectConfig;
use cic_search::{gateway::ModelGateway, retrieval};
use tracing::warn;

use crate::registry::ProjectRegistry;

pub struct ServerResolver {
    registry: Arc<ProjectRegistry>,
}

impl ServerResolver {
    pub fn new(registry: Arc<ProjectRegistry>) -> Self {
        Self { registry }
    }
}

impl ProjectResolver for ServerResolver {
    fn resolve(&self, project_id: &str) -> Option<ProjectConfig> {
        self.registry.get(project_id).map(|entry| entry.config.clone())
    }
}

/// Retrieval + experience recall + topology read ahead of each agent mission.
pub struct ServerContextProvider {
    registry: Arc<ProjectRegistry>,
    gateway: Arc<ModelGateway>,
}

impl ServerContextProvider {
    pub fn new(registry: Arc<ProjectRegistry>, gateway: Arc<ModelGateway>) -> Self {
        Self { registry, gateway }
    }
}

#[async_trait]
impl ContextProvider for ServerContextProvider {
    async fn build_snapshot(&self, project_id: &str, user_query: &str) -> ContextSnapshot {
        let Some(entry) = self.registry.get(project_id) else {
            warn!(project_id, "context snapshot requested for unregistered project");
            return ContextSnapshot::default();
        };

        let topology = fs::read_to_string(entry.config.storage_path.join("tree.txt")).unwrap_or_default();

        let query_embedding = match self.gateway.embed(user_query).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(project_id, error = %err, "embedding query failed, falling back to topology-only context");
                return ContextSnapshot { project_topology: topology, ..Default::default() };
            }
        };

        let candidates = retrieval::retrieve(&entry.store, &query_embedding, 20, true);
        let focal_content = candidates.first().map(|c| c.node.content.clone());
        let experiences = entry.experiences.recall(&query_embedding);

        ContextSnapshot { focal_content, project_topology: topology, experiences, chat_history: String::new() }
    }

    async fn record_experience(&self, project_id: &str, prompt: &str, solution: &str, success: bool) {
        let Some(entry) = self.registry.get(project_id) else {
            warn!(project_id, "experience recording requested for unregistered project");
            return;
        };
        let embedding = match self.gateway.embed(prompt).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(project_id, error = %err, "embedding the mission prompt failed, experience dropped");
                return;
            }
        };
        entry.experiences.add(prompt.to_string(), solution.to_string(), embedding, success);
    }
}

//! Shared server state: one project registry, one sync worker pool, and one
//! `AgentExecutor` built at startup and fanned out to every request behind
//! an `Arc` (the Tool Registry it owns is not `Clone`, so there is exactly
//! one executor for the process's lifetime, per spec.md §5's
//! one-process-one-loop shape).

use std::sync::Arc;

use cic_agent::tool::ToolRegistry;
use cic_agent::tools::{AnalyzeVisionTool, ApplyEditTool, FinalAnswerTool, ListDirTool, ReadFileTool, WebSearchTool};
use cic_agent::{AgentExecutor, TelemetrySink};
use cic_search::{EmbeddingCache, GatewayConfig, KeyPool, ModelGateway};

use crate::registry::ProjectRegistry;
use crate::resolver::{ServerContextProvider, ServerResolver};
use crate::worker::SyncWorkerPool;

const EMBEDDING_CACHE_CAPACITY: usize = 10_000;
const TELEMETRY_CAPACITY: usize = 500;

pub struct AppState {
    pub registry: Arc<ProjectRegistry>,
    pub gateway: Arc<ModelGateway>,
    pub telemetry: Arc<TelemetrySink>,
    pub executor: Arc<AgentExecutor>,
    pub workers: SyncWorkerPool,
}

impl AppState {
    pub fn new(gateway_config: GatewayConfig, keys: KeyPool, worker_count: Option<usize>) -> Self {
        let registry = Arc::new(ProjectRegistry::new());
        let telemetry = Arc::new(TelemetrySink::new(TELEMETRY_CAPACITY));
        let keys = Arc::new(keys);
        let cache = Arc::new(EmbeddingCache::new(EMBEDDING_CACHE_CAPACITY));
        let gateway = Arc::new(
            ModelGateway::new(gateway_config, keys.clone(), cache).with_observer(telemetry.clone()),
        );

        let resolver = Arc::new(ServerResolver::new(registry.clone()));
        let context_provider = Arc::new(ServerContextProvider::new(registry.clone(), gateway.clone()));

        let mut tools = ToolRegistry::new();
        tools.register(Box::new(ListDirTool::new(resolver.clone())));
        tools.register(Box::new(ReadFileTool::new(resolver.clone())));
        tools.register(Box::new(ApplyEditTool::new(resolver.clone())));
        tools.register(Box::new(WebSearchTool::new(keys.clone())));
        tools.register(Box::new(AnalyzeVisionTool::new(gateway.clone())));
        tools.register(Box::new(FinalAnswerTool));

        let executor = Arc::new(AgentExecutor::new(tools, gateway.clone(), telemetry.clone(), context_provider));
        let workers = SyncWorkerPool::spawn(registry.clone(), gateway.clone(), worker_count);

        Self { registry, gateway, telemetry, executor, workers }
    }
}

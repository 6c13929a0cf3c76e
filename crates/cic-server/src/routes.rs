//! HTTP JSON surface (spec.md §6): project registration and sync scheduling,
//! code-suggestion generation, context retrieval, ghost-text completion, and
//! the admin telemetry/trace endpoints. Every handler returns
//! `Result<Json<T>, ApiError>`, rendered per [`crate::error::ApiError`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use cic_agent::executor::TraceWriter;
use cic_config::ProjectConfig;
use cic_search::retrieval;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::registry::path_enters_storage_dir;
use crate::worker::SyncJob;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sync/register/:project_id", post(register_project))
        .route("/sync/run/:project_id", post(run_sync))
        .route("/sync/file/:project_id", post(sync_file))
        .route("/generate-code-suggestion", post(generate_code_suggestion))
        .route("/retrieve-context-candidates", post(retrieve_context_candidates))
        .route("/complete", post(complete))
        .route("/execute-task", post(execute_task))
        .route("/api/admin/telemetry", get(admin_telemetry))
        .route("/api/admin/agent_trace", get(admin_agent_trace))
        .route("/api/admin/publish_trace", post(admin_publish_trace))
        .route("/api/admin/publish_log", post(admin_publish_log))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct RegisterProjectRequest {
    local_path: PathBuf,
    storage_path: Option<PathBuf>,
    #[serde(default)]
    allowed_extensions: Vec<String>,
    #[serde(default)]
    ignored_paths: Vec<String>,
    #[serde(default)]
    included_paths: Vec<String>,
}

async fn register_project(
    State(state): State<Arc<AppState>>,
    AxumPath(project_id): AxumPath<String>,
    Json(request): Json<RegisterProjectRequest>,
) -> Result<Json<Value>, ApiError> {
    let storage_path = request
        .storage_path
        .unwrap_or_else(|| request.local_path.join(".cic").join(&project_id));

    let config = ProjectConfig {
        local_path: request.local_path,
        storage_path,
        allowed_extensions: request.allowed_extensions,
        ignored_paths: request.ignored_paths,
        included_paths: request.included_paths,
    };
    state.registry.register(&project_id, config)?;
    info!(project_id, "project registered");
    Ok(Json(json!({ "status": "registered" })))
}

async fn run_sync(
    State(state): State<Arc<AppState>>,
    AxumPath(project_id): AxumPath<String>,
) -> Result<Json<Value>, ApiError> {
    state.registry.require(&project_id)?;
    state.workers.schedule(SyncJob::Full { project_id: project_id.clone() }).await;
    Ok(Json(json!({ "status": "scheduled" })))
}

#[derive(Debug, Deserialize)]
struct SyncFileRequest {
    file_path: String,
}

async fn sync_file(
    State(state): State<Arc<AppState>>,
    AxumPath(project_id): AxumPath<String>,
    Json(request): Json<SyncFileRequest>,
) -> Result<Json<Value>, ApiError> {
    let entry = state.registry.require(&project_id)?;
    if path_enters_storage_dir(&entry.config.local_path, &entry.config.storage_path, &request.file_path) {
        return Err(ApiError::BadRequest(format!(
            "'{}' resolves inside the project's storage directory",
            request.file_path
        )));
    }
    state
        .workers
        .schedule(SyncJob::File { project_id: project_id.clone(), relative_path: request.file_path })
        .await;
    Ok(Json(json!({ "status": "scheduled" })))
}

#[derive(Debug, Deserialize)]
struct GenerateCodeSuggestionRequest {
    project_id: String,
    prompt: String,
    #[serde(default)]
    active_file_path: Option<String>,
    #[serde(default)]
    active_file_content: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateCodeSuggestionResponse {
    suggestion: String,
}

async fn generate_code_suggestion(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateCodeSuggestionRequest>,
) -> Result<Json<GenerateCodeSuggestionResponse>, ApiError> {
    state.registry.require(&request.project_id)?;

    let mut prompt = request.prompt;
    if let (Some(path), Some(content)) = (&request.active_file_path, &request.active_file_content) {
        prompt = format!("# ACTIVE FILE: {path}\n{content}\n\n# REQUEST\n{prompt}");
    }
    let result = state.gateway.generate(&prompt).await;
    Ok(Json(GenerateCodeSuggestionResponse { suggestion: result.text }))
}

#[derive(Debug, Deserialize)]
struct RetrieveContextCandidatesRequest {
    project_id: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct ContextCandidate {
    id: String,
    name: String,
    file_path: String,
    #[serde(rename = "type")]
    node_type: String,
    score: f64,
    ai_summary: String,
}

#[derive(Debug, Serialize)]
struct RetrieveContextCandidatesResponse {
    candidates: Vec<ContextCandidate>,
}

async fn retrieve_context_candidates(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RetrieveContextCandidatesRequest>,
) -> Result<Json<RetrieveContextCandidatesResponse>, ApiError> {
    let entry = state.registry.require(&request.project_id)?;
    let embedding = state
        .gateway
        .embed(&request.prompt)
        .await
        .map_err(ApiError::Internal)?;

    let candidates = retrieval::retrieve(&entry.store, &embedding, 20, true)
        .into_iter()
        .map(|c| ContextCandidate {
            id: c.node.id,
            name: c.node.name,
            file_path: c.node.file_path,
            node_type: c.node.node_type.as_str().to_string(),
            score: c.final_score,
            ai_summary: c.node.ai_summary.unwrap_or_default(),
        })
        .collect();

    Ok(Json(RetrieveContextCandidatesResponse { candidates }))
}

#[derive(Debug, Deserialize)]
struct CompleteRequest {
    prefix: String,
    #[serde(default)]
    #[allow(dead_code)]
    suffix: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompleteResponse {
    completion: String,
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let completion = state.gateway.autocomplete(&request.prefix).await;
    Ok(Json(CompleteResponse { completion }))
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    prompt: String,
    project_id: String,
    session_id: Option<String>,
    /// Marks the session successful or failed, recorded as an Experience
    /// once the mission finishes (spec.md §4.11). Omitted or `null` means
    /// the caller isn't marking an outcome, so nothing is recorded.
    #[serde(default)]
    outcome: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct AgentResponse {
    phase: String,
    payload: String,
}

/// Adapts the executor's synchronous [`TraceWriter`] hook onto an
/// unbounded mpsc sender, one frame per significant loop transition.
struct SseWriter(mpsc::UnboundedSender<AgentResponse>);

impl TraceWriter for SseWriter {
    fn send(&self, phase: &str, detail: &str) {
        let _ = self.0.send(AgentResponse { phase: phase.to_string(), payload: detail.to_string() });
    }
}

async fn execute_task(
    State(state): State<Arc<AppState>>,
    Json(query): Json<UserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.require(&query.project_id)?;
    let session_id = query.session_id.unwrap_or_else(|| next_session_id());

    let (sender, receiver) = mpsc::unbounded_channel();
    let executor = state.executor.clone();
    let project_id = query.project_id.clone();
    let prompt = query.prompt.clone();
    let outcome = query.outcome;

    tokio::spawn(async move {
        let writer = SseWriter(sender.clone());
        let answer = executor.run(&prompt, &project_id, &session_id, Some(&writer), outcome).await;
        let _ = sender.send(AgentResponse { phase: "FINAL".to_string(), payload: answer });
    });

    let stream = UnboundedReceiverStream::new(receiver).map(|event| Event::default().json_data(event));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(3)).event(Event::default().data("keep-alive")),
    ))
}

use std::sync::atomic::{AtomicU64, Ordering};
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_session_id() -> String {
    format!("sess-{}", SESSION_COUNTER.fetch_add(1, Ordering::Relaxed))
}

async fn admin_telemetry(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "metrics": { "projects": state.registry.len() },
        "logs": state.telemetry.logs_json(),
    }))
}

async fn admin_agent_trace(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.telemetry.traces_json())
}

#[derive(Debug, Deserialize)]
struct PublishTraceRequest {
    session_id: String,
    state: String,
    detail: String,
    #[serde(default)]
    duration_ms: u64,
}

async fn admin_publish_trace(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishTraceRequest>,
) -> Json<Value> {
    state.telemetry.record_trace(&request.session_id, &request.state, &request.detail, request.duration_ms);
    Json(json!({ "status": "ok" }))
}

async fn admin_publish_log(
    State(state): State<Arc<AppState>>,
    Json(log): Json<cic_agent::telemetry::InteractionLog>,
) -> Json<Value> {
    state.telemetry.record_log(log);
    Json(json!({ "status": "ok" }))
}

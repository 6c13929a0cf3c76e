//! Built-in tools (C9 contract)
//!
//! Every tool receives the Executor-injected `project_id` inside its
//! argument object and resolves it to a [`cic_config::ProjectConfig`]
//! through a [`ProjectResolver`] — a narrow trait so this crate never needs
//! to know how `cic-server` stores its project map.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use cic_config::ProjectConfig;
use cic_core::filter::PathFilter;
use cic_search::{KeyPool, ModelGateway};
use serde_json::Value;

use crate::tool::Tool;

const READ_FILE_MAX_BYTES: u64 = 512 * 1024;
const LIST_DIR_MAX_DEPTH: usize = 3;

/// Resolves a `project_id` to its registration. Implemented by whatever owns
/// the project map (`cic-server`'s registry).
pub trait ProjectResolver: Send + Sync {
    fn resolve(&self, project_id: &str) -> Option<ProjectConfig>;
}

fn project_id_of(args: &Value) -> &str {
    args.get("project_id").and_then(|v| v.as_str()).unwrap_or_default()
}

fn string_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// Lexically join `rel` onto `root`, collapsing `.`/`..` without touching
/// the filesystem, refusing any result that normalizes outside `root`.
fn resolve_within_root(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut result = root.to_path_buf();
    for component in Path::new(rel).components() {
        match component {
            std::path::Component::Normal(seg) => result.push(seg),
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !result.pop() {
                    return None;
                }
            }
            std::path::Component::RootDir | std::path::Component::Prefix(_) => return None,
        }
    }
    if result.starts_with(root) {
        Some(result)
    } else {
        None
    }
}

fn relative_slash(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/")
}

fn project_filter(config: &ProjectConfig) -> PathFilter {
    PathFilter::new(
        config.allowed_extensions.clone(),
        config.ignored_paths.clone(),
        config.included_paths.clone(),
    )
}

fn walk_listing(dir: &Path, root: &Path, filter: &PathFilter, depth: usize, out: &mut Vec<String>) {
    if depth > LIST_DIR_MAX_DEPTH {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        let rel = relative_slash(root, &path);
        if path.is_dir() {
            if filter.enters_dir(&rel) {
                out.push(format!("{rel}/"));
                walk_listing(&path, root, filter, depth + 1, out);
            }
        } else if filter.collects_file(&rel) {
            out.push(rel);
        }
    }
}

pub struct ListDirTool {
    resolver: Arc<dyn ProjectResolver>,
}

impl ListDirTool {
    pub fn new(resolver: Arc<dyn ProjectResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }
    fn description(&self) -> &str {
        "List files and subdirectories under a workspace-relative path, obeying the project's filter rules."
    }
    fn parameters_schema(&self) -> &str {
        r#"{"type":"object","properties":{"path":{"type":"string"}},"required":["path"]}"#
    }

    async fn execute(&self, args: Value) -> String {
        let project_id = project_id_of(&args);
        let Some(config) = self.resolver.resolve(project_id) else {
            return format!("ERROR: project '{project_id}' is not registered.");
        };
        let path = string_arg(&args, "path").unwrap_or("");
        let Some(resolved) = resolve_within_root(&config.local_path, path) else {
            return format!("ERROR: path '{path}' escapes the workspace.");
        };

        let filter = project_filter(&config);
        let mut entries = Vec::new();
        walk_listing(&resolved, &config.local_path, &filter, 0, &mut entries);

        if entries.is_empty() {
            "(empty directory)".to_string()
        } else {
            entries.join("\n")
        }
    }
}

pub struct ReadFileTool {
    resolver: Arc<dyn ProjectResolver>,
}

impl ReadFileTool {
    pub fn new(resolver: Arc<dyn ProjectResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }
    fn description(&self) -> &str {
        "Read the raw UTF-8 content of a workspace-relative file, up to 512 KiB."
    }
    fn parameters_schema(&self) -> &str {
        r#"{"type":"object","properties":{"path":{"type":"string"}},"required":["path"]}"#
    }

    async fn execute(&self, args: Value) -> String {
        let project_id = project_id_of(&args);
        let Some(config) = self.resolver.resolve(project_id) else {
            return format!("ERROR: project '{project_id}' is not registered.");
        };
        let path = string_arg(&args, "path").unwrap_or("");
        let Some(resolved) = resolve_within_root(&config.local_path, path) else {
            return format!("ERROR: path '{path}' escapes the workspace.");
        };

        let metadata = match std::fs::metadata(&resolved) {
            Ok(m) => m,
            Err(err) => return format!("ERROR: {err}"),
        };
        if metadata.len() > READ_FILE_MAX_BYTES {
            return format!("ERROR: '{path}' exceeds the 512 KiB read cap.");
        }

        match std::fs::read_to_string(&resolved) {
            Ok(content) => content,
            Err(err) => format!("ERROR: {err}"),
        }
    }
}

pub struct ApplyEditTool {
    resolver: Arc<dyn ProjectResolver>,
}

impl ApplyEditTool {
    pub fn new(resolver: Arc<dyn ProjectResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Tool for ApplyEditTool {
    fn name(&self) -> &str {
        "apply_edit"
    }
    fn description(&self) -> &str {
        "Overwrite a workspace-relative file with new content through the atomic edit journal."
    }
    fn parameters_schema(&self) -> &str {
        r#"{"type":"object","properties":{"path":{"type":"string"},"content":{"type":"string"}},"required":["path","content"]}"#
    }

    async fn execute(&self, args: Value) -> String {
        let project_id = project_id_of(&args);
        let Some(config) = self.resolver.resolve(project_id) else {
            return format!("ERROR: project '{project_id}' is not registered.");
        };
        let path = string_arg(&args, "path").unwrap_or("");
        let content = string_arg(&args, "content").unwrap_or("");
        let Some(resolved) = resolve_within_root(&config.local_path, path) else {
            return format!("ERROR: path '{path}' escapes the workspace.");
        };

        match crate::journal::apply(&resolved, content) {
            Ok(()) => format!("SUCCESS: wrote {} bytes to '{path}'.", content.len()),
            Err(err) => format!("ERROR: {err}"),
        }
    }
}

pub struct WebSearchTool {
    client: reqwest::Client,
    keys: Arc<KeyPool>,
}

impl WebSearchTool {
    pub fn new(keys: Arc<KeyPool>) -> Self {
        Self { client: reqwest::Client::new(), keys }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }
    fn description(&self) -> &str {
        "Search the web for a short query and return a rendered list of top hits."
    }
    fn parameters_schema(&self) -> &str {
        r#"{"type":"object","properties":{"query":{"type":"string"}},"required":["query"]}"#
    }

    async fn execute(&self, args: Value) -> String {
        let Some(key) = self.keys.serper_key() else {
            return "ERROR: web_search is not configured.".to_string();
        };
        let query = string_arg(&args, "query").unwrap_or("");

        let response = self
            .client
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", key)
            .json(&serde_json::json!({ "q": query }))
            .send()
            .await;

        match response {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(body) => render_hits(&body),
                Err(err) => format!("ERROR: {err}"),
            },
            Err(err) => format!("ERROR: {err}"),
        }
    }
}

fn render_hits(body: &Value) -> String {
    let Some(hits) = body.get("organic").and_then(|v| v.as_array()) else {
        return "(no results)".to_string();
    };
    hits.iter()
        .take(5)
        .filter_map(|hit| {
            let title = hit.get("title").and_then(|v| v.as_str())?;
            let link = hit.get("link").and_then(|v| v.as_str()).unwrap_or("");
            Some(format!("- {title} ({link})"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct AnalyzeVisionTool {
    gateway: Arc<ModelGateway>,
}

impl AnalyzeVisionTool {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for AnalyzeVisionTool {
    fn name(&self) -> &str {
        "analyze_vision"
    }
    fn description(&self) -> &str {
        "Analyze a base64-encoded image with a text prompt via the model gateway's vision path."
    }
    fn parameters_schema(&self) -> &str {
        r#"{"type":"object","properties":{"prompt":{"type":"string"},"image_data":{"type":"string"}},"required":["prompt","image_data"]}"#
    }

    async fn execute(&self, args: Value) -> String {
        let prompt = string_arg(&args, "prompt").unwrap_or("");
        let image_data = string_arg(&args, "image_data").unwrap_or("");
        let Ok(image_bytes) = base64::engine::general_purpose::STANDARD.decode(image_data) else {
            return "ERROR: image_data is not valid base64.".to_string();
        };

        let result = self.gateway.generate_vision(prompt, &image_bytes).await;
        if result.success {
            result.analysis
        } else {
            "ERROR: AI Service Failure".to_string()
        }
    }
}

/// Sentinel tool advertised in the manifest so the model knows the
/// `FINAL_ANSWER` call shape; the Agent Executor intercepts this tool name
/// before dispatch (spec.md §4.11 step 5), so `execute` is never reached in
/// practice.
pub struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        "FINAL_ANSWER"
    }
    fn description(&self) -> &str {
        "Conclude the mission and surface `parameters.answer` to the caller."
    }
    fn parameters_schema(&self) -> &str {
        r#"{"type":"object","properties":{"answer":{"type":"string"}},"required":["answer"]}"#
    }
    async fn execute(&self, args: Value) -> String {
        string_arg(&args, "answer").unwrap_or_default().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct FixedResolver(HashMap<String, ProjectConfig>);

    impl ProjectResolver for FixedResolver {
        fn resolve(&self, project_id: &str) -> Option<ProjectConfig> {
            self.0.get(project_id).cloned()
        }
    }

    fn config_for(local_path: PathBuf) -> ProjectConfig {
        ProjectConfig {
            local_path,
            storage_path: PathBuf::from("/tmp/storage"),
            allowed_extensions: vec![],
            ignored_paths: vec![],
            included_paths: vec![],
        }
    }

    #[test]
    fn resolve_within_root_rejects_parent_escape() {
        let root = Path::new("/ws/project");
        assert!(resolve_within_root(root, "../../etc/passwd").is_none());
        assert_eq!(resolve_within_root(root, "src/main.rs").unwrap(), root.join("src/main.rs"));
    }

    #[tokio::test]
    async fn read_file_refuses_oversized_files() {
        let dir = tempdir().unwrap();
        let big_path = dir.path().join("big.txt");
        std::fs::write(&big_path, vec![b'a'; (READ_FILE_MAX_BYTES + 1) as usize]).unwrap();

        let mut map = HashMap::new();
        map.insert("p1".to_string(), config_for(dir.path().to_path_buf()));
        let tool = ReadFileTool::new(Arc::new(FixedResolver(map)));

        let out = tool
            .execute(serde_json::json!({"project_id": "p1", "path": "big.txt"}))
            .await;
        assert!(out.starts_with("ERROR:"));
    }

    #[tokio::test]
    async fn read_file_rejects_path_escaping_workspace() {
        let dir = tempdir().unwrap();
        let mut map = HashMap::new();
        map.insert("p1".to_string(), config_for(dir.path().to_path_buf()));
        let tool = ReadFileTool::new(Arc::new(FixedResolver(map)));

        let out = tool
            .execute(serde_json::json!({"project_id": "p1", "path": "../../etc/passwd"}))
            .await;
        assert!(out.contains("escapes the workspace"));
    }

    #[tokio::test]
    async fn apply_edit_reports_success_and_writes_file() {
        let dir = tempdir().unwrap();
        let mut map = HashMap::new();
        map.insert("p1".to_string(), config_for(dir.path().to_path_buf()));
        let tool = ApplyEditTool::new(Arc::new(FixedResolver(map)));

        let out = tool
            .execute(serde_json::json!({"project_id": "p1", "path": "a.txt", "content": "hello"}))
            .await;
        assert!(out.starts_with("SUCCESS:"));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn web_search_without_key_returns_configuration_error() {
        let tool = WebSearchTool::new(Arc::new(KeyPool::new(vec!["k".into()], None)));
        let out = tool.execute(serde_json::json!({"query": "rust"})).await;
        assert!(out.contains("not configured"));
    }

    #[tokio::test]
    async fn analyze_vision_rejects_invalid_base64() {
        let tool = AnalyzeVisionTool::new(Arc::new(ModelGateway::new(
            Default::default(),
            Arc::new(KeyPool::new(vec!["k".into()], None)),
            Arc::new(cic_search::EmbeddingCache::new(16)),
        )));
        let out = tool
            .execute(serde_json::json!({"prompt": "what is this", "image_data": "not-base64!!"}))
            .await;
        assert!(out.contains("not valid base64"));
    }

    #[test]
    fn final_answer_schema_names_answer_field() {
        let tool = FinalAnswerTool;
        assert!(tool.parameters_schema().contains("answer"));
    }
}

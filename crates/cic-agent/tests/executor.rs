use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cic_agent::context::ContextSnapshot;
use cic_agent::tool::{Tool, ToolRegistry};
use cic_agent::{AgentExecutor, ContextProvider, TelemetrySink};
use cic_search::{EmbeddingCache, GatewayConfig, KeyPool, ModelGateway};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

struct NoopContext;

#[async_trait]
impl ContextProvider for NoopContext {
    async fn build_snapshot(&self, _project_id: &str, _user_query: &str) -> ContextSnapshot {
        ContextSnapshot::default()
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "echoes a fixed observation"
    }
    fn parameters_schema(&self) -> &str {
        r#"{"type":"object","properties":{}}"#
    }
    async fn execute(&self, _args: Value) -> String {
        "echo-observation".to_string()
    }
}

/// Scripts two identical `echo` calls (to trigger loop-detection on the
/// second one) followed by a `FINAL_ANSWER`.
struct ScriptedModel {
    call: AtomicUsize,
}

impl Respond for ScriptedModel {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.call.fetch_add(1, Ordering::SeqCst);
        let text = if n < 2 {
            r#"{"tool": "echo", "parameters": {"msg": "hi"}}"#
        } else {
            r#"{"tool": "FINAL_ANSWER", "parameters": {"answer": "done"}}"#
        };
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": text}}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2},
        }))
    }
}

async fn build_gateway(mock_uri: &str) -> Arc<ModelGateway> {
    let config = GatewayConfig { base_url: mock_uri.to_string(), ..Default::default() };
    let keys = Arc::new(KeyPool::new(vec!["k1".into()], None));
    let cache = Arc::new(EmbeddingCache::new(16));
    Arc::new(ModelGateway::new(config, keys, cache))
}

#[tokio::test]
async fn repeated_identical_call_is_detected_and_final_answer_ends_the_loop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ScriptedModel { call: AtomicUsize::new(0) })
        .mount(&server)
        .await;

    let gateway = build_gateway(&server.uri()).await;
    let telemetry = Arc::new(TelemetrySink::new(50));

    let mut tools = ToolRegistry::new();
    tools.register(Box::new(EchoTool));

    let executor = AgentExecutor::new(tools, gateway, telemetry.clone(), Arc::new(NoopContext));

    let answer = executor.run("investigate the failure", "proj1", "sess1", None, None).await;

    assert_eq!(answer, "done");

    let traces = telemetry.traces_json();
    let tool_execs = traces
        .as_array()
        .unwrap()
        .iter()
        .filter(|t| t["state"] == "TOOL_EXEC")
        .count();
    // The second identical `echo` call must be caught by loop detection and
    // never reach dispatch, so only the first counts as a TOOL_EXEC.
    assert_eq!(tool_execs, 1);
}

#[tokio::test]
async fn iteration_cap_without_final_answer_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "no action here, just thinking out loud"}}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2},
        })))
        .mount(&server)
        .await;

    let gateway = build_gateway(&server.uri()).await;
    let telemetry = Arc::new(TelemetrySink::new(50));
    let tools = ToolRegistry::new();

    let executor = AgentExecutor::new(tools, gateway, telemetry, Arc::new(NoopContext)).with_max_iterations(3);

    let answer = executor.run("do anything", "proj1", "sess1", None, None).await;
    assert_eq!(answer, "Mission Timed Out.");
}

#[derive(Default)]
struct RecordingContext {
    calls: Mutex<Vec<(String, String, String, bool)>>,
}

#[async_trait]
impl ContextProvider for RecordingContext {
    async fn build_snapshot(&self, _project_id: &str, _user_query: &str) -> ContextSnapshot {
        ContextSnapshot::default()
    }

    async fn record_experience(&self, project_id: &str, prompt: &str, solution: &str, success: bool) {
        self.calls.lock().unwrap().push((project_id.to_string(), prompt.to_string(), solution.to_string(), success));
    }
}

#[tokio::test]
async fn caller_marked_outcome_is_recorded_as_an_experience() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": r#"{"tool": "FINAL_ANSWER", "parameters": {"answer": "fixed it"}}"#}}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2},
        })))
        .mount(&server)
        .await;

    let gateway = build_gateway(&server.uri()).await;
    let telemetry = Arc::new(TelemetrySink::new(50));
    let context = Arc::new(RecordingContext::default());

    let executor = AgentExecutor::new(ToolRegistry::new(), gateway, telemetry, context.clone());
    let answer = executor.run("fix the null deref", "proj1", "sess1", None, Some(true)).await;
    assert_eq!(answer, "fixed it");

    let calls = context.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], ("proj1".to_string(), "fix the null deref".to_string(), "fixed it".to_string(), true));
}

#[tokio::test]
async fn unmarked_outcome_records_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": r#"{"tool": "FINAL_ANSWER", "parameters": {"answer": "done"}}"#}}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2},
        })))
        .mount(&server)
        .await;

    let gateway = build_gateway(&server.uri()).await;
    let telemetry = Arc::new(TelemetrySink::new(50));
    let context = Arc::new(RecordingContext::default());

    let executor = AgentExecutor::new(ToolRegistry::new(), gateway, telemetry, context.clone());
    executor.run("investigate", "proj1", "sess1", None, None).await;

    assert!(context.calls.lock().unwrap().is_empty());
}

//! Agent Executor (C12)
//!
//! Runs the bounded plan/act/observe loop: build a prompt, call the Model
//! Gateway, extract one JSON action from the reply, detect repeats, dispatch
//! through the Tool Registry, and fold the observation back into the
//! monologue for the next iteration.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use cic_search::{GenerateResult, ModelGateway};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::context::{self, ContextSnapshot};
use crate::telemetry::{InteractionLog, RequestType, TelemetrySink};
use crate::tool::ToolRegistry;

const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Streaming sink for progress events, one per significant loop transition
/// (spec.md §4.11: STARTUP, THOUGHT, TOOL_EXEC, AST_SCAN, FINAL, ERROR).
pub trait TraceWriter: Send + Sync {
    fn send(&self, phase: &str, detail: &str);
}

/// Builds the [`ContextSnapshot`] a mission starts from. Implemented by
/// whatever owns per-project retrieval state (`cic-server`'s registry),
/// keeping this crate free of a dependency on the Vector Store's storage
/// lifecycle.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn build_snapshot(&self, project_id: &str, user_query: &str) -> ContextSnapshot;

    /// Persist a finished mission as an Experience, when the caller marked
    /// the session successful or failed at submission time (spec.md §4.11).
    /// Kept as a seam method (default no-op) for the same reason as
    /// `build_snapshot`: this crate has no dependency on the Experience
    /// Vault's per-project storage lifecycle.
    async fn record_experience(&self, _project_id: &str, _prompt: &str, _solution: &str, _success: bool) {}
}

fn emit(writer: Option<&dyn TraceWriter>, telemetry: &TelemetrySink, session_id: &str, phase: &str, detail: &str) {
    if let Some(writer) = writer {
        writer.send(phase, detail);
    }
    telemetry.record_trace(session_id, phase, detail, 0);
}

/// Locate the first balanced top-level `{...}` object in `text`, tolerating
/// surrounding prose and markdown code fences, and parse it.
fn extract_json_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&text[start..=i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// `tool_name + canonical(parameters)`, hashed. `serde_json`'s default `Map`
/// is a `BTreeMap` (the `preserve_order` feature is off), so `to_string`
/// already serializes object keys in sorted order — this is the canonical
/// form the loop-detection signature needs without any extra normalization.
fn loop_signature(tool_name: &str, parameters: &Value) -> String {
    let canonical = serde_json::to_string(parameters).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn build_system_prompt(project_id: &str, manifest: &str, user_query: &str, context: &str, monologue: &str) -> String {
    format!(
        "ROLE: autonomous coding agent operating on project '{project_id}'.\n\n\
         TOOLS:\n{manifest}\n\n\
         MISSION:\n{user_query}\n\n\
         PROTOCOL:\n\
         - Respond with exactly one JSON object: {{\"tool\": <name>, \"parameters\": {{...}}}}.\n\
         - Call FINAL_ANSWER once the answer is known.\n\
         - Do not repeat a call that already failed.\n\n\
         CONTEXT:\n{context}\n\n\
         MONOLOGUE:\n{monologue}\n"
    )
}

pub struct AgentExecutor {
    tools: ToolRegistry,
    gateway: Arc<ModelGateway>,
    telemetry: Arc<TelemetrySink>,
    context_provider: Arc<dyn ContextProvider>,
    max_iterations: u32,
}

impl AgentExecutor {
    pub fn new(
        tools: ToolRegistry,
        gateway: Arc<ModelGateway>,
        telemetry: Arc<TelemetrySink>,
        context_provider: Arc<dyn ContextProvider>,
    ) -> Self {
        Self { tools, gateway, telemetry, context_provider, max_iterations: DEFAULT_MAX_ITERATIONS }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run one mission to completion (FINAL_ANSWER or iteration-cap
    /// timeout), returning the final answer string. `outcome`, when given by
    /// the caller, marks the session successful or failed and is recorded
    /// as an Experience after loop exit (spec.md §4.11).
    pub async fn run(
        &self,
        user_query: &str,
        project_id: &str,
        session_id: &str,
        writer: Option<&dyn TraceWriter>,
        outcome: Option<bool>,
    ) -> String {
        let started = Instant::now();
        emit(writer, &self.telemetry, session_id, "STARTUP", "mission started");

        let snapshot = self.context_provider.build_snapshot(project_id, user_query).await;
        let packed_context = context::pack_default(&snapshot);
        let manifest = self.tools.manifest().to_string();

        let mut monologue = String::new();
        let mut seen_signatures: HashSet<String> = HashSet::new();
        let mut last_generate = GenerateResult::default();
        let mut final_output: Option<String> = None;

        for _ in 0..self.max_iterations {
            let prompt = build_system_prompt(project_id, &manifest, user_query, &packed_context, &monologue);
            let generated = self.gateway.generate(&prompt).await;
            if !generated.success {
                warn!(session_id, project_id, "model gateway call failed after retries");
                emit(writer, &self.telemetry, session_id, "ERROR", "model gateway call failed after retries");
                final_output = Some("ERROR: AI Service Failure".to_string());
                last_generate = generated;
                break;
            }
            emit(writer, &self.telemetry, session_id, "THOUGHT", &generated.text);
            last_generate = generated.clone();

            let Some(action) = extract_json_object(&generated.text) else {
                monologue.push_str("\nSYSTEM: no valid JSON action found; respond with exactly one JSON object.\n");
                continue;
            };
            let Some(tool_name) = action.get("tool").and_then(Value::as_str).map(str::to_string) else {
                monologue.push_str("\nSYSTEM: JSON action is missing a \"tool\" field.\n");
                continue;
            };
            let parameters = action.get("parameters").cloned().unwrap_or_else(|| json!({}));

            if tool_name == "FINAL_ANSWER" {
                let answer = parameters.get("answer").and_then(Value::as_str).unwrap_or_default().to_string();
                emit(writer, &self.telemetry, session_id, "FINAL", &answer);
                final_output = Some(answer);
                break;
            }

            let signature = loop_signature(&tool_name, &parameters);
            if !seen_signatures.insert(signature) {
                monologue.push_str(&format!(
                    "\nSYSTEM: you already called {tool_name} with these exact parameters and it did not resolve the mission; change your strategy.\n"
                ));
                continue;
            }

            let mut dispatch_args = parameters.clone();
            if let Value::Object(map) = &mut dispatch_args {
                map.insert("project_id".to_string(), Value::String(project_id.to_string()));
            }

            let observation = self.tools.dispatch(session_id, &tool_name, dispatch_args, &self.telemetry).await;
            monologue.push_str(&format!("\nStep: {tool_name} -> {observation}\n"));

            if tool_name == "read_file" && !observation.starts_with("ERROR") {
                let path = parameters.get("path").and_then(Value::as_str).unwrap_or_default();
                let symbols = cic_core::xray::xray(path, &observation);
                let detail = format!("[AST DATA: {} symbols detected]", symbols.len());
                emit(writer, &self.telemetry, session_id, "AST_SCAN", &detail);
                monologue.push_str(&detail);
                monologue.push('\n');
            }
        }

        let final_output = final_output.unwrap_or_else(|| {
            warn!(session_id, project_id, max_iterations = self.max_iterations, "mission hit the iteration cap");
            "Mission Timed Out.".to_string()
        });
        info!(session_id, project_id, elapsed_ms = started.elapsed().as_millis() as u64, "mission finished");

        self.telemetry.record_log(InteractionLog {
            project_id: project_id.to_string(),
            request_type: RequestType::Agent,
            user_query: user_query.to_string(),
            full_prompt: packed_context,
            model_reply: final_output.clone(),
            latency_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: last_generate.prompt_tokens,
            completion_tokens: last_generate.completion_tokens,
            total_tokens: last_generate.total_tokens,
        });

        if let Some(success) = outcome {
            self.context_provider.record_experience(project_id, user_query, &final_output, success).await;
        }

        final_output
    }
}

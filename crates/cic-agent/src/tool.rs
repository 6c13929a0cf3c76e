//! Tool Registry (C9)
//!
//! Tools are registered once at startup and never removed; the registry map
//! itself needs no lock because nothing mutates it after construction, only
//! the `project_id` passed into each call changes between dispatches.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::telemetry::TelemetrySink;

/// A single named capability exposed to the Agent Executor.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// A JSON-schema string describing the `parameters` object this tool
    /// expects, advertised verbatim in the manifest.
    fn parameters_schema(&self) -> &str;
    async fn execute(&self, args: Value) -> String;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// JSON array of `{name, description, parameters}` advertisements, one
    /// per registered tool, in registration order is not guaranteed (map
    /// iteration) — the Executor only needs the set, not an order.
    pub fn manifest(&self) -> Value {
        Value::Array(
            self.tools
                .values()
                .map(|t| {
                    json!({
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    })
                })
                .collect(),
        )
    }

    /// Dispatch `name` with `args`, emitting a TOOL_EXEC trace with duration
    /// to `telemetry` regardless of outcome.
    pub async fn dispatch(&self, session_id: &str, name: &str, args: Value, telemetry: &TelemetrySink) -> String {
        let started = Instant::now();
        let result = match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => {
                warn!(tool = name, "dispatch requested an unregistered tool");
                format!("ERROR: Tool '{name}' not found.")
            }
        };
        telemetry.record_trace(session_id, "TOOL_EXEC", name, started.elapsed().as_millis() as u64);
        result
    }
}

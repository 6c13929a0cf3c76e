//! Telemetry Sink (C14)
//!
//! Bounded in-memory rings of [`InteractionLog`] and [`AgentTrace`], written
//! by the Agent Executor (C12) and the Model Gateway's latency hook. Eviction
//! is FIFO once a ring reaches its configured capacity.

use std::collections::VecDeque;

use cic_search::gateway::LatencyObserver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Ghost,
    Agent,
    Chat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionLog {
    pub project_id: String,
    pub request_type: RequestType,
    pub user_query: String,
    pub full_prompt: String,
    pub model_reply: String,
    pub latency_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTrace {
    pub session_id: String,
    pub state: String,
    pub detail: String,
    pub duration_ms: u64,
}

pub struct TelemetrySink {
    logs: Mutex<VecDeque<InteractionLog>>,
    traces: Mutex<VecDeque<AgentTrace>>,
    capacity: usize,
}

impl TelemetrySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: Mutex::new(VecDeque::with_capacity(capacity)),
            traces: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record_log(&self, log: InteractionLog) {
        let mut logs = self.logs.lock();
        if logs.len() >= self.capacity {
            logs.pop_front();
        }
        logs.push_back(log);
    }

    /// Append a trace event. `session_id` is empty for events with no
    /// associated agent session (e.g. a bare gateway call).
    pub fn record_trace(&self, session_id: &str, state: &str, detail: &str, duration_ms: u64) {
        let mut traces = self.traces.lock();
        if traces.len() >= self.capacity {
            traces.pop_front();
        }
        traces.push_back(AgentTrace {
            session_id: session_id.to_string(),
            state: state.to_string(),
            detail: detail.to_string(),
            duration_ms,
        });
    }

    /// Full current ring, oldest first.
    pub fn logs_json(&self) -> Value {
        let logs: Vec<InteractionLog> = self.logs.lock().iter().cloned().collect();
        serde_json::to_value(logs).unwrap_or(Value::Array(Vec::new()))
    }

    /// Full current ring, oldest first.
    pub fn traces_json(&self) -> Value {
        let traces: Vec<AgentTrace> = self.traces.lock().iter().cloned().collect();
        serde_json::to_value(traces).unwrap_or(Value::Array(Vec::new()))
    }
}

impl LatencyObserver for TelemetrySink {
    /// A bare latency sample from a gateway call made outside an agent
    /// session (e.g. ghost-text autocomplete): recorded as a session-less
    /// trace event rather than a full InteractionLog.
    fn record(&self, operation: &str, millis: u64) {
        self.record_trace("", "GATEWAY_CALL", operation, millis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> InteractionLog {
        InteractionLog {
            project_id: "p1".into(),
            request_type: RequestType::Agent,
            user_query: "why does this fail".into(),
            full_prompt: "...".into(),
            model_reply: "...".into(),
            latency_ms: 10,
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
        }
    }

    #[test]
    fn rings_evict_oldest_past_capacity() {
        let sink = TelemetrySink::new(2);
        sink.record_log(sample_log());
        sink.record_log(sample_log());
        sink.record_log(sample_log());
        let logs = sink.logs_json();
        assert_eq!(logs.as_array().unwrap().len(), 2);
    }

    #[test]
    fn latency_observer_records_sessionless_trace() {
        let sink = TelemetrySink::new(10);
        sink.record("embed", 42);
        let traces = sink.traces_json();
        let arr = traces.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["session_id"], "");
        assert_eq!(arr[0]["state"], "GATEWAY_CALL");
    }
}

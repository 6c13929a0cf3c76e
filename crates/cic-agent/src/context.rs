//! Context Manager (C11)
//!
//! Packs a [`ContextSnapshot`] into the single prompt block sent to the
//! Model Gateway, in a fixed section order, truncating from the bottom when
//! the assembled text would exceed the configured ceiling.

const DEFAULT_CEILING_CHARS: usize = 100_000;
const HISTORY_TAIL_CHARS: usize = 3_000;

/// Transient assembly bundle handed to [`pack`] (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    /// Content of the top-ranked raw retrieval candidate, if retrieval
    /// produced one.
    pub focal_content: Option<String>,
    /// Rendered architectural map (`tree.txt`).
    pub project_topology: String,
    /// Recalled Experience strings, already formatted by the Experience
    /// Vault (`[SUCCESSFUL STRATEGY|FAILED ATTEMPT] ...`).
    pub experiences: Vec<String>,
    /// Full conversation so far; only the tail is packed.
    pub chat_history: String,
}

/// Last `limit` characters of `text`, on a char boundary.
fn tail(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    text.chars().rev().take(limit).collect::<Vec<_>>().into_iter().rev().collect()
}

/// Halve `text`, on a char boundary, for repeated shrink-on-overflow steps.
fn shrink(text: &str) -> String {
    let target = text.chars().count() / 2;
    if target == 0 {
        return String::new();
    }
    text.chars().take(target).collect()
}

fn assemble(focal: Option<&str>, topology: &str, experiences: &str, history: &str) -> String {
    let mut out = String::new();
    if let Some(focal) = focal {
        out.push_str("### FOCAL POINT\n");
        out.push_str(focal);
        out.push_str("\n\n");
    }
    out.push_str("### PROJECT TOPOLOGY\n");
    out.push_str(topology);
    out.push_str("\n\n");
    out.push_str("### PREVIOUS FIX\n");
    out.push_str(experiences);
    out.push_str("\n\n");
    out.push_str("### CHAT HISTORY\n");
    out.push_str(history);
    out
}

/// Pack `snapshot` under `ceiling` characters, used as a proxy for a token
/// budget. Truncates `### CHAT HISTORY` first, then `### PREVIOUS FIX`;
/// `### FOCAL POINT` and `### PROJECT TOPOLOGY` are never truncated or
/// removed, even if the result then exceeds `ceiling`.
pub fn pack(snapshot: &ContextSnapshot, ceiling: usize) -> String {
    let focal = snapshot.focal_content.as_deref();
    let mut experiences_body = snapshot.experiences.join("\n\n");
    let mut history_body = tail(&snapshot.chat_history, HISTORY_TAIL_CHARS);

    loop {
        let assembled = assemble(focal, &snapshot.project_topology, &experiences_body, &history_body);
        if assembled.len() <= ceiling {
            return assembled;
        }
        if !history_body.is_empty() {
            history_body = shrink(&history_body);
            continue;
        }
        if !experiences_body.is_empty() {
            experiences_body = shrink(&experiences_body);
            continue;
        }
        return assembled;
    }
}

/// [`pack`] with the spec's default ~100k-character ceiling.
pub fn pack_default(snapshot: &ContextSnapshot) -> String {
    pack(snapshot, DEFAULT_CEILING_CHARS)
}

//! Tool registry, atomic edit journal, context packer, and the autonomous
//! agent loop for the Code Intelligence Core.

pub mod context;
pub mod executor;
pub mod journal;
pub mod telemetry;
pub mod tool;
pub mod tools;

pub use context::{pack, pack_default, ContextSnapshot};
pub use executor::{AgentExecutor, ContextProvider, TraceWriter};
pub use telemetry::{AgentTrace, InteractionLog, RequestType, TelemetrySink};
pub use tool::{Tool, ToolRegistry};
pub use tools::{AnalyzeVisionTool, ApplyEditTool, FinalAnswerTool, ListDirTool, ProjectResolver, ReadFileTool, WebSearchTool};

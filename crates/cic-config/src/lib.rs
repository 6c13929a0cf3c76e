//! Per-project registration config for the Code Intelligence Core.
//!
//! Unlike the global/local TOML config an ordinary CLI tool merges at
//! startup, each project indexed by the core gets one `config.json`
//! registration payload living in its own storage directory (spec.md §6);
//! there's no global file and no merge order.

mod error;
mod project;

pub use error::ConfigError;
pub use project::ProjectConfig;

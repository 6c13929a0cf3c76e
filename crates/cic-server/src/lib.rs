//! Project registry, background sync worker pool, and HTTP surface for the
//! Code Intelligence Core.
//!
//! `cic-cli` is the only consumer: it builds an [`app::AppState`] and hands
//! [`routes::router`] to an axum server.

pub mod app;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod routes;
pub mod worker;

pub use app::AppState;
pub use error::ApiError;
pub use registry::{ProjectEntry, ProjectRegistry};
pub use routes::router;
pub use worker::{SyncJob, SyncWorkerPool};

//! HTTP-facing error type.
//!
//! Every handler returns `Result<Json<T>, ApiError>`; `ApiError` renders as a
//! `{"error": "<message>"}` body with a status code, matching spec.md §7's
//! propagation policy of never raising across the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("project '{0}' is not registered")]
    ProjectNotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("config error: {0}")]
    Config(#[from] cic_config::ConfigError),

    #[error("sync error: {0}")]
    Sync(#[from] cic_core::CoreError),

    #[error("search error: {0}")]
    Search(#[from] cic_search::SearchError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::ProjectNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Config(_) | ApiError::Sync(_) | ApiError::Search(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

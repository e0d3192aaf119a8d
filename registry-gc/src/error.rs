use std::io;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Failures talking to the registry's HTTP API.
#[derive(Error, Debug)]
pub enum RegistryError {
    // Connection refused, DNS, TLS, timeouts
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    // Non-success status, undecodable body or missing header
    #[error("protocol error: {0}")]
    Protocol(String),

    // The resource vanished between listing and use
    #[error("{0} not found")]
    NotFound(String),

    #[error("request cancelled")]
    Cancelled,
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Failures of the external garbage-collect operation.
#[derive(Error, Debug)]
pub enum ReclaimError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    // `status` is the rendered exit status, e.g. `exit status: 1`
    #[error("garbage-collect failed with {status}")]
    Failed { status: String, output: String },

    #[error("garbage-collect cancelled")]
    Cancelled,
}

impl ReclaimError {
    /// Diagnostic output captured from the child, if there was any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Failed { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }
}

/// Errors surfaced through the HTTP endpoints.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!("Rejecting request: {}", self);

        let (status_code, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };
        (status_code, axum::Json(json!({ "error": message }))).into_response()
    }
}

use crate::error::AppError;
use crate::utils::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;

/// The part of the registry notification envelope we care about.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub events: Option<Vec<Event>>,
}

#[derive(Debug, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub action: Option<String>,
}

impl Envelope {
    pub fn has_delete(&self) -> bool {
        self.events
            .iter()
            .flatten()
            .any(|event| event.action.as_deref() == Some("delete"))
    }
}

/// Handles `POST /events`.
///
/// The registry posts `application/vnd.docker.distribution.events.v1+json`,
/// so the body is decoded without looking at the content type. Any `delete`
/// event schedules a debounced GC; the response is `202 Accepted` either way.
pub async fn hook_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    // a `null` body decodes to no events
    let envelope: Option<Envelope> = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid notification envelope: {e}")))?;

    if envelope.is_some_and(|envelope| envelope.has_delete()) {
        state.coalescer.notify().await;
    }
    Ok(StatusCode::ACCEPTED)
}

use crate::utils::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;
use tracing::{Instrument, info_span};
use uuid::Uuid;

/// Handles `/gc`: starts a reclamation in the background and returns at once.
pub async fn gc_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let trigger = state.trigger.clone();
    let cancel = state.cancel.clone();
    let span = info_span!("manual_gc", run = %Uuid::new_v4());
    tokio::spawn(
        async move {
            trigger.run(&cancel).await;
        }
        .instrument(span),
    );
    (StatusCode::OK, "GC started")
}

/// Handles `/prune`: starts a prune + GC pass in the background.
pub async fn prune_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let orchestrator = state.orchestrator.clone();
    let cancel = state.cancel.clone();
    tokio::spawn(async move {
        orchestrator.prune(&cancel).await;
    });
    (StatusCode::OK, "prune+GC started")
}

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use crate::service::hook::hook_handler;
use crate::service::trigger::{gc_handler, prune_handler};
use crate::utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Registry notification webhook
        .route("/events", post(hook_handler))
        // Manual triggers
        .route("/gc", get(gc_handler).post(gc_handler))
        .route("/prune", get(prune_handler).post(prune_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

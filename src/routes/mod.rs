//! Route modules for Scan Ingest

pub mod health;
pub mod upload;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full HTTP application
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .merge(upload::router())
        .layer(DefaultBodyLimit::max(state.upload_max_bytes()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{backups, handlers, jobs, middleware::metrics_middleware, tracking};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Backups
        .route("/backups", get(backups::list_backups))
        .route("/backups/{name}", delete(backups::delete_backup))
        .route("/backups/{name}/release", post(backups::release_backup))
        // Jobs
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{book_name}", get(jobs::get_job))
        .route("/jobs/{book_name}/cancel", post(jobs::cancel_job))
        .route("/jobs/{book_name}/retry", post(jobs::retry_job))
        // Tracking
        .route("/tracking", get(tracking::list_tracking));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .nest("/api/v1", api_routes)
        .route_layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

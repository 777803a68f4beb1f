pub mod groups;
pub mod marketplace;
pub mod purchases;
pub mod seats;
pub mod stats;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(seats::routes())
        .merge(purchases::routes())
        .merge(marketplace::routes())
        .merge(groups::routes())
        .merge(stats::routes())
}

/// The full application: banner, health check and the `/api` tree.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Seat Inventory API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

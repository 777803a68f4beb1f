//! Inventory hygiene counters.
//!
//! `expiredReservations` counts holds past their expiry that no sweep has
//! removed yet; they never block anyone.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use std::sync::Arc;

use crate::error::InventoryError;
use crate::store::InventoryStats;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/stats", get(inventory_stats))
}

// GET /api/stats
async fn inventory_stats(State(state): State<Arc<AppState>>) -> Result<Json<InventoryStats>, InventoryError> {
    Ok(Json(state.inventory.stats(Utc::now()).await?))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::InventoryError;
use crate::middleware::AuthUser;
use crate::models::Reservation;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events/{event_id}/seats", get(seat_map))
        .route(
            "/events/{event_id}/reserve",
            get(my_reservations).post(reserve).delete(release),
        )
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    #[validate(length(min = 1, max = 50, message = "select between 1 and 50 seats"))]
    pub seat_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseResponse {
    released: u64,
}

// GET /api/events/{event_id}/seats
async fn seat_map(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
    user: Option<AuthUser>,
) -> Result<impl IntoResponse, InventoryError> {
    let map = state
        .availability
        .seat_map(event_id, user.map(|u| u.user_id))
        .await?;
    Ok(Json(map))
}

// POST /api/events/{event_id}/reserve
async fn reserve(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
    user: AuthUser,
    Json(req): Json<ReserveRequest>,
) -> Result<impl IntoResponse, InventoryError> {
    req.validate()?;
    let receipt = state
        .reservations
        .reserve(user.user_id, event_id, &req.seat_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

// DELETE /api/events/{event_id}/reserve
async fn release(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
    user: AuthUser,
) -> Result<impl IntoResponse, InventoryError> {
    let released = state.reservations.release(user.user_id, event_id).await?;
    Ok(Json(ReleaseResponse { released }))
}

// GET /api/events/{event_id}/reserve
async fn my_reservations(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
    user: AuthUser,
) -> Result<Json<Vec<Reservation>>, InventoryError> {
    Ok(Json(state.reservations.held(user.user_id, event_id).await?))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::InventoryError;
use crate::middleware::AuthUser;
use crate::models::{PaymentInfo, SavedPaymentMethod};
use crate::services::PurchaseView;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events/{event_id}/purchase", post(purchase))
        .route("/purchases", get(history))
        .route("/payment-methods", get(payment_methods))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    #[validate(length(min = 1, max = 50, message = "select between 1 and 50 seats"))]
    pub seat_ids: Vec<Uuid>,
    #[validate(nested)]
    pub payment_info: PaymentInfo,
}

// POST /api/events/{event_id}/purchase
async fn purchase(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
    user: AuthUser,
    Json(req): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, InventoryError> {
    req.validate()?;
    let receipt = state
        .purchases
        .purchase(user.user_id, event_id, &req.seat_ids, &req.payment_info)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

// GET /api/purchases
async fn history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<PurchaseView>>, InventoryError> {
    Ok(Json(state.purchases.history(user.user_id).await?))
}

// GET /api/payment-methods
async fn payment_methods(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<SavedPaymentMethod>>, InventoryError> {
    Ok(Json(state.purchases.payment_methods(user.user_id).await?))
}

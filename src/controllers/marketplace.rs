use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::InventoryError;
use crate::middleware::AuthUser;
use crate::models::{MarketplaceListing, PaymentInfo, Purchase};
use crate::services::ListingView;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/marketplace/listings", get(active_listings).post(list_for_sale))
        .route("/marketplace/listings/{listing_id}", delete(remove_listing))
        .route("/marketplace/purchase/{listing_id}", post(purchase_listing))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingsQuery {
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub event_id: Uuid,
    pub seat_id: Uuid,
    #[validate(range(exclusive_min = 0.0, message = "list price must be positive"))]
    pub list_price: f64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListingPurchaseRequest {
    #[validate(nested)]
    pub payment_info: PaymentInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingSale {
    listing: MarketplaceListing,
    purchase: Purchase,
}

// GET /api/marketplace/listings?eventId=
async fn active_listings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListingsQuery>,
) -> Result<Json<Vec<ListingView>>, InventoryError> {
    Ok(Json(state.purchases.active_listings(query.event_id).await?))
}

// POST /api/marketplace/listings
async fn list_for_sale(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<ListRequest>,
) -> Result<impl IntoResponse, InventoryError> {
    req.validate()?;
    let listing = state
        .purchases
        .list_for_sale(user.user_id, req.event_id, req.seat_id, req.list_price)
        .await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

// DELETE /api/marketplace/listings/{listing_id}
async fn remove_listing(
    State(state): State<Arc<AppState>>,
    Path(listing_id): Path<Uuid>,
    user: AuthUser,
) -> Result<Json<MarketplaceListing>, InventoryError> {
    Ok(Json(state.purchases.remove_listing(user.user_id, listing_id).await?))
}

// POST /api/marketplace/purchase/{listing_id}
async fn purchase_listing(
    State(state): State<Arc<AppState>>,
    Path(listing_id): Path<Uuid>,
    user: AuthUser,
    Json(req): Json<ListingPurchaseRequest>,
) -> Result<impl IntoResponse, InventoryError> {
    req.validate()?;
    let (listing, purchase) = state
        .purchases
        .purchase_listing(user.user_id, listing_id, &req.payment_info)
        .await?;
    Ok(Json(ListingSale { listing, purchase }))
}

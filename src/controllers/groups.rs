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
use crate::models::{GroupDetails, GroupMember, GroupPurchase, PaymentInfo};
use crate::services::NewGroup;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/groups", get(my_groups).post(create_group))
        .route("/groups/{group_id}", get(group_details))
        .route("/groups/{group_id}/invite", post(invite))
        .route("/groups/{group_id}/join", post(join))
        .route("/groups/{group_id}/payment", post(prepay))
        .route("/groups/{group_id}/purchase", post(purchase_for_group))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    #[validate(length(min = 1, message = "invite at least one user"))]
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PrepayRequest {
    #[validate(range(exclusive_min = 0.0, message = "amount must be positive"))]
    pub amount: f64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GroupPurchaseRequest {
    pub seat_ids: Vec<Uuid>,
    #[validate(nested)]
    pub payment_info: PaymentInfo,
}

// GET /api/groups
async fn my_groups(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<GroupPurchase>>, InventoryError> {
    Ok(Json(state.groups.groups_for(user.user_id).await?))
}

// POST /api/groups
async fn create_group(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<NewGroup>,
) -> Result<impl IntoResponse, InventoryError> {
    let group = state.groups.create(user.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

// GET /api/groups/{group_id}
async fn group_details(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<Uuid>,
    user: AuthUser,
) -> Result<Json<GroupDetails>, InventoryError> {
    Ok(Json(state.groups.details(group_id, user.user_id).await?))
}

// POST /api/groups/{group_id}/invite
async fn invite(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<Uuid>,
    user: AuthUser,
    Json(req): Json<InviteRequest>,
) -> Result<Json<GroupDetails>, InventoryError> {
    req.validate()?;
    Ok(Json(state.groups.invite(group_id, user.user_id, &req.user_ids).await?))
}

// POST /api/groups/{group_id}/join
async fn join(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<Uuid>,
    user: AuthUser,
) -> Result<Json<GroupMember>, InventoryError> {
    Ok(Json(state.groups.join(group_id, user.user_id).await?))
}

// POST /api/groups/{group_id}/payment
async fn prepay(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<Uuid>,
    user: AuthUser,
    Json(req): Json<PrepayRequest>,
) -> Result<Json<GroupDetails>, InventoryError> {
    req.validate()?;
    Ok(Json(state.groups.prepay(group_id, user.user_id, req.amount).await?))
}

// POST /api/groups/{group_id}/purchase
async fn purchase_for_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<Uuid>,
    user: AuthUser,
    Json(req): Json<GroupPurchaseRequest>,
) -> Result<impl IntoResponse, InventoryError> {
    req.validate()?;
    let receipt = state
        .groups
        .purchase_for_group(group_id, user.user_id, &req.seat_ids, &req.payment_info)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

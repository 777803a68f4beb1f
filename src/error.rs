use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Every failure a seat-mutating or seat-reading operation can report.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Missing or malformed input; resend after fixing it.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// Lost a race for one or more seats; refresh availability and pick again.
    #[error("{} seat(s) unavailable", .0.len())]
    SeatUnavailable(Vec<Uuid>),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("event is not on sale until {0}")]
    NotOnSaleYet(DateTime<Utc>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("group purchase needs exactly {expected} seats, got {actual}")]
    SeatCountMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type InventoryResult<T> = Result<T, InventoryError>;

impl From<validator::ValidationErrors> for InventoryError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let detail = errs
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .next()
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{field}: {detail}")
            })
            .collect();
        fields.sort();
        InventoryError::Validation(fields.join("; "))
    }
}

impl InventoryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InventoryError::Validation(_) | InventoryError::SeatCountMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            InventoryError::Auth(_) => StatusCode::UNAUTHORIZED,
            InventoryError::Forbidden(_) | InventoryError::NotOnSaleYet(_) => StatusCode::FORBIDDEN,
            InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
            InventoryError::SeatUnavailable(_) | InventoryError::Conflict(_) => StatusCode::CONFLICT,
            InventoryError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unavailable_seats: Option<Vec<Uuid>>,
}

impl IntoResponse for InventoryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            InventoryError::Database(e) => {
                tracing::error!("store error: {:?}", e);
                "Internal store error".to_string()
            }
            other => other.to_string(),
        };
        let unavailable_seats = match self {
            InventoryError::SeatUnavailable(seats) => Some(seats),
            _ => None,
        };

        let body = ApiError {
            success: false,
            message,
            unavailable_seats,
        };
        (status, Json(body)).into_response()
    }
}

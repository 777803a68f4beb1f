use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::InventoryError;
use crate::AppState;

/// Caller identity taken from an `Authorization: Bearer <jwt>` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

fn bearer_token(parts: &Parts) -> Option<Result<&str, InventoryError>> {
    let value = parts.headers.get(header::AUTHORIZATION)?;
    Some(
        value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| InventoryError::Auth("expected a bearer token".to_string())),
    )
}

fn authenticate(state: &AppState, token: &str) -> Result<AuthUser, InventoryError> {
    let identity = state.identity.verify(token)?;
    Ok(AuthUser {
        user_id: identity.user_id,
        email: identity.email,
    })
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = InventoryError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| InventoryError::Auth("missing Authorization header".to_string()))??;
        authenticate(state, token)
    }
}

// Anonymous callers get `None`; a present but bad credential is still rejected.
impl OptionalFromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = InventoryError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Option<Self>, Self::Rejection> {
        match bearer_token(parts) {
            None => Ok(None),
            Some(token) => authenticate(state, token?).map(Some),
        }
    }
}

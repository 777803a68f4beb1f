use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{InventoryError, InventoryResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub exp: usize,
}

/// The caller behind a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

pub trait IdentityProvider: Send + Sync {
    fn verify(&self, token: &str) -> InventoryResult<Identity>;
}

/// HS256 bearer tokens signed with a shared secret.
#[derive(Clone)]
pub struct JwtIdentity {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl JwtIdentity {
    pub fn new(secret: &str, expires_in_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            lifetime: Duration::hours(expires_in_hours),
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> InventoryResult<String> {
        let claims = Claims {
            user_id,
            email: email.to_string(),
            exp: (Utc::now() + self.lifetime).timestamp().max(0) as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| InventoryError::Auth(format!("could not issue token: {e}")))
    }
}

impl IdentityProvider for JwtIdentity {
    fn verify(&self, token: &str) -> InventoryResult<Identity> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| InventoryError::Auth(format!("invalid token: {e}")))?;
        Ok(Identity {
            user_id: data.claims.user_id,
            email: data.claims.email,
        })
    }
}

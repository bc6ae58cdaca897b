//! JWT session handling.
//!
//! Authenticated identity is carried as an explicit [`SessionContext`] and
//! passed into services as an argument; there is no ambient/global session
//! lookup.

use crate::{entities::AccountRole, errors::ServiceError, AppState};
use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: Uuid,
    pub role: AccountRole,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller identity for one request.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext {
    pub user_id: Uuid,
    pub role: AccountRole,
}

impl SessionContext {
    pub fn is_farmer(&self) -> bool {
        self.role == AccountRole::Farmer
    }

    pub fn is_buyer(&self) -> bool {
        self.role == AccountRole::Buyer
    }
}

impl From<Claims> for SessionContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
        }
    }
}

/// Issue a signed bearer token for an account.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    role: AccountRole,
    expires_in_secs: u64,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        role,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(expires_in_secs as i64)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {e}")))
}

/// Decode and validate a bearer token.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ServiceError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| ServiceError::AuthError(format!("invalid token: {e}")))
}

#[async_trait]
impl FromRequestParts<AppState> for SessionContext {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::AuthError("missing authorization header".to_string()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::AuthError("expected bearer token".to_string()))?;

        let claims = verify_token(&state.config.jwt_secret, token)?;
        Ok(claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_that_is_definitely_long_enough";

    #[test]
    fn token_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, AccountRole::Buyer, 3600).unwrap();
        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, AccountRole::Buyer);
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), AccountRole::Farmer, 3600).unwrap();
        assert!(verify_token("another_secret_also_long_enough_here", &token).is_err());
    }

    #[test]
    fn session_context_role_helpers() {
        let ctx = SessionContext {
            user_id: Uuid::new_v4(),
            role: AccountRole::Farmer,
        };
        assert!(ctx.is_farmer());
        assert!(!ctx.is_buyer());
    }
}

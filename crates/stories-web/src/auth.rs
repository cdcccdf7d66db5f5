//! Bearer-key authentication extractor.
//!
//! `Authorization: Bearer <key>` is resolved in two steps: an indexed
//! lookup by the SHA-256 hex of the raw token, then bcrypt verification
//! against the stored secret hash.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::state::AppState;
use stories::models::ApiKey;

/// The authenticated API key of the request.
pub struct AuthedKey(pub ApiKey);

#[async_trait]
impl FromRequestParts<AppState> for AuthedKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let lookup = stories::auth::lookup_hash(token);
        let key = state
            .api_keys
            .find_by_lookup_hash(&lookup)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        if !stories::auth::verify_token(token, &key.secret_hash) {
            return Err(ApiError::Unauthorized);
        }

        Ok(AuthedKey(key))
    }
}

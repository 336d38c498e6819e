//! Bearer token authentication
//!
//! Every study-docs route takes an [`AuthUser`]. The token is an opaque
//! string looked up in the `api_tokens` table; issuing and revoking tokens
//! happens out of band (`opositapp-docs issue-token <user_id>`).

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::db::TokenRepository;
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or(AppError::Unauthorized)?;

        let user_id = TokenRepository::new(state.db())
            .resolve(token)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Rejected unknown bearer token");
                AppError::Unauthorized
            })?;

        Ok(AuthUser { user_id })
    }
}

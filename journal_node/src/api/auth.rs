use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use log::debug;

use crate::api::{ApiError, AppState};
use crate::identity::parse_bearer_token;

/// Caller authenticated by a bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| ApiError::unauthorized("Invalid Authorization header format"))?,
            ),
            None => None,
        };

        let token = parse_bearer_token(header)?;
        let claims = state.keys.verify(token).map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            ApiError::from(e)
        })?;

        Ok(AuthUser {
            user_id: claims.user_id,
        })
    }
}

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::api::errors::{ApiError, ApiResponse, ApiResult, ValidationErrors};
use crate::api::validation::{normalize_email, validate_email, validate_password};
use crate::api::AppState;
use crate::identity::{hash_password, verify_password};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    /// Token expiry, RFC 3339
    pub expires_at: DateTime<Utc>,
}

/// Unwrap a JSON body, mapping any extractor rejection to a 400
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        warn!("Rejected request body: {}", rejection.body_text());
        ApiError::bad_request("Invalid input")
    })
}

/// Run CPU-heavy password work off the async executor
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> crate::identity::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::from(anyhow::anyhow!("password task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Create an account
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<RegisteredUser>>)> {
    let request = json_body(payload)?;
    let email = normalize_email(&request.email);

    let mut errors = ValidationErrors::new();
    if let Err(e) = validate_email(&email) {
        errors.extend(vec![e]);
    }
    errors.extend(validate_password(&request.password));
    errors.into_result()?;

    let password = request.password;
    let password_hash = blocking(move || hash_password(&password)).await?;
    let user = state.store.create_user(&email, &password_hash).await?;

    info!("Registered user {}", user.id);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "User registered successfully",
            RegisteredUser {
                id: user.id,
                email: user.email,
            },
        )),
    ))
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let request = json_body(payload)?;
    let email = normalize_email(&request.email);

    // Unknown email and wrong password are indistinguishable to the caller
    let Some(user) = state.store.find_user_by_email(&email).await? else {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    let password = request.password;
    let stored = user.password_hash.clone();
    let matches = blocking(move || verify_password(&password, &stored)).await?;
    if !matches {
        warn!("Failed login for user {}", user.id);
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let issued = state.keys.issue(user.id)?;
    info!("User {} logged in", user.id);

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

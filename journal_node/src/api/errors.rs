//! API error handling for the journal service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ai_services::AnalysisError;
use crate::identity::IdentityError;
use crate::storage::StorageError;

/// Error returned by every handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
    pub details: Option<serde_json::Value>,
    /// Field failures; switches the body to the validation shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationError>>,
    pub timestamp: i64,
}

impl ApiError {
    pub fn new(code: u16, message: String) -> Self {
        Self {
            code,
            message,
            details: None,
            errors: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_details(code: u16, message: String, details: serde_json::Value) -> Self {
        Self {
            code,
            message,
            details: Some(details),
            errors: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// 400 listing every failing field
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self {
            errors: Some(errors),
            ..Self::new(400, "Validation failed".to_string())
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(400, message.to_string())
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(401, message.to_string())
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(404, message.to_string())
    }

    pub fn conflict(message: &str) -> Self {
        Self::new(409, message.to_string())
    }

    pub fn too_many_requests(message: &str) -> Self {
        Self::new(429, message.to_string())
    }

    pub fn internal_server_error(message: &str) -> Self {
        Self::new(500, message.to_string())
    }

    pub fn bad_gateway(message: &str) -> Self {
        Self::new(502, message.to_string())
    }

    pub fn service_unavailable(message: &str) -> Self {
        Self::new(503, message.to_string())
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API Error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Wire shape of an error body
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    code: u16,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
struct ValidationBody<'a> {
    code: u16,
    message: &'a str,
    errors: &'a [ValidationError],
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Some(errors) = &self.errors {
            let body = ValidationBody {
                code: self.code,
                message: &self.message,
                errors,
            };
            return (self.status(), Json(body)).into_response();
        }

        let body = ErrorBody {
            success: false,
            code: self.code,
            error: &self.message,
            details: self.details.as_ref(),
            timestamp: self.timestamp,
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Success envelope shared by the account and journal endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
            error: None,
        }
    }

    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }
}

/// Validation error details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Multiple validation errors
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn extend(&mut self, errors: Vec<ValidationError>) {
        self.errors.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing failed, otherwise a 400 carrying every field error
    pub fn into_result(self) -> ApiResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.to_api_error())
        }
    }

    pub fn to_api_error(self) -> ApiError {
        ApiError::validation(self.errors)
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) => Self::conflict(&msg),
            StorageError::NotFound(msg) => Self::not_found(&msg),
            other => {
                error!("Storage failure: {}", other);
                Self::internal_server_error("Internal storage error")
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::MissingHeader => Self::unauthorized("Missing Authorization header"),
            IdentityError::MalformedHeader => {
                Self::unauthorized("Invalid Authorization header format")
            }
            IdentityError::InvalidToken(_) => Self::unauthorized("Invalid token"),
            other => {
                error!("Identity failure: {}", other);
                Self::internal_server_error("Internal error")
            }
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        Self::with_details(
            502,
            "Analysis service error".to_string(),
            serde_json::json!({ "reason": err.to_string() }),
        )
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("Unhandled error: {:#}", err);
        Self::internal_server_error("Internal error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::conflict("dup").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::too_many_requests("slow").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::new(999, "odd".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_errors_collect() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());
        errors.extend(vec![
            ValidationError::new("email", "Invalid email format"),
            ValidationError::new("password", "too short"),
        ]);

        let err = errors.into_result().unwrap_err();
        assert_eq!(err.code, 400);
        assert_eq!(err.message, "Validation failed");
        let fields: Vec<&str> = err.errors.as_ref().unwrap().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "password"]);
    }

    #[tokio::test]
    async fn test_validation_body_shape() {
        let response = ApiError::validation(vec![ValidationError::new("content", "required")]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "code": 400,
                "message": "Validation failed",
                "errors": [{ "field": "content", "message": "required" }]
            })
        );
    }

    #[test]
    fn test_storage_error_conversion_hides_internals() {
        let err: ApiError = StorageError::Database("password=secret".into()).into();
        assert_eq!(err.code, 500);
        assert!(!err.message.contains("secret"));

        let err: ApiError = StorageError::Conflict("Email already registered".into()).into();
        assert_eq!(err.code, 409);
    }

    #[test]
    fn test_identity_error_conversion() {
        let err: ApiError = IdentityError::MissingHeader.into();
        assert_eq!((err.code, err.message.as_str()), (401, "Missing Authorization header"));

        let err: ApiError = IdentityError::InvalidToken("expired".into()).into();
        assert_eq!((err.code, err.message.as_str()), (401, "Invalid token"));
    }
}

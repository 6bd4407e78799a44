use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use super::accounts::json_body;
use crate::api::auth::AuthUser;
use crate::api::errors::{ApiError, ApiResponse, ApiResult, ValidationErrors};
use crate::api::validation::{sanitize_input, validate_journal_content, validate_limit};
use crate::api::AppState;
use crate::storage::JournalEntry;

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct JournalRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JournalCreated {
    pub message: String,
    pub entry_id: i64,
    /// `None` when the analysis call failed; the entry is still stored
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
}

/// Store an entry, then ask the model about it
pub async fn create_entry(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<JournalRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JournalCreated>)> {
    let request = json_body(payload)?;
    let content = sanitize_input(&request.content);

    let mut errors = ValidationErrors::new();
    errors.extend(validate_journal_content(&content));
    errors.into_result()?;

    let entry = state.store.create_entry(user.user_id, &content).await?;
    info!("User {} created journal entry {}", user.user_id, entry.id);

    let (analysis, analysis_error) = match state.analyzer.analyze(user.user_id, &content).await {
        Ok(analysis) => {
            if let Err(e) = state.store.attach_analysis(entry.id, &analysis).await {
                error!("Failed to store analysis for entry {}: {}", entry.id, e);
            }
            (Some(analysis), None)
        }
        Err(e) => {
            warn!("Analysis failed for entry {}: {}", entry.id, e);
            (None, Some(e.to_string()))
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(JournalCreated {
            message: "Journal entry created successfully".to_string(),
            entry_id: entry.id,
            analysis,
            analysis_error,
        }),
    ))
}

/// The caller's entries, newest first
pub async fn list_entries(
    State(state): State<AppState>,
    user: AuthUser,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Vec<JournalEntry>>>> {
    let Query(params) = params.map_err(|_| ApiError::bad_request("Invalid input"))?;
    let limit = validate_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT).map_err(|e| {
        let mut errors = ValidationErrors::new();
        errors.extend(vec![e]);
        errors.to_api_error()
    })?;

    let entries = state.store.entries_for_user(user.user_id, limit).await?;
    Ok(Json(ApiResponse::data(entries)))
}

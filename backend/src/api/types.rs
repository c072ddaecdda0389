//! REST API response types.

use axum::{http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dataset::Dataset;
use crate::error::{PipelineError, ServerError};
use crate::models::{RowId, RowStatus, StatusCounts};
use crate::submit::RunReport;

/// Error half of every handler's return type.
pub type ApiError = (StatusCode, Json<Value>);

/// One row as shown in a UI table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowView {
    pub index: usize,
    pub row_id: RowId,
    /// Absolute index of the source row in the uploaded file.
    pub original_index: usize,
    pub status: RowStatus,
    /// Field name to value; unmapped fields are `null`.
    pub record: Value,
}

/// Current state of an import session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub imported_at: DateTime<Utc>,
    pub has_headers: bool,
    /// Keys usable as mapping sources.
    pub columns: Vec<String>,
    pub counts: StatusCounts,
    pub rows: Vec<RowView>,
}

impl SessionSnapshot {
    pub fn of(dataset: &Dataset) -> Self {
        let rows = dataset
            .tracker()
            .iter()
            .enumerate()
            .map(|(index, entry)| RowView {
                index,
                row_id: entry.id,
                original_index: entry.original_index,
                status: dataset.status_of(entry.id),
                record: dataset
                    .record_by_id(entry.id)
                    .map(|r| r.to_json())
                    .unwrap_or(Value::Null),
            })
            .collect();

        Self {
            session_id: dataset.id().to_string(),
            imported_at: dataset.imported_at(),
            has_headers: dataset.has_headers(),
            columns: dataset.table().column_keys(),
            counts: dataset.status_counts(),
            rows,
        }
    }
}

/// Response to `POST /api/import`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    /// Detected file encoding.
    pub encoding: String,
    #[serde(flatten)]
    pub session: SessionSnapshot,
}

/// Response to a submit or resubmit call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub report: RunReport,
    pub session: SessionSnapshot,
}

/// Error body.
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

pub fn api_error(status: StatusCode, message: impl AsRef<str>) -> ApiError {
    (status, Json(error_response(message.as_ref())))
}

impl From<ServerError> for (StatusCode, Json<Value>) {
    fn from(e: ServerError) -> Self {
        let status = match &e {
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Pipeline(PipelineError::RowOutOfRange { .. }) => StatusCode::NOT_FOUND,
            ServerError::Pipeline(PipelineError::RunInProgress) => StatusCode::CONFLICT,
            ServerError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Csv(_)
            | ServerError::Mapping(_)
            | ServerError::Pipeline(_)
            | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        api_error(status, e.to_string())
    }
}

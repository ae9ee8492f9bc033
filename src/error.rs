//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Steps of a rebuild, reported when a failure leaves metadata and physical schema apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolveStep {
    DropTable,
    ReplaceMetadata,
    CreateTable,
}

impl std::fmt::Display for EvolveStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EvolveStep::DropTable => "drop table",
            EvolveStep::ReplaceMetadata => "replace metadata",
            EvolveStep::CreateTable => "create table",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unresolved lookup on column '{column}': {reason}")]
    ReferenceResolution { column: String, reason: String },
    #[error("ddl execution failed for '{table}': {message}")]
    DdlExecution { table: String, message: String },
    #[error("metadata store: {0}")]
    Persistence(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("entity {entity_id} left inconsistent after {completed:?}; failed at {failed}: {source}")]
    InconsistentState {
        entity_id: i32,
        completed: Vec<EvolveStep>,
        failed: EvolveStep,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    pub fn ddl(table: &str, err: impl std::fmt::Display) -> Self {
        AppError::DdlExecution {
            table: table.to_string(),
            message: err.to_string(),
        }
    }

    /// Executor failures as `DdlExecution`; cancellation and timeouts pass through.
    pub fn into_ddl(self, table: &str) -> Self {
        match self {
            AppError::Cancelled | AppError::Timeout(_) | AppError::DdlExecution { .. } => self,
            other => AppError::ddl(table, other),
        }
    }

    fn code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::ReferenceResolution { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "reference_error"),
            AppError::DdlExecution { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "ddl_error"),
            AppError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AppError::InconsistentState { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "inconsistent_state"),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.code();
        let details = match &self {
            AppError::InconsistentState {
                entity_id,
                completed,
                failed,
                ..
            } => Some(serde_json::json!({
                "entity_id": entity_id,
                "completed": completed,
                "failed": failed,
            })),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;
use uuid::Uuid;

use crate::search::SearchError;

/// Per-event failures on the synchronous dispatch path. Every variant ends
/// up as a dead-letter entry (or, for admin retries, as the HTTP error).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unknown entity_type={0}")]
    UnknownEntityType(String),

    #[error("{kind} {id} not found in primary store")]
    EntityMissing { kind: &'static str, id: Uuid },

    /// Malformed stored JSON. Permanent: retrying cannot help until the
    /// source row is fixed.
    #[error("projection failed: {0}")]
    Projection(#[source] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] SearchError),

    #[error("invalid entity id {0:?}: {1}")]
    InvalidEntityId(String, #[source] uuid::Error),
}

/// Errors surfaced by the admin HTTP surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Sync(#[from] SyncError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Serialization(_) | AppError::Sync(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }))
    }
}

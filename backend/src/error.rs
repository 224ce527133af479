use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::auth::SessionError;
use crate::classifier::ClassifierError;
use crate::detection::DetectionError;
use crate::history::{HistoryStoreError, ReconcileError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotAuthenticated(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Busy(String),
    #[error("{0}")]
    UndoExpired(String),
    #[error("History store error: {0}")]
    Store(String),
    #[error("Classification service error: {0}")]
    Classifier(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn category(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "Validation error",
            ApiError::NotAuthenticated(_) => "Not authenticated",
            ApiError::NotFound(_) => "Not found",
            ApiError::Busy(_) => "Operation pending",
            ApiError::UndoExpired(_) => "Undo expired",
            ApiError::Store(_) => "History store error",
            ApiError::Classifier(_) => "Classification service error",
            ApiError::Internal(_) => "Internal error",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Busy(_) => StatusCode::CONFLICT,
            ApiError::UndoExpired(_) => StatusCode::GONE,
            ApiError::Store(_) => StatusCode::BAD_GATEWAY,
            ApiError::Classifier(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.category(),
            "message": self.to_string()
        }))
    }
}

impl From<ClassifierError> for ApiError {
    fn from(e: ClassifierError) -> Self {
        ApiError::Classifier(e.to_string())
    }
}

impl From<HistoryStoreError> for ApiError {
    fn from(e: HistoryStoreError) -> Self {
        ApiError::Store(e.to_string())
    }
}

impl From<ReconcileError> for ApiError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::NotFound(_) => ApiError::NotFound(e.to_string()),
            ReconcileError::Busy(_) => ApiError::Busy(e.to_string()),
            ReconcileError::UndoExpired(_) => ApiError::UndoExpired(e.to_string()),
            ReconcileError::Store(inner) => inner.into(),
        }
    }
}

impl From<DetectionError> for ApiError {
    fn from(e: DetectionError) -> Self {
        match e {
            DetectionError::Classifier(inner) => inner.into(),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotConfigured => ApiError::Internal(e.to_string()),
            other => ApiError::NotAuthenticated(other.to_string()),
        }
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::session::Stage;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AppError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("email {0} is already registered")]
    DuplicateEmail(String),

    #[error("{0}")]
    Authentication(String),

    #[error("invalid verification code")]
    CodeMismatch,

    #[error("{operation} service unavailable, please retry")]
    CollaboratorUnavailable { operation: &'static str },

    #[error("another request is already in progress")]
    Busy,

    #[error("operation requires the {expected} stage, session is at {actual}")]
    InvalidStage { expected: Stage, actual: Stage },

    #[error("login required")]
    Unauthenticated,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::DuplicateEmail(_) => StatusCode::CONFLICT,
            AppError::Authentication(_) | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::CodeMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::CollaboratorUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Busy | AppError::InvalidStage { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = json!({
            "error": self.to_string()
        });
        if let AppError::Validation { field, .. } = &self {
            body["field"] = json!(field);
        }

        (status, Json(body)).into_response()
    }
}

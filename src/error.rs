//! Error types for the HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ocr::OcrError;
use crate::pages::ExtractionError;

/// Handler result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    /// Rejected OCR option overrides
    #[error(transparent)]
    Options(#[from] OcrError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Options(e) => e.status_code(),
            AppError::Extraction(e) => {
                tracing::error!("Extraction failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

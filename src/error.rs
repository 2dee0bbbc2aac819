use crate::triage::{TriageError, ValidationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types.
///
/// Everything that reaches an HTTP client goes through this enum, so variants
/// carry caller-safe text only. Provider error bodies are logged where they
/// occur and never copied in here.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or empty input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Classification could not be produced; no safe fallback exists
    #[error("ClassificationUnavailable: {0}")]
    ClassificationUnavailable(String),

    /// Aggregate request deadline exceeded
    #[error("PipelineTimeout: {0}")]
    PipelineTimeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ClassificationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::PipelineTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ClassificationUnavailable(_) => "CLASSIFICATION_UNAVAILABLE",
            AppError::PipelineTimeout(_) => "PIPELINE_TIMEOUT",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Convert AppError to HTTP response.
///
/// The body is `{ "detail": ..., "code": ... }`; browser clients read `detail`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code().to_string();
        let detail = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                error_code = %error_code,
                status_code = status.as_u16(),
                detail = %detail,
                "Request error"
            );
        } else {
            tracing::warn!(
                error_code = %error_code,
                status_code = status.as_u16(),
                detail = %detail,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "detail": detail,
            "code": error_code,
        }));

        (status, body).into_response()
    }
}

impl From<TriageError> for AppError {
    fn from(err: TriageError) -> Self {
        match err {
            TriageError::Validation(e) => AppError::Validation(e.to_string()),
            TriageError::ClassificationUnavailable { .. } => {
                AppError::ClassificationUnavailable(err.detail())
            }
            TriageError::PipelineTimeout(_) => AppError::PipelineTimeout(err.detail()),
            TriageError::InvalidStateTransition { .. } => AppError::Internal(err.to_string()),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
///
/// Only field names and rule codes are reported; submitted values never reach
/// the response body.
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = err
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let codes: Vec<String> = errors.iter().map(|e| e.code.to_string()).collect();
                format!("{} ({})", field, codes.join(", "))
            })
            .collect();
        fields.sort();

        AppError::Validation(format!("invalid field(s): {}", fields.join("; ")))
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

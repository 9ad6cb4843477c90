//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use veriquick_core::VeriquickError;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unprocessable - well-formed input that yields no usable result
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable - required service is not configured or available
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Error raised by the intake or decode pipeline
    #[error("Veriquick error: {0}")]
    Veriquick(#[from] VeriquickError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create an unprocessable entity error
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::Unprocessable(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Veriquick(ref e) => match e {
                // Nothing usable came out of the request → 422
                VeriquickError::EmptyManifest
                | VeriquickError::MalformedPayload(_)
                | VeriquickError::PayloadTooLarge { .. } => StatusCode::UNPROCESSABLE_ENTITY,

                // Client-provided invalid input → 400
                VeriquickError::Image(_) | VeriquickError::ExtractionFailure(_) => {
                    StatusCode::BAD_REQUEST
                }

                // Storage backend failures → 503
                VeriquickError::UploadFailure { .. }
                | VeriquickError::AuthExpired(_)
                | VeriquickError::RefreshFailed(_)
                | VeriquickError::Storage(_)
                | VeriquickError::HttpError(_) => StatusCode::SERVICE_UNAVAILABLE,

                VeriquickError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Unprocessable(_) => "UNPROCESSABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Veriquick(ref e) => match e {
                VeriquickError::EmptyManifest => "EMPTY_MANIFEST",
                VeriquickError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
                VeriquickError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
                VeriquickError::Image(_) => "INVALID_IMAGE",
                VeriquickError::ExtractionFailure(_) => "EXTRACTION_FAILED",
                VeriquickError::UploadFailure { .. } => "UPLOAD_FAILED",
                VeriquickError::AuthExpired(_) | VeriquickError::RefreshFailed(_) => {
                    "STORAGE_AUTH_ERROR"
                }
                VeriquickError::Storage(_) => "STORAGE_ERROR",
                VeriquickError::HttpError(_) => "UPSTREAM_ERROR",
                VeriquickError::SerializationError(_) => "SERIALIZATION_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            // Storage details may carry tokens or account paths
            Self::Veriquick(ref e) => match e {
                VeriquickError::UploadFailure { file, .. } => {
                    format!("Upload of '{}' failed", file)
                }
                VeriquickError::AuthExpired(_) | VeriquickError::RefreshFailed(_) => {
                    "Storage credentials rejected".to_string()
                }
                VeriquickError::Storage(_) | VeriquickError::HttpError(_) => {
                    "Storage service unavailable".to_string()
                }
                VeriquickError::SerializationError(_) => "Manifest serialization error".to_string(),
                _ => e.to_string(),
            },
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unprocessable(_) => "unprocessable",
            Self::Internal(_) => "internal",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Veriquick(_) => "veriquick",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                client_message = %client_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

use thiserror::Error;

use crate::barcode::EcLevel;

#[derive(Error, Debug)]
pub enum VeriquickError {
    #[error("Text extraction failed: {0}")]
    ExtractionFailure(String),

    #[error("Upload of '{file}' failed: {reason}")]
    UploadFailure { file: String, reason: String },

    #[error("Storage credential expired: {0}")]
    AuthExpired(String),

    #[error("Credential refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Payload of {size} bytes exceeds QR capacity of {max} bytes at level {level}; split the batch")]
    PayloadTooLarge {
        size: usize,
        max: usize,
        level: EcLevel,
    },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Empty manifest: no file was classified and uploaded")]
    EmptyManifest,

    #[error("Image error: {0}")]
    Image(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[cfg(feature = "network")]
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, VeriquickError>;

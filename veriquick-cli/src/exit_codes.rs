//! Exit codes following sysexits.h conventions.
//!
//! Scripts can tell a missing input apart from an unreadable barcode or an
//! unreachable storage backend.

use veriquick_core::VeriquickError;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format error (no symbol, malformed payload, payload too large).
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Storage backend unavailable.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const STORAGE_UNAVAILABLE: i32 = 69;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let code = match err.chain().find_map(|e| e.downcast_ref::<VeriquickError>()) {
            Some(core) => Self::for_core_error(core),
            None => Self::for_message(&message),
        };

        Self {
            code,
            message: Some(message),
        }
    }

    fn for_core_error(err: &VeriquickError) -> i32 {
        match err {
            VeriquickError::PayloadTooLarge { .. }
            | VeriquickError::MalformedPayload(_)
            | VeriquickError::EmptyManifest
            | VeriquickError::Image(_)
            | VeriquickError::ExtractionFailure(_)
            | VeriquickError::SerializationError(_) => DATA_ERROR,
            VeriquickError::UploadFailure { .. }
            | VeriquickError::AuthExpired(_)
            | VeriquickError::RefreshFailed(_)
            | VeriquickError::Storage(_)
            | VeriquickError::HttpError(_) => STORAGE_UNAVAILABLE,
        }
    }

    fn for_message(message: &str) -> i32 {
        if message.contains("Failed to read") || message.contains("No input files") {
            INPUT_ERROR
        } else if message.contains("No barcode found") {
            DATA_ERROR
        } else if message.contains("Failed to write") || message.contains("Failed to create") {
            IO_ERROR
        } else if message.contains("Invalid argument") {
            USAGE_ERROR
        } else {
            GENERAL_ERROR
        }
    }
}

//! Upload validation module
//!
//! Checks for the decode endpoint. Intake uploads are checked by the
//! pipeline itself, which reports rejects as warnings instead of failing.

use crate::error::ApiError;

/// MIME types the decoder can read
const ALLOWED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "application/octet-stream"];

/// Validates the Content-Type of an image sent for decoding
///
/// Accepts PNG, JPEG and untyped binary. A missing Content-Type is treated
/// as binary.
pub fn validate_image_content_type(content_type: Option<&str>) -> Result<(), ApiError> {
    match content_type {
        Some(ct) => {
            let essence = ct.split(';').next().unwrap_or("").trim().to_lowercase();
            if ALLOWED_IMAGE_TYPES.contains(&essence.as_str()) {
                Ok(())
            } else {
                Err(ApiError::bad_request(format!(
                    "Unsupported Content-Type: '{}'. Allowed types: image/png, image/jpeg, application/octet-stream",
                    ct
                )))
            }
        }
        None => Ok(()),
    }
}

/// Validates the size of an uploaded file
pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ApiError> {
    if size > max_size {
        let max_mb = max_size / (1024 * 1024);
        let actual_mb = size / (1024 * 1024);
        Err(ApiError::bad_request(format!(
            "File too large: {} MB exceeds maximum of {} MB",
            actual_mb, max_mb
        )))
    } else if size == 0 {
        Err(ApiError::bad_request("File is empty"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_image_content_type() {
        assert!(validate_image_content_type(Some("image/png")).is_ok());
        assert!(validate_image_content_type(Some("IMAGE/JPEG")).is_ok());
        assert!(validate_image_content_type(Some("application/octet-stream")).is_ok());
        assert!(validate_image_content_type(None).is_ok());
    }

    #[test]
    fn test_validate_image_content_type_rejected() {
        assert!(validate_image_content_type(Some("application/pdf")).is_err());
        assert!(validate_image_content_type(Some("text/html")).is_err());
        assert!(validate_image_content_type(Some("image/webp")).is_err());
    }

    #[test]
    fn test_validate_file_size() {
        let max = 10 * 1024 * 1024;
        assert!(validate_file_size(1024, max).is_ok());
        assert!(validate_file_size(max, max).is_ok());
        assert!(validate_file_size(max + 1, max).is_err());
        assert!(validate_file_size(0, max).is_err());
    }
}

//! Multipart form parsing helpers
//!
//! Collects every `file` field of a multipart/form-data request so handlers
//! can work on plain values. Parts under any other name are skipped.

use axum::extract::Multipart;
use tracing::debug;
use veriquick_core::UploadedFile;

use crate::error::ApiError;
use crate::validation::{validate_file_size, validate_image_content_type};

/// Represents a file uploaded via multipart form
#[derive(Debug, Clone)]
pub struct FileField {
    /// File data bytes
    pub data: Vec<u8>,
    /// Content-Type from the multipart field (if provided)
    pub content_type: Option<String>,
    /// Original filename from the multipart field (if provided)
    pub file_name: Option<String>,
}

impl FileField {
    /// Convert into the pipeline's upload type.
    ///
    /// Unnamed parts get a positional name so warnings can still point at them.
    pub fn into_upload(self, index: usize) -> UploadedFile {
        let name = self
            .file_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("file-{}", index + 1));
        let upload = UploadedFile::new(name, self.data);
        match self.content_type {
            Some(ct) => upload.with_content_type(ct),
            None => upload,
        }
    }
}

/// How strictly file parts are checked while parsing.
#[derive(Debug, Clone, Copy)]
pub enum FileCheck {
    /// Keep every part; the intake pipeline reports rejects as warnings
    Lenient,
    /// Require an image Content-Type and enforce the size limit
    Image { max_file_size: usize },
}

/// Parsed multipart form fields
#[derive(Debug, Default)]
pub struct MultipartFields {
    /// File fields named "file", in upload order
    files: Vec<FileField>,
}

impl MultipartFields {
    /// Parse all fields from a multipart request
    pub async fn parse(multipart: &mut Multipart, check: FileCheck) -> Result<Self, ApiError> {
        let mut fields = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to parse multipart: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name != "file" {
                debug!(field = %name, "Skipping non-file multipart part");
                continue;
            }

            let content_type = field.content_type().map(|s| s.to_string());
            let file_name = field.file_name().map(|s| s.to_string());

            if let FileCheck::Image { .. } = check {
                validate_image_content_type(content_type.as_deref())?;
            }

            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?
                .to_vec();

            if let FileCheck::Image { max_file_size } = check {
                validate_file_size(data.len(), max_file_size)?;
            }

            fields.files.push(FileField {
                data,
                content_type,
                file_name,
            });
        }

        Ok(fields)
    }

    /// Take all uploaded files (at least one)
    pub fn require_files(self) -> Result<Vec<FileField>, ApiError> {
        if self.files.is_empty() {
            return Err(ApiError::bad_request(
                "No file provided. Use 'file' field in multipart form.",
            ));
        }
        Ok(self.files)
    }

    /// Take the first uploaded file
    pub fn require_file(self) -> Result<FileField, ApiError> {
        self.require_files()?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::bad_request("No file provided"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: Option<&str>) -> FileField {
        FileField {
            data: b"x".to_vec(),
            content_type: Some("image/png".into()),
            file_name: name.map(String::from),
        }
    }

    #[test]
    fn test_require_files_missing() {
        assert!(MultipartFields::default().require_files().is_err());
        assert!(MultipartFields::default().require_file().is_err());
    }

    #[test]
    fn test_require_file_takes_first() {
        let fields = MultipartFields {
            files: vec![file(Some("a.png")), file(Some("b.png"))],
        };
        assert_eq!(fields.require_file().unwrap().file_name.as_deref(), Some("a.png"));
    }

    #[test]
    fn test_into_upload_names_unnamed_parts() {
        let upload = file(None).into_upload(2);
        assert_eq!(upload.name, "file-3");
        assert_eq!(upload.content_type.as_deref(), Some("image/png"));

        assert_eq!(file(Some("pan.png")).into_upload(0).name, "pan.png");
    }
}

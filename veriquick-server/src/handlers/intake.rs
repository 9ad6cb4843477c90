//! Batch intake handler
//!
//! Handles POST /intake: store every uploaded document, classify it, and
//! return the manifest rendered as one QR symbol.

use axum::{
    extract::{Multipart, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use veriquick_core::{FileWarning, IntakeReport, Manifest, UploadedFile};

use crate::error::ApiError;
use crate::multipart::{FileCheck, MultipartFields};
use crate::state::AppState;

/// Response body selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IntakeFormat {
    /// JSON with the PNG inlined as base64
    #[default]
    Json,
    /// The PNG itself, as a download
    Png,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IntakeQuery {
    /// `json` (default) or `png`
    #[serde(default)]
    pub format: IntakeFormat,
}

/// A file left out of the manifest
#[derive(Debug, Serialize, ToSchema)]
pub struct WarningEntry {
    #[schema(example = "notes.docx")]
    pub file: String,
    #[schema(example = "unsupported file type; accepted: pdf, jpeg, jpg, png")]
    pub reason: String,
}

impl From<FileWarning> for WarningEntry {
    fn from(w: FileWarning) -> Self {
        Self {
            file: w.file,
            reason: w.reason,
        }
    }
}

/// Response for a processed batch
#[derive(Debug, Serialize, ToSchema)]
pub struct IntakeResponse {
    /// Batch identifier, also used in the PNG name
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub batch_id: String,
    /// Suggested download name for the QR image
    #[schema(example = "veriquick-550e8400-e29b-41d4-a716-446655440000.png")]
    pub png_filename: String,
    /// Base64-encoded PNG of the QR symbol
    pub png_base64: String,
    /// Exact text carried by the symbol
    pub payload: String,
    /// Records in upload order
    #[schema(value_type = Object)]
    pub manifest: Manifest,
    /// Number of records in the manifest
    pub document_count: usize,
    /// Files that were skipped
    pub warnings: Vec<WarningEntry>,
}

impl From<IntakeReport> for IntakeResponse {
    fn from(report: IntakeReport) -> Self {
        Self {
            batch_id: report.batch_id.to_string(),
            png_filename: report.png_filename(),
            png_base64: BASE64.encode(&report.png),
            document_count: report.manifest.len(),
            payload: report.payload,
            manifest: report.manifest,
            warnings: report.warnings.into_iter().map(WarningEntry::from).collect(),
        }
    }
}

/// Process a batch of identity documents
///
/// Accepts multipart/form-data with one or more **file** fields (PDF, JPEG
/// or PNG). Files of other kinds, empty files and files over the size
/// limit are skipped and listed in `warnings`. The batch fails only when
/// no file could be stored, or when the manifest does not fit one symbol.
#[utoipa::path(
    post,
    path = "/intake",
    tag = "Intake",
    params(IntakeQuery),
    request_body(
        content_type = "multipart/form-data",
        description = "Documents to store, one 'file' field each"
    ),
    responses(
        (status = 200, description = "Batch stored and encoded", body = IntakeResponse),
        (status = 400, description = "No file provided or malformed form"),
        (status = 422, description = "Nothing could be stored, or the manifest exceeds QR capacity"),
        (status = 503, description = "Storage backend unavailable")
    )
)]
pub async fn intake_handler(
    State(state): State<AppState>,
    Query(query): Query<IntakeQuery>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let files: Vec<UploadedFile> = MultipartFields::parse(&mut multipart, FileCheck::Lenient)
        .await?
        .require_files()?
        .into_iter()
        .enumerate()
        .map(|(i, f)| f.into_upload(i))
        .collect();

    let report = state.pipeline.process(files).await?;
    info!(
        batch_id = %report.batch_id,
        documents = report.manifest.len(),
        warnings = report.warnings.len(),
        "Intake batch complete"
    );

    Ok(match query.format {
        IntakeFormat::Json => Json(IntakeResponse::from(report)).into_response(),
        IntakeFormat::Png => {
            let disposition = format!("attachment; filename=\"{}\"", report.png_filename());
            (
                [
                    (header::CONTENT_TYPE, "image/png".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                report.png,
            )
                .into_response()
        }
    })
}

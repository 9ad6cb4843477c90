//! QR decode handler
//!
//! Handles POST /decode: read a manifest back from a photographed or saved
//! QR image.

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;
use veriquick_core::{Manifest, ManifestCodec};

use crate::error::ApiError;
use crate::multipart::{FileCheck, MultipartFields};
use crate::state::AppState;

/// Response for a decoded symbol
#[derive(Debug, Serialize, ToSchema)]
pub struct DecodeResponse {
    /// Raw text carried by the symbol
    pub payload: String,
    /// Parsed records
    #[schema(value_type = Object)]
    pub manifest: Manifest,
    /// Number of records in the manifest
    pub document_count: usize,
}

/// Decode a manifest from a QR image
///
/// Accepts multipart/form-data with a single **file** field (PNG or JPEG).
#[utoipa::path(
    post,
    path = "/decode",
    tag = "Decode",
    request_body(
        content_type = "multipart/form-data",
        description = "Image containing a Veriquick QR symbol"
    ),
    responses(
        (status = 200, description = "Manifest decoded", body = DecodeResponse),
        (status = 400, description = "Missing file, unsupported type or unreadable image"),
        (status = 422, description = "No symbol found, or the symbol is not a manifest")
    )
)]
pub async fn decode_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DecodeResponse>, ApiError> {
    let file = MultipartFields::parse(
        &mut multipart,
        FileCheck::Image {
            max_file_size: state.max_file_size,
        },
    )
    .await?
    .require_file()?;

    let barcode = state.barcode.clone();
    let payload = tokio::task::spawn_blocking(move || barcode.decode_bytes(&file.data))
        .await
        .map_err(|e| ApiError::internal(format!("Decode task failed: {}", e)))??
        .ok_or_else(|| ApiError::unprocessable("No barcode found in image"))?;
    debug!(bytes = payload.len(), "Decoded payload");

    let manifest = ManifestCodec::new().decode(&payload)?;

    Ok(Json(DecodeResponse {
        document_count: manifest.len(),
        payload,
        manifest,
    }))
}

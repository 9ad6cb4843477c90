//! Manifest <-> barcode payload serialization.
//!
//! The payload is compact UTF-8 JSON:
//!
//! ```text
//! {"files":[{"document_url":"...","document_type":"Aadhaar","aadhaar_numbers":["..."],"pan_numbers":[]}]}
//! ```
//!
//! Key order is fixed by the record's field order and empty identifier
//! lists are always written, so decoders see a stable schema.

use tracing::debug;

use crate::barcode::EcLevel;
use crate::error::{Result, VeriquickError};
use crate::manifest::Manifest;

/// Serializes manifests to payload text and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestCodec;

impl ManifestCodec {
    pub fn new() -> Self {
        Self
    }

    /// Deterministic compact JSON.
    pub fn encode(&self, manifest: &Manifest) -> Result<String> {
        serde_json::to_string(manifest)
            .map_err(|e| VeriquickError::SerializationError(e.to_string()))
    }

    /// Encode and check the result fits one QR symbol at `level`.
    pub fn encode_for_level(&self, manifest: &Manifest, level: EcLevel) -> Result<String> {
        let payload = self.encode(manifest)?;
        level.check_capacity(payload.len())?;
        Ok(payload)
    }

    /// Parse a payload. Unknown keys are ignored.
    pub fn decode(&self, payload: &str) -> Result<Manifest> {
        let manifest: Manifest = serde_json::from_str(payload).map_err(|e| {
            debug!(error = %e, "Payload is not a manifest");
            VeriquickError::MalformedPayload(e.to_string())
        })?;
        Ok(manifest)
    }
}

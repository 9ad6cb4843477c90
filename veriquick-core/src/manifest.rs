//! Manifest of processed documents for one upload batch.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classify::{Classification, DocumentType};
use crate::error::{Result, VeriquickError};

/// One classified and stored document.
///
/// Field order is the wire key order; `source_filename` stays local and is
/// never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Shared link returned by the storage backend
    #[serde(rename = "document_url")]
    pub storage_url: String,
    #[serde(default)]
    pub document_type: DocumentType,
    #[serde(default)]
    pub aadhaar_numbers: Vec<String>,
    #[serde(default)]
    pub pan_numbers: Vec<String>,
    #[serde(skip)]
    pub source_filename: String,
}

impl DocumentRecord {
    /// Identifiers in storage order, Aadhaar numbers first.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.aadhaar_numbers
            .iter()
            .chain(self.pan_numbers.iter())
            .map(String::as_str)
    }

    /// Equality on the fields that travel in a barcode payload.
    pub fn wire_eq(&self, other: &Self) -> bool {
        self.storage_url == other.storage_url
            && self.document_type == other.document_type
            && self.aadhaar_numbers == other.aadhaar_numbers
            && self.pan_numbers == other.pan_numbers
    }
}

/// Ordered records from one batch, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<DocumentRecord>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn wire_eq(&self, other: &Self) -> bool {
        self.files.len() == other.files.len()
            && self.files.iter().zip(&other.files).all(|(a, b)| a.wire_eq(b))
    }
}

/// Accumulates records for one batch.
///
/// Takes `&mut self`; concurrent producers hand their results to the single
/// owner, which adds them in upload order.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    files: Vec<DocumentRecord>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record for a stored, classified file.
    ///
    /// A blank `storage_url` means the upload did not produce a link; the
    /// file is left out and an `UploadFailure` is returned for reporting.
    pub fn add(
        &mut self,
        storage_url: impl Into<String>,
        classification: Classification,
        filename: impl Into<String>,
    ) -> Result<()> {
        let storage_url = storage_url.into();
        let filename = filename.into();

        if storage_url.trim().is_empty() {
            warn!(file = %filename, "No storage URL, excluding file from manifest");
            return Err(VeriquickError::UploadFailure {
                file: filename,
                reason: "no storage URL".into(),
            });
        }

        self.files.push(DocumentRecord {
            storage_url,
            document_type: classification.document_type,
            aadhaar_numbers: dedup(classification.aadhaar_numbers),
            pan_numbers: dedup(classification.pan_numbers),
            source_filename: filename,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Finish the batch. An empty manifest is never handed to the encoder.
    pub fn build(self) -> Result<Manifest> {
        if self.files.is_empty() {
            return Err(VeriquickError::EmptyManifest);
        }
        Ok(Manifest { files: self.files })
    }
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

//! Batch intake: validate, classify, store, manifest, encode.
//!
//! Each accepted file is extracted, classified and uploaded on its own task.
//! Results are slotted back by position, so the manifest follows upload
//! order regardless of completion order. A file that fails validation,
//! upload or a panic becomes a warning; only a batch with no stored file
//! at all is an error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::barcode::{BarcodeCodec, BarcodeOptions};
use crate::classify::{Classification, PatternClassifier};
use crate::codec::ManifestCodec;
use crate::error::{Result, VeriquickError};
use crate::extract::TextExtractor;
use crate::manifest::{Manifest, ManifestBuilder};
use crate::storage::{store_document, storage_path, DocumentStore};

/// Extensions the intake accepts, compared case-insensitively.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "jpeg", "jpg", "png"];

const ACCEPTED_CONTENT_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/jpg", "image/png"];

/// Default per-file size limit (25 MB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 25 * 1024 * 1024;

/// One file from an upload batch.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// `true` when the file name or its content type is one of the accepted
/// document kinds.
pub fn is_accepted(name: &str, content_type: Option<&str>) -> bool {
    let by_extension = extension(name).is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()));
    let by_type = content_type.is_some_and(|ct| {
        let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        ACCEPTED_CONTENT_TYPES.contains(&essence.as_str())
    });
    by_extension || by_type
}

/// Check one file against the accepted kinds and the size limit.
pub fn validate_upload(file: &UploadedFile, max_file_size: usize) -> std::result::Result<(), String> {
    if file.bytes.is_empty() {
        return Err("file is empty".into());
    }
    if file.bytes.len() > max_file_size {
        return Err(format!(
            "file is {} bytes, limit is {} bytes",
            file.bytes.len(),
            max_file_size
        ));
    }
    if !is_accepted(&file.name, file.content_type.as_deref()) {
        return Err(format!(
            "unsupported file type; accepted: {}",
            ACCEPTED_EXTENSIONS.join(", ")
        ));
    }
    Ok(())
}

/// Name of the PNG offered for download for a batch.
pub fn png_filename(batch_id: &Uuid) -> String {
    format!("veriquick-{batch_id}.png")
}

#[derive(Debug, Clone)]
pub struct IntakeOptions {
    pub barcode: BarcodeOptions,
    /// Storage folder uploads are placed in
    pub storage_root: String,
    pub max_file_size: usize,
}

impl Default for IntakeOptions {
    fn default() -> Self {
        Self {
            barcode: BarcodeOptions::default(),
            storage_root: String::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// A file left out of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWarning {
    pub file: String,
    pub reason: String,
}

/// Result of one intake batch.
#[derive(Debug, Clone)]
pub struct IntakeReport {
    pub batch_id: Uuid,
    pub manifest: Manifest,
    /// Serialized manifest carried by the barcode
    pub payload: String,
    pub png: Vec<u8>,
    pub warnings: Vec<FileWarning>,
}

impl IntakeReport {
    pub fn png_filename(&self) -> String {
        png_filename(&self.batch_id)
    }
}

type FileOutcome = Result<(String, Classification)>;

/// The write-side pipeline.
pub struct IntakePipeline {
    store: Arc<dyn DocumentStore>,
    options: IntakeOptions,
    codec: ManifestCodec,
    barcode: BarcodeCodec,
}

impl IntakePipeline {
    pub fn new(store: Arc<dyn DocumentStore>, options: IntakeOptions) -> Self {
        let barcode = BarcodeCodec::new(options.barcode);
        Self {
            store,
            options,
            codec: ManifestCodec::new(),
            barcode,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn options(&self) -> &IntakeOptions {
        &self.options
    }

    /// Process one batch end to end.
    ///
    /// Fails with `EmptyManifest` when no file could be stored, and with
    /// `PayloadTooLarge` when the manifest does not fit one symbol.
    pub async fn process(&self, files: Vec<UploadedFile>) -> Result<IntakeReport> {
        let batch_id = Uuid::new_v4();
        let start = Instant::now();
        info!(%batch_id, files = files.len(), backend = self.store.backend_name(), "Starting intake batch");

        let mut warnings = Vec::new();
        let mut accepted = Vec::new();
        for file in files {
            match validate_upload(&file, self.options.max_file_size) {
                Ok(()) => accepted.push(file),
                Err(reason) => {
                    warn!(file = %file.name, reason = %reason, "Rejected upload");
                    warnings.push(FileWarning {
                        file: file.name,
                        reason,
                    });
                }
            }
        }

        let paths = unique_paths(&self.options.storage_root, &accepted);
        let names: Vec<String> = accepted.iter().map(|f| f.name.clone()).collect();

        let mut tasks = JoinSet::new();
        for (index, (file, path)) in accepted.into_iter().zip(paths).enumerate() {
            let store = Arc::clone(&self.store);
            tasks.spawn(async move { (index, process_file(store, file, path).await) });
        }

        let mut outcomes: Vec<Option<FileOutcome>> = (0..names.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => warn!(error = %e, "Intake task aborted"),
            }
        }

        let mut builder = ManifestBuilder::new();
        for (name, outcome) in names.into_iter().zip(outcomes) {
            let added = match outcome {
                Some(Ok((url, classification))) => builder.add(url, classification, name.clone()),
                Some(Err(e)) => Err(e),
                None => Err(VeriquickError::UploadFailure {
                    file: name.clone(),
                    reason: "processing task aborted".into(),
                }),
            };
            if let Err(e) = added {
                warnings.push(FileWarning {
                    file: name,
                    reason: e.to_string(),
                });
            }
        }

        let manifest = builder.build().inspect_err(|_| {
            warn!(%batch_id, warnings = warnings.len(), "No file in the batch was stored");
        })?;
        let payload = self
            .codec
            .encode_for_level(&manifest, self.barcode.options().level)?;
        let png = self.barcode.encode_png(&payload)?;

        info!(
            %batch_id,
            records = manifest.len(),
            warnings = warnings.len(),
            payload_bytes = payload.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Intake batch complete"
        );

        Ok(IntakeReport {
            batch_id,
            manifest,
            payload,
            png,
            warnings,
        })
    }
}

/// Extract and classify off the async runtime, then upload.
async fn process_file(store: Arc<dyn DocumentStore>, file: UploadedFile, path: String) -> FileOutcome {
    let UploadedFile {
        name,
        bytes,
        content_type,
    } = file;
    let bytes = Arc::new(bytes);

    let classification = {
        let bytes = Arc::clone(&bytes);
        let name = name.clone();
        tokio::task::spawn_blocking(move || {
            let text = TextExtractor::new().extract(&bytes, content_type.as_deref());
            PatternClassifier::new().classify_with_filename(&text, &name)
        })
        .await
        .map_err(|e| VeriquickError::ExtractionFailure(format!("extraction task failed: {e}")))?
    };
    debug!(file = %name, document_type = %classification.document_type, "Classified");

    let url = store_document(store.as_ref(), &bytes, &path).await?;
    Ok((url, classification))
}

/// Storage paths for a batch; repeated names get a numeric suffix so one
/// upload does not overwrite another.
fn unique_paths(root: &str, files: &[UploadedFile]) -> Vec<String> {
    let mut used = HashSet::new();
    files
        .iter()
        .map(|file| {
            let base = storage_path(root, &file.name);
            let mut candidate = base.clone();
            let mut n = 1;
            while !used.insert(candidate.clone()) {
                candidate = match base.rsplit_once('.') {
                    Some((stem, ext)) if !stem.ends_with('/') => format!("{stem}-{n}.{ext}"),
                    _ => format!("{base}-{n}"),
                };
                n += 1;
            }
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::DocumentType;
    use crate::storage::MemoryStore;

    fn pipeline(store: Arc<MemoryStore>) -> IntakePipeline {
        IntakePipeline::new(store, IntakeOptions::default())
    }

    #[test]
    fn accepted_kinds() {
        assert!(is_accepted("scan.PDF", None));
        assert!(is_accepted("photo.jpeg", None));
        assert!(is_accepted("photo.JPG", None));
        assert!(is_accepted("blob", Some("image/png")));
        assert!(is_accepted("blob", Some("application/pdf; charset=binary")));
        assert!(!is_accepted("notes.txt", Some("text/plain")));
        assert!(!is_accepted(".pdf", None));
    }

    #[test]
    fn validate_rejects_empty_and_oversized() {
        let empty = UploadedFile::new("a.pdf", vec![]);
        assert!(validate_upload(&empty, 10).is_err());
        let big = UploadedFile::new("a.pdf", vec![0; 11]);
        assert!(validate_upload(&big, 10).unwrap_err().contains("limit"));
        let ok = UploadedFile::new("a.pdf", vec![0; 10]);
        assert!(validate_upload(&ok, 10).is_ok());
    }

    #[test]
    fn png_name_uses_batch_id() {
        let id = Uuid::nil();
        assert_eq!(
            png_filename(&id),
            "veriquick-00000000-0000-0000-0000-000000000000.png"
        );
    }

    #[test]
    fn repeated_names_get_distinct_paths() {
        let files = vec![
            UploadedFile::new("a.pdf", vec![1]),
            UploadedFile::new("dir/a.pdf", vec![2]),
            UploadedFile::new("b.png", vec![3]),
            UploadedFile::new("a.pdf", vec![4]),
        ];
        assert_eq!(
            unique_paths("", &files),
            vec!["/a.pdf", "/a-1.pdf", "/b.png", "/a-2.pdf"]
        );
    }

    #[tokio::test]
    async fn manifest_follows_upload_order() {
        let store = Arc::new(MemoryStore::new());
        let files = vec![
            UploadedFile::new("aadhaar.png", b"Name: X\n1234 5678 9123\n".to_vec()),
            UploadedFile::new("pan.jpg", b"ABCDE1234F".to_vec()),
            UploadedFile::new("result.pdf", b"CBSE Class 10 statement of marks".to_vec()),
        ];

        let report = pipeline(store.clone()).process(files).await.unwrap();
        let types: Vec<_> = report.manifest.files.iter().map(|r| r.document_type).collect();
        assert_eq!(
            types,
            vec![DocumentType::Aadhaar, DocumentType::Pan, DocumentType::Marksheet]
        );
        assert_eq!(report.manifest.files[0].storage_url, "memory:///aadhaar.png");
        assert_eq!(report.manifest.files[0].aadhaar_numbers, vec!["1234 5678 9123"]);
        assert!(report.warnings.is_empty());
        assert_eq!(store.len(), 3);
        assert!(report.png.starts_with(b"\x89PNG"));
        assert!(report.png_filename().starts_with("veriquick-"));
    }

    #[tokio::test]
    async fn failed_file_is_a_warning_not_an_abort() {
        let store = Arc::new(MemoryStore::new().fail_path("/bad.pdf"));
        let files = vec![
            UploadedFile::new("bad.pdf", b"1234 5678 9123".to_vec()),
            UploadedFile::new("notes.txt", b"hello".to_vec()),
            UploadedFile::new("good.png", b"ABCDE1234F".to_vec()),
        ];

        let report = pipeline(store).process(files).await.unwrap();
        assert_eq!(report.manifest.len(), 1);
        assert_eq!(report.manifest.files[0].storage_url, "memory:///good.png");
        let warned: Vec<_> = report.warnings.iter().map(|w| w.file.as_str()).collect();
        assert_eq!(warned.len(), 2);
        assert!(warned.contains(&"bad.pdf"));
        assert!(warned.contains(&"notes.txt"));
    }

    #[tokio::test]
    async fn empty_batch_is_an_error() {
        let store = Arc::new(MemoryStore::new().fail_path("/only.pdf"));
        let err = pipeline(store)
            .process(vec![UploadedFile::new("only.pdf", b"x".to_vec())])
            .await
            .unwrap_err();
        assert!(matches!(err, VeriquickError::EmptyManifest));
    }

    #[tokio::test]
    async fn filename_decides_for_scanned_image() {
        let store = Arc::new(MemoryStore::new());
        let scan = image::GrayImage::from_fn(200, 120, |x, y| image::Luma([((x + y) % 256) as u8]));
        let mut png = Vec::new();
        image::DynamicImage::ImageLuma8(scan)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let files = vec![UploadedFile::new("my_pan_card.png", png).with_content_type("image/png")];
        let report = pipeline(store).process(files).await.unwrap();
        let entry = &report.manifest.files[0];
        assert_eq!(entry.document_type, DocumentType::Pan);
        assert!(entry.pan_numbers.is_empty());
    }

    #[tokio::test]
    async fn payload_decodes_from_png() {
        let store = Arc::new(MemoryStore::new());
        let files = vec![UploadedFile::new("id.pdf", b"Name: X\n1234 5678 9123\n".to_vec())];
        let report = pipeline(store).process(files).await.unwrap();

        let decoded = BarcodeCodec::default().decode_bytes(&report.png).unwrap();
        assert_eq!(decoded.as_deref(), Some(report.payload.as_str()));
        let manifest = ManifestCodec::new().decode(&report.payload).unwrap();
        assert!(manifest.wire_eq(&report.manifest));
    }
}

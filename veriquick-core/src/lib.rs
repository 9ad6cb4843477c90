//! Veriquick Core - document intake and QR scan dispatch
//!
//! Uploaded identity documents are stored, classified by the identifiers
//! they carry, and summarized in a manifest that fits one QR symbol. The
//! scan side decodes such symbols from frames and routes every record to
//! automatic or manual verification.
//!
//! # Features
//!
//! - PDF text extraction per page (`lopdf`), lossy text for everything else
//! - Aadhaar / PAN / marksheet detection with a fixed precedence order
//! - Compact JSON manifest wire format
//! - QR encode (`qrcode`) and decode (`rqrr`) with explicit capacity checks
//! - Pluggable storage with single-flight credential refresh
//! - Latching scan dispatcher with injectable cues and link opener
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use veriquick_core::{IntakeOptions, IntakePipeline, MemoryStore, UploadedFile};
//!
//! # async fn example() -> veriquick_core::Result<()> {
//! let pipeline = IntakePipeline::new(Arc::new(MemoryStore::new()), IntakeOptions::default());
//! let report = pipeline
//!     .process(vec![UploadedFile::new("aadhaar.pdf", b"1234 5678 9123".to_vec())])
//!     .await?;
//!
//! std::fs::write(report.png_filename(), &report.png).ok();
//! # Ok(())
//! # }
//! ```

pub mod barcode;
pub mod classify;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod intake;
pub mod manifest;
pub mod scan;
pub mod storage;

// Re-export main types for convenience
pub use barcode::{BarcodeCodec, BarcodeOptions, EcLevel};
pub use classify::{
    AcceptAll, Classification, DocumentType, IdentifierValidator, PatternClassifier,
};
pub use codec::ManifestCodec;
pub use dispatch::{
    Cue, CuePlayer, DispatchOutcome, LinkOpener, RecordOutcome, ScanDispatcher, Verification,
    DEFAULT_LATCH_WINDOW,
};
pub use error::{Result, VeriquickError};
pub use extract::TextExtractor;
pub use intake::{
    FileWarning, IntakeOptions, IntakePipeline, IntakeReport, UploadedFile, ACCEPTED_EXTENSIONS,
    DEFAULT_MAX_FILE_SIZE,
};
pub use manifest::{DocumentRecord, Manifest, ManifestBuilder};
pub use scan::{run_scan_loop, FrameSource, ImageFileSource, ScanConfig, ScanSummary};
pub use storage::{CredentialStore, DocumentStore, MemoryStore};

#[cfg(feature = "network")]
pub use storage::{DropboxConfig, DropboxStore};

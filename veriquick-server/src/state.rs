//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use veriquick_core::{BarcodeCodec, DocumentStore, IntakeOptions, IntakePipeline, MemoryStore};

use crate::config::Config;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Intake pipeline bound to the configured storage backend
    pub pipeline: Arc<IntakePipeline>,
    /// Decoder for the /decode endpoint
    pub barcode: Arc<BarcodeCodec>,
    /// Per-file upload limit in bytes
    pub max_file_size: usize,
}

impl AppState {
    /// Build state around an existing store.
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        let options = IntakeOptions {
            barcode: config.barcode,
            storage_root: config.storage_root.clone(),
            max_file_size: config.max_file_size(),
        };
        Self {
            pipeline: Arc::new(IntakePipeline::new(store, options)),
            barcode: Arc::new(BarcodeCodec::new(config.barcode)),
            max_file_size: config.max_file_size(),
        }
    }

    /// State backed by an in-memory store.
    pub fn in_memory(config: &Config) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Name of the storage backend in use
    pub fn backend_name(&self) -> &'static str {
        self.pipeline.store().backend_name()
    }
}

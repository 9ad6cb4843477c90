//! Intake command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};
use veriquick_core::{
    BarcodeOptions, DocumentStore, DropboxConfig, DropboxStore, EcLevel, FileWarning,
    IntakeOptions, IntakePipeline, Manifest, MemoryStore, UploadedFile,
};

use crate::utils::{content_type_for, display_name, expand_inputs, print_json, read_file};
use crate::{OutputFormat, StorageBackend};

pub struct IntakeArgs {
    pub files: Vec<PathBuf>,
    pub output: PathBuf,
    pub storage: StorageBackend,
    pub root: String,
    pub ec_level: EcLevel,
    pub module_size: u32,
    pub border: u32,
}

#[derive(Serialize)]
struct IntakeOutput<'a> {
    batch_id: String,
    png: String,
    payload: &'a str,
    manifest: &'a Manifest,
    warnings: &'a [FileWarning],
}

/// Returns the store and its default upload folder.
fn build_store(backend: StorageBackend) -> Result<(Arc<dyn DocumentStore>, String)> {
    match backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; links are not shareable");
            Ok((Arc::new(MemoryStore::new()), String::new()))
        }
        StorageBackend::Dropbox => {
            let config = DropboxConfig::from_env().context("Dropbox storage is not configured")?;
            let store = DropboxStore::new(config)?;
            let root = store.root().to_string();
            Ok((Arc::new(store), root))
        }
    }
}

/// Execute the intake command.
pub async fn execute(args: IntakeArgs, format: OutputFormat, quiet: bool) -> Result<()> {
    let paths = expand_inputs(&args.files)?;

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let mut file = UploadedFile::new(display_name(path), read_file(path)?);
        if let Some(content_type) = content_type_for(path) {
            file = file.with_content_type(content_type);
        }
        files.push(file);
    }

    let (store, default_root) = build_store(args.storage)?;
    let options = IntakeOptions {
        barcode: BarcodeOptions {
            level: args.ec_level,
            module_size: args.module_size,
            border: args.border,
        },
        storage_root: if args.root.is_empty() {
            default_root
        } else {
            args.root
        },
        ..IntakeOptions::default()
    };

    let report = IntakePipeline::new(store, options)
        .process(files)
        .await
        .context("Intake failed")?;

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let png_path = args.output.join(report.png_filename());
    std::fs::write(&png_path, &report.png)
        .with_context(|| format!("Failed to write {}", png_path.display()))?;
    info!(path = %png_path.display(), "QR code saved");

    match format {
        OutputFormat::Json => print_json(&IntakeOutput {
            batch_id: report.batch_id.to_string(),
            png: png_path.display().to_string(),
            payload: &report.payload,
            manifest: &report.manifest,
            warnings: &report.warnings,
        })?,
        OutputFormat::Text if !quiet => {
            println!();
            println!("{}", "Batch stored and encoded".green().bold());
            println!();
            for record in &report.manifest.files {
                println!(
                    "   {} {} {}",
                    format!("[{}]", record.document_type).cyan(),
                    record.source_filename,
                    record.storage_url.dimmed()
                );
                for id in record.identifiers() {
                    println!("       {} {}", "id:".dimmed(), id);
                }
            }
            for warning in &report.warnings {
                println!(
                    "   {} {}: {}",
                    "skipped".yellow(),
                    warning.file,
                    warning.reason
                );
            }
            println!();
            println!("   {} {}", "QR code:".dimmed(), png_path.display());
            println!("   {} {} bytes", "Payload:".dimmed(), report.payload.len());
        }
        OutputFormat::Text => {}
    }

    Ok(())
}

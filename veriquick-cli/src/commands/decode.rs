//! Decode command implementation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::{debug, info};
use veriquick_core::{BarcodeCodec, ManifestCodec};

use crate::utils::{print_json, read_file};
use crate::OutputFormat;

/// Execute the decode command.
pub async fn execute(image: PathBuf, format: OutputFormat, quiet: bool) -> Result<()> {
    let bytes = read_file(&image)?;

    let payload = BarcodeCodec::default()
        .decode_bytes(&bytes)
        .with_context(|| format!("Failed to decode {}", image.display()))?;
    let Some(payload) = payload else {
        bail!("No barcode found in {}", image.display());
    };
    debug!(bytes = payload.len(), "Decoded payload");

    let manifest = ManifestCodec::new()
        .decode(&payload)
        .with_context(|| format!("Unrecognized code: {payload}"))?;
    info!(records = manifest.len(), "Decoded manifest");

    match format {
        OutputFormat::Json => print_json(&manifest)?,
        OutputFormat::Text if !quiet => {
            println!();
            println!(
                "{} {}",
                "Manifest with".green().bold(),
                format!("{} document(s)", manifest.len()).green().bold()
            );
            println!();
            for (i, record) in manifest.files.iter().enumerate() {
                println!(
                    "   {}. {} {}",
                    i + 1,
                    format!("[{}]", record.document_type).cyan(),
                    record.storage_url
                );
                for id in record.identifiers() {
                    println!("       {} {}", "id:".dimmed(), id);
                }
            }
        }
        OutputFormat::Text => {}
    }

    Ok(())
}

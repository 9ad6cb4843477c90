//! Classify command implementation.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;
use veriquick_core::{DocumentType, PatternClassifier, TextExtractor};

use crate::utils::{content_type_for, display_name, print_json, read_file};
use crate::OutputFormat;

#[derive(Serialize)]
struct ClassifyOutput {
    file: String,
    document_type: DocumentType,
    aadhaar_numbers: Vec<String>,
    pan_numbers: Vec<String>,
}

/// Execute the classify command.
pub async fn execute(file: PathBuf, format: OutputFormat, quiet: bool) -> Result<()> {
    let bytes = read_file(&file)?;
    let name = display_name(&file);

    let text = TextExtractor::new().extract(&bytes, content_type_for(&file));
    debug!(chars = text.len(), "Extracted text");
    let classification = PatternClassifier::new().classify_with_filename(&text, &name);

    match format {
        OutputFormat::Json => print_json(&ClassifyOutput {
            file: name,
            document_type: classification.document_type,
            aadhaar_numbers: classification.aadhaar_numbers,
            pan_numbers: classification.pan_numbers,
        })?,
        OutputFormat::Text if !quiet => {
            println!(
                "{} {}",
                format!("{name}:").bold(),
                classification.document_type.to_string().cyan()
            );
            for id in classification.identifiers() {
                println!("   {} {}", "id:".dimmed(), id);
            }
        }
        OutputFormat::Text => {}
    }

    Ok(())
}

//! Scan command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use colored::Colorize;
use tokio::sync::watch;
use tracing::{debug, info};
use veriquick_core::{
    run_scan_loop, BarcodeCodec, Cue, CuePlayer, ImageFileSource, LinkOpener, ScanConfig,
    ScanDispatcher,
};

use crate::utils::{expand_inputs, print_json};
use crate::OutputFormat;

/// Prints cues to the terminal.
struct ConsoleCues {
    quiet: bool,
}

impl CuePlayer for ConsoleCues {
    fn play(&self, cue: Cue) {
        debug!(?cue, "Cue");
        if self.quiet {
            return;
        }
        let line = match cue {
            Cue::AadhaarDetected => cue.message().green().bold(),
            Cue::ManualVerification => cue.message().yellow(),
            Cue::BatchComplete => cue.message().dimmed(),
            Cue::Unrecognized => cue.message().red(),
        };
        println!("{line}");
    }
}

/// Prints links instead of launching a browser.
struct ConsoleOpener {
    quiet: bool,
}

impl LinkOpener for ConsoleOpener {
    fn open(&self, url: &str) -> veriquick_core::Result<()> {
        info!(url, "Opening document");
        if !self.quiet {
            println!("   {} {}", "open:".dimmed(), url);
        }
        Ok(())
    }
}

/// Execute the scan command.
pub async fn execute(
    frames: Vec<PathBuf>,
    window_secs: u64,
    interval_ms: u64,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    if window_secs == 0 {
        bail!("Invalid argument: --window-secs must be at least 1");
    }
    let paths = expand_inputs(&frames)?;
    let source = ImageFileSource::from_paths(paths);

    let text_output = format == OutputFormat::Text && !quiet;
    let mut dispatcher = ScanDispatcher::new(
        Arc::new(ConsoleOpener { quiet: !text_output }),
        Arc::new(ConsoleCues { quiet: !text_output }),
    )
    .with_window(Duration::from_secs(window_secs));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping scanner");
            let _ = shutdown_tx.send(true);
        }
    });

    let config = ScanConfig {
        frame_interval: Duration::from_millis(interval_ms),
        ..ScanConfig::default()
    };
    let summary = run_scan_loop(
        Box::new(source),
        &mut dispatcher,
        Arc::new(BarcodeCodec::default()),
        config,
        shutdown_rx,
    )
    .await;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text if !quiet => {
            println!();
            println!(
                "   {} {} frames, {} dispatched, {} unrecognized, {} unreadable",
                "Scanned:".dimmed(),
                summary.frames,
                summary.dispatched,
                summary.unrecognized,
                summary.unreadable
            );
            if summary.timeouts > 0 {
                println!(
                    "   {} {} decodes timed out, {} frames skipped",
                    "Slow:".dimmed(),
                    summary.timeouts,
                    summary.skipped
                );
            }
        }
        OutputFormat::Text => {}
    }

    Ok(())
}

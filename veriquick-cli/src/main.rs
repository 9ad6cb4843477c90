//! Veriquick CLI - document intake and QR scanning tool.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use veriquick_core::EcLevel;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error
  65  Data error (no barcode, malformed payload, payload too large, nothing stored)
  66  Input file not found
  69  Storage unavailable
  74  I/O error writing output";

#[derive(Parser)]
#[command(name = "veriquick")]
#[command(author, version, about = "Document intake and QR scan verification", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress human-readable output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// In-process store (links are not shareable)
    Memory,
    /// Dropbox, configured from DROPBOX_* environment variables
    Dropbox,
}

#[derive(Subcommand)]
enum Commands {
    /// Store and classify documents, then write the batch QR code
    Intake {
        /// Documents to process (PDF, JPEG, JPG, PNG) or directories of them
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Directory the QR PNG is written to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Storage backend
        #[arg(long, value_enum, env = "VERIQUICK_STORAGE", default_value = "memory")]
        storage: StorageBackend,

        /// Folder inside the storage backend
        #[arg(long, env = "VERIQUICK_STORAGE_ROOT", default_value = "")]
        root: String,

        /// QR error-correction level (L, M, Q, H)
        #[arg(long, default_value = "L")]
        ec_level: EcLevel,

        /// Pixels per QR module
        #[arg(long, default_value_t = 10)]
        module_size: u32,

        /// Quiet-zone width in modules
        #[arg(long, default_value_t = 4)]
        border: u32,
    },

    /// Read a QR code from an image and print the manifest
    Decode {
        /// Image containing the code
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },

    /// Scan frames and route every decoded record
    Scan {
        /// Frame images, or directories of frames
        #[arg(value_name = "FRAMES", required = true)]
        frames: Vec<PathBuf>,

        /// Seconds a scanned code stays latched
        #[arg(long, default_value_t = 5)]
        window_secs: u64,

        /// Pause between frames in milliseconds
        #[arg(long, default_value_t = 30)]
        interval_ms: u64,
    },

    /// Classify a document locally without storing it
    Classify {
        /// Document to classify
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let quiet = cli.quiet;
    let format = cli.format;

    let result: Result<()> = match cli.command {
        Commands::Intake {
            files,
            output,
            storage,
            root,
            ec_level,
            module_size,
            border,
        } => {
            let args = commands::intake::IntakeArgs {
                files,
                output,
                storage,
                root,
                ec_level,
                module_size,
                border,
            };
            commands::intake::execute(args, format, quiet).await
        }
        Commands::Decode { image } => commands::decode::execute(image, format, quiet).await,
        Commands::Scan {
            frames,
            window_secs,
            interval_ms,
        } => commands::scan::execute(frames, window_secs, interval_ms, format, quiet).await,
        Commands::Classify { file } => commands::classify::execute(file, format, quiet).await,
    };

    if let Err(err) = result {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = exit.message {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}

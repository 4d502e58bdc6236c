//! Marquee CLI - Headless driver for the playback engine
//!
//! Features:
//! - Variant ladder inspection for HLS manifests
//! - Headless playback runs on a simulated clock, with transitions,
//!   recovery advisories and progress checkpoints printed as they happen

use anyhow::Context;
use clap::{Parser, Subcommand};
use marquee_core::EngineConfig;
use std::path::PathBuf;

mod commands;
mod headless;
mod output;

use output::OutputFormat;

/// Marquee CLI - Playback engine toolkit
#[derive(Parser)]
#[command(name = "marquee")]
#[command(version)]
#[command(about = "Inspect streams and drive headless playback sessions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Engine config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the variant ladder of an HLS manifest
    Inspect {
        /// URL to manifest
        manifest: String,
    },

    /// Play a stream on a headless surface with a simulated clock
    Simulate {
        /// Stream URL (HLS manifest or progressive file)
        stream_ref: String,

        /// Resume position in seconds
        #[arg(short, long, default_value = "0")]
        resume: u64,

        /// Media duration reported by the headless surface
        #[arg(short, long, default_value = "120")]
        duration: f64,

        /// Library item that receives progress checkpoints
        #[arg(long)]
        owner: Option<String>,

        /// Progress API base URL (checkpoints are only logged without it)
        #[arg(long, requires = "owner")]
        progress_endpoint: Option<String>,

        /// Bearer token for the progress API
        #[arg(long, env = "MARQUEE_TOKEN")]
        token: Option<String>,

        /// Timing ticks per simulated second
        #[arg(long, default_value = "4")]
        rate: u32,

        /// Seek to this position once playback starts
        #[arg(long)]
        seek_to: Option<f64>,

        /// Pause and stop the run at this position
        #[arg(long)]
        pause_at: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Inspect { manifest } => {
            commands::inspect(&manifest, &config, cli.format).await?;
        }
        Commands::Simulate {
            stream_ref,
            resume,
            duration,
            owner,
            progress_endpoint,
            token,
            rate,
            seek_to,
            pause_at,
        } => {
            let run = commands::SimulateArgs {
                stream_ref,
                resume,
                duration,
                owner,
                progress_endpoint,
                token,
                rate,
                seek_to,
                pause_at,
            };
            commands::simulate(run, config, cli.format).await?;
        }
    }

    Ok(())
}

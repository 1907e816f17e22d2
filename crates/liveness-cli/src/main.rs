//! Liveness Replay - Main Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use liveness_cli::{init_logging, load_settings, read_samples, replay, OutputFormat};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;

/// Replay recorded face observations through a liveness session
#[derive(Debug, Parser)]
#[command(name = "liveness-replay", version)]
struct Args {
    /// JSON-lines file of frame samples
    input: PathBuf,

    /// Settings file (TOML, JSON, ...)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the tick interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Print JSON snapshots instead of status lines
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(interval_ms) = args.interval_ms {
        settings.session.tick_interval_ms = interval_ms;
        settings.session.validate()?;
    }
    if args.verbose {
        settings.log.level = "debug".into();
    }
    init_logging(&settings.log)?;

    info!("=== Liveness Replay v{} ===", env!("CARGO_PKG_VERSION"));

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let samples = read_samples(BufReader::new(file))?;

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Status
    };

    let mut stdout = std::io::stdout().lock();
    let summary = replay(settings.session, samples, format, &mut stdout).await?;

    eprintln!(
        "Session ended: {} ticks ({} without face, {} rejected), {} blinks, liveness {}",
        summary.stats.ticks,
        summary.stats.face_absent,
        summary.stats.rejected,
        summary.blink_count,
        summary.verdict()
    );

    Ok(())
}

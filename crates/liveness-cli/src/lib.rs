//! Liveness Replay
//!
//! Loads settings, installs logging and replays a recorded JSON-lines
//! stream of frame samples through a liveness session.

use anyhow::{Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use liveness::{FrameSample, LivenessSnapshot};
use liveness_session::{Session, SessionConfig, SessionStats};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON log lines
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionConfig,
    pub log: LogSettings,
}

/// Load settings from defaults, an optional file and `LIVENESS__*` env vars
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }
    let builder = builder.add_source(
        Environment::with_prefix("LIVENESS")
            .separator("__")
            .try_parsing(true),
    );
    build_settings(builder)
}

fn build_settings(builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
    let settings: Settings = builder
        .build()
        .context("failed to load configuration")?
        .try_deserialize()
        .context("invalid configuration")?;
    settings.session.validate()?;
    Ok(settings)
}

/// Initialize logging (to stderr, stdout carries the replay output)
pub fn init_logging(settings: &LogSettings) -> Result<()> {
    let level: Level = settings
        .level
        .parse()
        .with_context(|| format!("invalid log level '{}'", settings.level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if settings.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("failed to set tracing subscriber")
}

/// Parse JSON-lines frame samples. Blank lines and `#` comments are skipped.
pub fn read_samples<R: BufRead>(reader: R) -> Result<Vec<FrameSample>> {
    let mut samples = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let sample = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid frame sample", idx + 1))?;
        samples.push(sample);
    }
    Ok(samples)
}

/// Output format for each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `Liveness: ... | Emotion: ... (Face Detected)`
    Status,
    /// One JSON snapshot per line
    Json,
}

/// Outcome of a replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub stats: SessionStats,
    pub blink_count: u32,
    pub liveness_confirmed: bool,
    pub emotion: String,
}

impl ReplaySummary {
    pub fn verdict(&self) -> &'static str {
        if self.liveness_confirmed {
            "Detected"
        } else {
            "Not Detected"
        }
    }
}

fn render(snapshot: &LivenessSnapshot, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Status => {
            format!("{} ({})", snapshot.status_line(), snapshot.face_status())
        }
        OutputFormat::Json => serde_json::to_string(snapshot)?,
    })
}

/// Replay samples at the configured cadence, writing one line per tick
pub async fn replay<W: Write>(
    config: SessionConfig,
    samples: Vec<FrameSample>,
    format: OutputFormat,
    out: &mut W,
) -> Result<ReplaySummary> {
    let mut session = Session::new(config)?;
    let (snapshot_tx, mut snapshot_rx) = mpsc::channel(session.config().snapshot_buffer);

    info!("Replaying {} frame samples", samples.len());
    let mut source = samples.into_iter();

    let printer = async {
        let mut last: Option<LivenessSnapshot> = None;
        while let Some(snapshot) = snapshot_rx.recv().await {
            writeln!(out, "{}", render(&snapshot, format)?)?;
            last = Some(snapshot);
        }
        Ok::<_, anyhow::Error>(last)
    };

    let (stats, last) = tokio::join!(session.run(&mut source, snapshot_tx), printer);
    let last = last?;

    Ok(ReplaySummary {
        stats,
        blink_count: last.as_ref().map_or(0, |s| s.blink_count),
        liveness_confirmed: last.as_ref().is_some_and(|s| s.liveness_confirmed),
        emotion: last
            .as_ref()
            .map_or(liveness::NO_EMOTION, |s| s.display_emotion())
            .to_string(),
    })
}

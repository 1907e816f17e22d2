//! Session loop implementation

use liveness::{FrameSample, LivenessConfig, LivenessEngine, LivenessError, LivenessSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::source::FrameSource;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Engine error: {0}")]
    Engine(#[from] LivenessError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for a detection session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Engine thresholds and policy
    pub engine: LivenessConfig,
    /// Polling period in milliseconds (default: 100)
    pub tick_interval_ms: u64,
    /// Snapshot channel capacity
    pub snapshot_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            engine: LivenessConfig::default(),
            tick_interval_ms: 100,
            snapshot_buffer: 64,
        }
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.tick_interval_ms == 0 {
            return Err(SessionError::Config("tick_interval_ms must be > 0".into()));
        }
        if self.snapshot_buffer == 0 {
            return Err(SessionError::Config("snapshot_buffer must be > 0".into()));
        }
        self.engine.validate()?;
        Ok(())
    }
}

/// Per-session tick counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Ticks processed
    pub ticks: u64,
    /// Ticks with a face observation
    pub faces: u64,
    /// Ticks with no face visible
    pub face_absent: u64,
    /// Observations rejected as invalid input
    pub rejected: u64,
}

/// Stops a running session from another task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Request the session loop to stop before its next tick.
    ///
    /// A stop requested before `run` starts is honoured by that run, which
    /// then returns without consuming any samples.
    pub fn stop(&self) {
        info!("Stopping liveness session");
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// One detection session (camera start to camera stop)
pub struct Session {
    config: SessionConfig,
    engine: LivenessEngine,
    stats: SessionStats,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

impl Session {
    /// Create a new session
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            engine: LivenessEngine::new(config.engine.clone())?,
            config,
            stats: SessionStats::default(),
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            running: Arc::clone(&self.running),
            stop_requested: Arc::clone(&self.stop_requested),
        }
    }

    /// Feed one sample. Rejected observations are logged and yield `None`.
    pub fn tick(&mut self, sample: &FrameSample, now: Instant) -> Option<LivenessSnapshot> {
        self.stats.ticks += 1;
        metrics::counter!("liveness_ticks_total").increment(1);

        match sample {
            FrameSample::NoFace => {
                self.stats.face_absent += 1;
                metrics::counter!("liveness_face_absent_total").increment(1);
            }
            FrameSample::Face(_) => self.stats.faces += 1,
        }

        match self.engine.on_frame(sample.observation(), now) {
            Ok(snapshot) => {
                if snapshot.blink_detected {
                    metrics::counter!("liveness_blinks_total").increment(1);
                }
                if snapshot.confirmed_by.is_some() {
                    metrics::counter!("liveness_confirmed_total").increment(1);
                }
                Some(snapshot)
            }
            Err(e) => {
                self.stats.rejected += 1;
                metrics::counter!("liveness_rejected_frames_total").increment(1);
                warn!("Frame rejected (tick {}): {}", self.stats.ticks, e);
                None
            }
        }
    }

    /// Run the session loop until the source ends or the session is stopped.
    ///
    /// The engine is reset on exit so the next session starts clean.
    pub async fn run<S: FrameSource>(
        &mut self,
        source: &mut S,
        snapshot_tx: mpsc::Sender<LivenessSnapshot>,
    ) -> SessionStats {
        info!(
            "Starting liveness session (tick every {}ms)",
            self.config.tick_interval_ms
        );
        self.running.store(true, Ordering::Release);

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // First tick completes immediately, so a pending stop is seen
            // before any sample is read
            ticker.tick().await;
            if self.stop_requested.load(Ordering::Acquire) {
                info!("Stop requested");
                break;
            }

            let Some(sample) = source.next_sample() else {
                info!("Frame source ended");
                break;
            };

            let now = tokio::time::Instant::now().into_std();
            let Some(snapshot) = self.tick(&sample, now) else {
                continue;
            };

            match snapshot_tx.try_send(snapshot) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Snapshot channel full, dropping tick {}", self.stats.ticks);
                }
                Err(TrySendError::Closed(_)) => {
                    info!("Snapshot receiver dropped");
                    break;
                }
            }
        }

        self.stop_requested.store(false, Ordering::Release);
        self.running.store(false, Ordering::Release);
        self.engine.reset();

        let stats = std::mem::take(&mut self.stats);
        info!(
            "Liveness session stopped ({} ticks, {} without face, {} rejected)",
            stats.ticks, stats.face_absent, stats.rejected
        );
        stats
    }

    /// Check if the session loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn engine(&self) -> &LivenessEngine {
        &self.engine
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

//! Session-scoped engine state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use crate::emotion::NO_EMOTION;
use crate::landmarks::Point2D;

/// Debounced eye state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EyeOpenness {
    /// No valid reading yet this session
    #[default]
    Unknown,
    Open,
    Closed,
}

impl fmt::Display for EyeOpenness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EyeOpenness::Unknown => f.write_str("unknown"),
            EyeOpenness::Open => f.write_str("open"),
            EyeOpenness::Closed => f.write_str("closed"),
        }
    }
}

/// Engine state (tracked over one detection session)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineState {
    /// Current debounced eye state
    pub eye_openness: EyeOpenness,

    /// Confirmed blinks this session
    pub blink_count: u32,

    /// Monotonic time of the last counted blink
    pub last_blink_at: Option<Instant>,

    /// Most recent nose position
    pub last_head_position: Option<Point2D>,

    /// One-way latch, cleared only by `reset`
    pub liveness_confirmed: bool,

    /// Most recent dominant expression
    pub current_emotion: Option<String>,
}

impl EngineState {
    /// Dominant expression label, or the `none` sentinel
    pub fn emotion_label(&self) -> &str {
        self.current_emotion.as_deref().unwrap_or(NO_EMOTION)
    }

    /// Whether enough time has passed since the last counted blink
    pub fn debounce_elapsed(&self, now: Instant, window: std::time::Duration) -> bool {
        match self.last_blink_at {
            Some(last) => now.saturating_duration_since(last) > window,
            None => true,
        }
    }

    /// Reset state (on session end)
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
